use crate::{Error, Result};
use maolan_mixer_engine::hw::config::env_string;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MAOLAN_MIXER_LOG";
pub const DEFAULT_FILTER: &str = "info";

/// Filter directives from `MAOLAN_MIXER_LOG`, else the configured ones.
pub fn directives(configured: Option<&str>) -> String {
    env_string(LOG_ENV)
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn filter(configured: Option<&str>) -> EnvFilter {
    let directives = directives(configured);
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("ignoring log filter {directives:?}: {e}");
        EnvFilter::new(DEFAULT_FILTER)
    })
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(configured: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(configured))
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
