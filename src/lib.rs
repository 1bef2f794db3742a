//! Sound system abstraction: one model of devices, streams, controls and
//! switches kept in sync with whichever backend could be opened.

pub mod config;
pub mod logging;
pub mod registry;

pub use config::MixerConfig;
pub use maolan_mixer_engine as engine;
pub use registry::Registry;

use maolan_mixer_engine::backend::Backend;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read config {path}: {reason}")]
    ConfigRead { path: String, reason: String },

    #[error("invalid config: {0}")]
    ConfigParse(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("backend {0} is not registered")]
    UnknownBackend(String),

    #[error("no backend could be opened")]
    NoBackend,

    #[error(transparent)]
    Engine(#[from] maolan_mixer_engine::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Sets up logging and opens the preferred backend among the built-in ones.
pub fn init(config: &MixerConfig) -> Result<Box<dyn Backend>> {
    init_with(&Registry::with_defaults(), config)
}

pub fn init_with(registry: &Registry, config: &MixerConfig) -> Result<Box<dyn Backend>> {
    if let Err(e) = logging::init(config.log.as_deref()) {
        debug!("keeping existing subscriber: {}", e);
    }
    registry.open_preferred(config)
}
