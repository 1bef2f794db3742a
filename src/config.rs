use crate::{Error, Result};
use maolan_mixer_engine::hw::config::{BACKEND_ENV, env_string};
use maolan_mixer_engine::hw::options::HwOptions;
use maolan_mixer_engine::server::ServerOptions;
use maolan_mixer_engine::server::backend::DEFAULT_APPLICATION_NAME;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub enabled: bool,
    /// Hot-plug rescan interval; the engine's default applies when unset.
    pub hotplug_ms: Option<u64>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hotplug_ms: None,
        }
    }
}

impl HardwareConfig {
    pub fn options(&self) -> HwOptions {
        HwOptions::from_env(self.hotplug_ms.map(Duration::from_millis))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name announced to the sound server.
    pub application_name: String,
    /// Server to reach; the transport's own default when unset.
    pub address: Option<String>,
    pub reconnect: bool,
    pub stored_controls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            address: None,
            reconnect: true,
            stored_controls: true,
        }
    }
}

impl ServerConfig {
    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            reconnect: self.reconnect,
            stored_controls: self.stored_controls,
            application_name: self.application_name.clone(),
            address: self.address.clone(),
            ..ServerOptions::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Backend to try first.
    pub backend: Option<String>,
    /// Log filter directives.
    pub log: Option<String>,
    pub hardware: HardwareConfig,
    pub server: ServerConfig,
}

impl MixerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::ConfigRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Applies `MAOLAN_MIXER_BACKEND` over the configured preference.
    pub fn with_env(mut self) -> Self {
        if let Some(backend) = env_string(BACKEND_ENV) {
            self.backend = Some(backend);
        }
        self
    }
}
