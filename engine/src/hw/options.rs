use super::config;
use std::time::Duration;

pub const DEFAULT_PRIORITY: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwOptions {
    pub priority: u32,
    /// `None` disables hot-plug rescans.
    pub hotplug_interval: Option<Duration>,
}

impl Default for HwOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            hotplug_interval: Some(config::DEFAULT_HOTPLUG_INTERVAL),
        }
    }
}

impl HwOptions {
    /// Applies environment overrides on top of configured values.
    pub fn from_env(configured: Option<Duration>) -> Self {
        Self {
            hotplug_interval: config::hotplug_interval(configured),
            ..Self::default()
        }
    }
}
