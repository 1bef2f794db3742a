use std::time::Duration;

pub const HOTPLUG_INTERVAL_ENV: &str = "MAOLAN_MIXER_HOTPLUG_MS";
pub const BACKEND_ENV: &str = "MAOLAN_MIXER_BACKEND";
pub const HOTPLUG_DISABLE_ENV: &str = "MAOLAN_MIXER_NO_HOTPLUG";

pub const DEFAULT_HOTPLUG_INTERVAL: Duration = Duration::from_secs(2);
const MIN_HOTPLUG_INTERVAL_MS: u64 = 100;

pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let s = v.trim().to_ascii_lowercase();
            s == "1" || s == "true" || s == "yes" || s == "on"
        })
        .unwrap_or(false)
}

pub fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|ms| Duration::from_millis(ms.max(MIN_HOTPLUG_INTERVAL_MS)))
}

pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Rescan interval for hot-plug detection, `None` when disabled.
pub fn hotplug_interval(configured: Option<Duration>) -> Option<Duration> {
    if env_flag(HOTPLUG_DISABLE_ENV) {
        return None;
    }
    Some(
        env_millis(HOTPLUG_INTERVAL_ENV)
            .or(configured)
            .unwrap_or(DEFAULT_HOTPLUG_INTERVAL),
    )
}
