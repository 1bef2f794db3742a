#[cfg(target_os = "linux")]
pub mod alsa;
pub mod config;
pub mod options;
pub mod traits;
