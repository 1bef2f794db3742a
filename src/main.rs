use maolan_mixer::engine::backend::Backend;
use maolan_mixer::{MixerConfig, init};
use std::path::PathBuf;
use tracing::info;

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("maolan-mixer.toml"))
}

fn describe(backend: &dyn Backend) {
    for device in backend.list_devices() {
        info!("device {} ({})", device.name(), device.label());
    }
    for stream in backend.list_streams() {
        let volume = stream.default_control().and_then(|c| c.volume());
        info!(
            "stream {} {:?} volume {:?}",
            stream.name(),
            stream.direction(),
            volume
        );
    }
    if let Some(stream) = backend.default_output_stream() {
        info!("default output {}", stream.name());
    }
    if let Some(stream) = backend.default_input_stream() {
        info!("default input {}", stream.name());
    }
}

#[tokio::main]
async fn main() -> Result<(), maolan_mixer::Error> {
    let config = MixerConfig::load(&config_path())?.with_env();
    let mut backend = init(&config)?;
    describe(backend.as_ref());

    let mut events = backend.subscribe();
    let waker = backend.waker();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = waker.notified() => {
                backend.dispatch();
            }
            _ = &mut shutdown => break,
        }
        while let Ok(event) = events.try_recv() {
            info!("{:?}", event);
        }
    }
    backend.close();
    Ok(())
}
