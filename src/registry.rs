use crate::config::MixerConfig;
use crate::{Error, Result};
use maolan_mixer_engine::backend::{Backend, BackendInfo, BackendKind, BackendState};
use tracing::{debug, info, warn};

pub type Factory = Box<dyn Fn(&MixerConfig) -> Box<dyn Backend> + Send + Sync>;

struct Entry {
    info: BackendInfo,
    factory: Factory,
}

/// Backends known to the application, tried by preference then priority.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backends built into this crate: ALSA on Linux.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(target_os = "linux")]
        {
            use maolan_mixer_engine::alsa_backend;
            use maolan_mixer_engine::hw::options::DEFAULT_PRIORITY;

            registry.register(
                BackendInfo::new(alsa_backend::NAME, DEFAULT_PRIORITY, BackendKind::Hardware),
                |config: &MixerConfig| -> Box<dyn Backend> {
                    Box::new(alsa_backend::new(config.hardware.options()))
                },
            );
        }
        registry
    }

    /// Adds a backend; an entry with the same name is replaced.
    pub fn register<F>(&mut self, info: BackendInfo, factory: F)
    where
        F: Fn(&MixerConfig) -> Box<dyn Backend> + Send + Sync + 'static,
    {
        self.entries.retain(|e| e.info.name != info.name);
        debug!("registered backend {} (priority {})", info.name, info.priority);
        self.entries.push(Entry {
            info,
            factory: Box::new(factory),
        });
    }

    /// Registered backends, highest priority first.
    pub fn entries(&self) -> Vec<&BackendInfo> {
        let mut infos: Vec<&BackendInfo> = self.entries.iter().map(|e| &e.info).collect();
        infos.sort_by(|a, b| b.priority.cmp(&a.priority));
        infos
    }

    pub fn get(&self, name: &str) -> Option<&BackendInfo> {
        self.entries.iter().find(|e| e.info.name == name).map(|e| &e.info)
    }

    /// Builds a backend without opening it.
    pub fn create(&self, name: &str, config: &MixerConfig) -> Result<Box<dyn Backend>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.info.name == name)
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))?;
        Ok((entry.factory)(config))
    }

    fn candidates(&self, config: &MixerConfig) -> Vec<&BackendInfo> {
        let mut order = self.entries();
        if let Some(preferred) = config.backend.as_deref() {
            match order.iter().position(|i| i.name == preferred) {
                Some(pos) => {
                    let info = order.remove(pos);
                    order.insert(0, info);
                }
                None => warn!("configured backend {} is not available", preferred),
            }
        }
        order
            .into_iter()
            .filter(|i| config.hardware.enabled || i.kind != BackendKind::Hardware)
            .collect()
    }

    /// Opens the configured backend, else the others by priority. Backends
    /// that fail to open are closed again.
    pub fn open_preferred(&self, config: &MixerConfig) -> Result<Box<dyn Backend>> {
        for info in self.candidates(config) {
            let mut backend = self.create(&info.name, config)?;
            match backend.open() {
                Ok(state @ (BackendState::Ready | BackendState::Connecting)) => {
                    info!("using backend {} ({:?})", info.name, state);
                    return Ok(backend);
                }
                Ok(state) => warn!("backend {} opened in state {:?}", info.name, state),
                Err(e) => warn!("backend {} failed to open: {}", info.name, e),
            }
            backend.close();
        }
        Err(Error::NoBackend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maolan_mixer_engine::error::Error as EngineError;
    use maolan_mixer_engine::server::protocol::{
        ConnectTarget, EventSink, RequestId, ServerConnection, ServerRequest,
    };
    use maolan_mixer_engine::server::{ServerBackend, ServerOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Transport {
        refuse: bool,
        disconnects: Arc<AtomicUsize>,
        announced: Arc<Mutex<Option<String>>>,
    }

    impl ServerConnection for Transport {
        fn connect(
            &mut self,
            _sink: EventSink,
            target: &ConnectTarget,
        ) -> maolan_mixer_engine::Result<()> {
            *self.announced.lock().unwrap() = Some(target.application_name.clone());
            if self.refuse {
                return Err(EngineError::Connection("refused".into()));
            }
            Ok(())
        }

        fn disconnect(&mut self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn send(&mut self, _request: ServerRequest) -> maolan_mixer_engine::Result<RequestId> {
            Ok(1)
        }
    }

    fn server(registry: &mut Registry, name: &str, priority: u32, transport: Transport) {
        let options = ServerOptions {
            name: name.to_string(),
            priority,
            ..ServerOptions::default()
        };
        let info = ServerBackend::new(transport.clone(), options.clone()).info().clone();
        registry.register(info, move |config: &MixerConfig| -> Box<dyn Backend> {
            let options = ServerOptions {
                name: options.name.clone(),
                priority: options.priority,
                ..config.server.options()
            };
            Box::new(ServerBackend::new(transport.clone(), options))
        });
    }

    fn config(backend: Option<&str>) -> MixerConfig {
        let mut config = MixerConfig::default();
        config.backend = backend.map(str::to_string);
        config.hardware.enabled = false;
        config
    }

    #[test]
    fn entries_sorted_by_priority() {
        let mut registry = Registry::new();
        server(&mut registry, "low", 1, Transport::default());
        server(&mut registry, "high", 50, Transport::default());
        let names: Vec<&str> = registry.entries().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
        assert!(registry.get("low").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn configured_backend_goes_first() {
        let mut registry = Registry::new();
        server(&mut registry, "low", 1, Transport::default());
        server(&mut registry, "high", 50, Transport::default());
        let backend = registry.open_preferred(&config(Some("low"))).unwrap();
        assert_eq!(backend.info().name, "low");
        assert_eq!(backend.state(), BackendState::Connecting);

        let backend = registry.open_preferred(&config(Some("nonexistent"))).unwrap();
        assert_eq!(backend.info().name, "high");
    }

    #[test]
    fn server_section_reaches_the_transport() {
        let transport = Transport::default();
        let announced = transport.announced.clone();
        let mut registry = Registry::new();
        server(&mut registry, "pulse", 10, transport);
        let mut config = config(None);
        config.server.application_name = "panel".into();

        let backend = registry.open_preferred(&config).unwrap();
        assert_eq!(backend.info().name, "pulse");
        assert_eq!(announced.lock().unwrap().as_deref(), Some("panel"));
    }

    #[test]
    fn failing_backend_is_closed_and_skipped() {
        let refusing = Transport {
            refuse: true,
            ..Transport::default()
        };
        let disconnects = refusing.disconnects.clone();
        let mut registry = Registry::new();
        server(&mut registry, "broken", 50, refusing);
        server(&mut registry, "working", 10, Transport::default());

        let backend = registry.open_preferred(&config(None)).unwrap();
        assert_eq!(backend.info().name, "working");
        assert!(disconnects.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn nothing_opens() {
        let registry = Registry::with_defaults();
        assert!(matches!(
            registry.open_preferred(&config(None)),
            Err(Error::NoBackend)
        ));
        assert!(matches!(
            registry.create("missing", &config(None)),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn alsa_is_built_in() {
        let registry = Registry::with_defaults();
        let alsa = registry.get("alsa").unwrap();
        assert_eq!(alsa.kind, BackendKind::Hardware);
    }
}
