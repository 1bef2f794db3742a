use crate::error::{Error, Result};
use crate::message::MixerEvent;
use crate::model::{Control, ControlRef, Device, Model, Stream, Switch, SwitchRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Notify, broadcast, watch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendState {
    #[default]
    Idle,
    Connecting,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    Hardware,
    Server,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFlags {
    pub application_controls: bool,
    pub stored_controls: bool,
    pub set_default_input: bool,
    pub set_default_output: bool,
}

/// What a registry needs to know to pick a backend without opening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub priority: u32,
    pub kind: BackendKind,
    pub flags: BackendFlags,
}

impl BackendInfo {
    pub fn new(name: impl Into<String>, priority: u32, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            priority,
            kind,
            flags: BackendFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: BackendFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A synchronizer keeping a [`Model`] in step with one sound subsystem.
///
/// Backends never touch the model from their own threads or callbacks. They
/// queue work and ring [`Backend::waker`]; the owner then calls
/// [`Backend::dispatch`], which is the only place the model changes.
pub trait Backend: Send {
    fn info(&self) -> &BackendInfo;

    fn model(&self) -> &Model;

    /// Starts synchronizing. Returns the state reached, `Connecting` for
    /// backends that finish loading asynchronously.
    fn open(&mut self) -> Result<BackendState>;

    /// Releases every resource. Calling it twice, or on a failed backend, is fine.
    fn close(&mut self);

    /// Processes queued work; returns how many items were handled.
    fn dispatch(&mut self) -> usize;

    fn waker(&self) -> Arc<Notify>;

    fn write_volumes(&mut self, target: &ControlRef, volumes: Vec<u32>) -> Result<()>;

    fn write_mute(&mut self, target: &ControlRef, mute: bool) -> Result<()>;

    fn write_active_option(&mut self, target: &SwitchRef, option: &str) -> Result<()>;

    fn state(&self) -> BackendState {
        self.model().state()
    }

    fn subscribe(&self) -> broadcast::Receiver<MixerEvent> {
        self.model().subscribe()
    }

    fn watch_state(&self) -> watch::Receiver<BackendState> {
        self.model().watch_state()
    }

    fn list_devices(&self) -> Vec<&Device> {
        self.model().devices().collect()
    }

    fn list_streams(&self) -> Vec<&Stream> {
        self.model().streams().collect()
    }

    fn list_stored_controls(&self) -> Vec<&Control> {
        self.model().stored_controls().collect()
    }

    fn default_input_stream(&self) -> Option<&Stream> {
        self.model().default_input_stream()
    }

    fn default_output_stream(&self) -> Option<&Stream> {
        self.model().default_output_stream()
    }

    fn set_default_input(&mut self, stream: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} cannot change the default input (to {stream})",
            self.info().name
        )))
    }

    fn set_default_output(&mut self, stream: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} cannot change the default output (to {stream})",
            self.info().name
        )))
    }

    fn control(&self, target: &ControlRef) -> Result<&Control> {
        self.model()
            .control(target)
            .ok_or_else(|| Error::NotFound(format!("control {target:?}")))
    }

    fn switch(&self, target: &SwitchRef) -> Result<&Switch> {
        self.model()
            .switch(target)
            .ok_or_else(|| Error::NotFound(format!("switch {target:?}")))
    }

    fn set_volume(&mut self, target: &ControlRef, volume: u32) -> Result<()> {
        let volumes = self.control(target)?.plan_volume(volume)?;
        self.write_volumes(target, volumes)
    }

    fn set_decibel(&mut self, target: &ControlRef, decibel: f64) -> Result<()> {
        let volumes = self.control(target)?.plan_decibel(decibel)?;
        self.write_volumes(target, volumes)
    }

    fn set_channel_volume(&mut self, target: &ControlRef, channel: usize, volume: u32) -> Result<()> {
        let volumes = self.control(target)?.plan_channel_volume(channel, volume)?;
        self.write_volumes(target, volumes)
    }

    fn set_balance(&mut self, target: &ControlRef, balance: f32) -> Result<()> {
        let volumes = self.control(target)?.plan_balance(balance)?;
        self.write_volumes(target, volumes)
    }

    fn set_fade(&mut self, target: &ControlRef, fade: f32) -> Result<()> {
        let volumes = self.control(target)?.plan_fade(fade)?;
        self.write_volumes(target, volumes)
    }

    fn set_mute(&mut self, target: &ControlRef, mute: bool) -> Result<()> {
        self.control(target)?.check_mute_writable()?;
        self.write_mute(target, mute)
    }

    fn set_active_option(&mut self, target: &SwitchRef, option: &str) -> Result<()> {
        let switch = self.switch(target)?;
        if switch.option(option).is_none() {
            return Err(Error::NotFound(format!(
                "option {option} of switch {}",
                switch.name()
            )));
        }
        self.write_active_option(target, option)
    }
}

/// Waits for the backend's doorbell, then dispatches everything queued.
pub async fn pump(backend: &mut dyn Backend) -> usize {
    let waker = backend.waker();
    waker.notified().await;
    backend.dispatch()
}
