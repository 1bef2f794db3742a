//! Backend-independent object model: devices own switches, streams own
//! controls and switches, relations back to owners are by name only.
//!
//! Only the synchronizer that owns a [`Model`] mutates it, always from a single
//! logical thread. Every mutation is applied to the collections before its
//! event is sent, so a consumer reacting to an event sees the new state.

pub mod control;
pub mod device;
pub mod stream;
pub mod switch;

pub use control::{AppInfo, Control, ControlChanges, ControlFlags, ControlRole};
pub use device::Device;
pub use stream::{Direction, Stream};
pub use switch::{Switch, SwitchKind, SwitchOption};

use crate::backend::BackendState;
use crate::error::{Error, Result};
use crate::message::MixerEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlRef {
    Stream { stream: String, control: String },
    Stored(String),
}

impl ControlRef {
    pub fn stream(stream: impl Into<String>, control: impl Into<String>) -> Self {
        Self::Stream {
            stream: stream.into(),
            control: control.into(),
        }
    }

    pub fn stored(name: impl Into<String>) -> Self {
        Self::Stored(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchRef {
    Device { device: String, switch: String },
    Stream { stream: String, switch: String },
}

impl SwitchRef {
    pub fn device(device: impl Into<String>, switch: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            switch: switch.into(),
        }
    }

    pub fn stream(stream: impl Into<String>, switch: impl Into<String>) -> Self {
        Self::Stream {
            stream: stream.into(),
            switch: switch.into(),
        }
    }

    pub fn switch_name(&self) -> &str {
        match self {
            Self::Device { switch, .. } | Self::Stream { switch, .. } => switch,
        }
    }
}

#[derive(Debug)]
pub struct Model {
    devices: Vec<Device>,
    streams: Vec<Stream>,
    stored: Vec<Control>,
    default_input: Option<String>,
    default_output: Option<String>,
    events: broadcast::Sender<MixerEvent>,
    state: watch::Sender<BackendState>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(BackendState::Idle);
        Self {
            devices: vec![],
            streams: vec![],
            stored: vec![],
            default_input: None,
            default_output: None,
            events,
            state,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MixerEvent> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<BackendState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BackendState {
        *self.state.borrow()
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Streams that currently have at least one control or switch.
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(|s| s.is_present())
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.stream_entry(name).filter(|s| s.is_present())
    }

    pub fn device_streams<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a Stream> {
        self.streams().filter(move |s| s.device() == Some(device))
    }

    pub fn stored_controls(&self) -> impl Iterator<Item = &Control> {
        self.stored.iter()
    }

    pub fn stored_control(&self, name: &str) -> Option<&Control> {
        self.stored.iter().find(|c| c.name() == name)
    }

    pub fn control(&self, target: &ControlRef) -> Option<&Control> {
        match target {
            ControlRef::Stream { stream, control } => self.stream(stream)?.control(control),
            ControlRef::Stored(name) => self.stored_control(name),
        }
    }

    pub fn switch(&self, target: &SwitchRef) -> Option<&Switch> {
        match target {
            SwitchRef::Device { device, switch } => self.device(device)?.switch(switch),
            SwitchRef::Stream { stream, switch } => self.stream(stream)?.switch(switch),
        }
    }

    pub fn default_stream(&self, direction: Direction) -> Option<&Stream> {
        let name = match direction {
            Direction::Input => self.default_input.as_deref(),
            Direction::Output => self.default_output.as_deref(),
            Direction::Unknown => None,
        };
        name.and_then(|n| self.stream(n))
    }

    pub fn default_input_stream(&self) -> Option<&Stream> {
        self.default_stream(Direction::Input)
    }

    pub fn default_output_stream(&self) -> Option<&Stream> {
        self.default_stream(Direction::Output)
    }

    pub(crate) fn all_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter()
    }

    pub(crate) fn stream_entry(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name() == name)
    }

    fn stream_entry_mut(&mut self, name: &str) -> Result<&mut Stream> {
        self.streams
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::NotFound(format!("stream {name}")))
    }

    fn device_mut(&mut self, name: &str) -> Result<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.name() == name)
            .ok_or_else(|| Error::NotFound(format!("device {name}")))
    }

    fn emit(&self, event: MixerEvent) {
        debug!("mixer event: {:?}", event);
        let _ = self.events.send(event);
    }

    pub(crate) fn set_state(&mut self, state: BackendState) {
        if self.state.send_replace(state) != state {
            self.emit(MixerEvent::StateChanged(state));
        }
    }

    pub(crate) fn add_device(&mut self, device: Device) -> Result<()> {
        if self.device(device.name()).is_some() {
            return Err(Error::Protocol(format!("device {} already exists", device.name())));
        }
        let name = device.name().to_string();
        self.devices.push(device);
        self.emit(MixerEvent::DeviceAdded(name));
        Ok(())
    }

    pub(crate) fn update_device(
        &mut self,
        name: &str,
        label: impl Into<String>,
        icon: Option<String>,
    ) -> Result<()> {
        let label = label.into();
        let device = self.device_mut(name)?;
        if device.label() == label && device.icon() == icon.as_deref() {
            return Ok(());
        }
        device.set_label(label);
        device.set_icon(icon);
        self.emit(MixerEvent::DeviceChanged(name.to_string()));
        Ok(())
    }

    /// Detaches the device's switches and streams before dropping it.
    pub(crate) fn remove_device(&mut self, name: &str) -> Option<Device> {
        let idx = self.devices.iter().position(|d| d.name() == name)?;
        let switch_names: Vec<String> = self.devices[idx]
            .switches()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        for switch in switch_names {
            self.devices[idx].take_switch(&switch);
            self.emit(MixerEvent::SwitchRemoved(SwitchRef::device(name, switch)));
        }
        let attached: Vec<String> = self
            .streams
            .iter()
            .filter(|s| s.device() == Some(name))
            .map(|s| s.name().to_string())
            .collect();
        for stream in attached {
            let _ = self.set_stream_device(&stream, None);
        }
        let device = self.devices.remove(idx);
        self.emit(MixerEvent::DeviceRemoved(name.to_string()));
        Some(device)
    }

    pub(crate) fn insert_stream(&mut self, stream: Stream) -> Result<()> {
        if self.stream_entry(stream.name()).is_some() {
            return Err(Error::Protocol(format!("stream {} already exists", stream.name())));
        }
        let present = stream.is_present();
        let name = stream.name().to_string();
        self.streams.push(stream);
        if present {
            self.emit(MixerEvent::StreamAdded(name));
        }
        Ok(())
    }

    pub(crate) fn remove_stream(&mut self, name: &str) -> Option<Stream> {
        let idx = self.streams.iter().position(|s| s.name() == name)?;
        let stream = self.streams.remove(idx);
        if stream.is_present() {
            self.emit(MixerEvent::StreamRemoved(name.to_string()));
        }
        self.forget_default(name);
        Some(stream)
    }

    pub(crate) fn set_stream_device(&mut self, name: &str, device: Option<String>) -> Result<()> {
        let stream = self.stream_entry_mut(name)?;
        if stream.device() == device.as_deref() {
            return Ok(());
        }
        stream.set_device(device);
        if stream.is_present() {
            self.emit(MixerEvent::StreamChanged(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn set_stream_label(&mut self, name: &str, label: &str) -> Result<()> {
        let stream = self.stream_entry_mut(name)?;
        if stream.label() == label {
            return Ok(());
        }
        stream.set_label(label);
        if stream.is_present() {
            self.emit(MixerEvent::StreamChanged(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn set_stream_default_control(
        &mut self,
        name: &str,
        control: Option<String>,
    ) -> Result<()> {
        self.stream_entry_mut(name)?.set_default_control(control);
        Ok(())
    }

    pub(crate) fn add_control(&mut self, stream: &str, control: Control) -> Result<()> {
        let entry = self.stream_entry_mut(stream)?;
        if entry.control(control.name()).is_some() {
            return Err(Error::Protocol(format!(
                "control {} already exists in {stream}",
                control.name()
            )));
        }
        let was_present = entry.is_present();
        let name = control.name().to_string();
        entry.push_control(control);
        self.emit(MixerEvent::ControlAdded {
            stream: stream.to_string(),
            control: name,
        });
        if !was_present {
            self.emit(MixerEvent::StreamAdded(stream.to_string()));
        }
        Ok(())
    }

    pub(crate) fn remove_control(&mut self, stream: &str, control: &str) -> Option<Control> {
        let entry = self.stream_entry_mut(stream).ok()?;
        let removed = entry.take_control(control)?;
        let now_present = entry.is_present();
        self.emit(MixerEvent::ControlRemoved {
            stream: stream.to_string(),
            control: control.to_string(),
        });
        if !now_present {
            self.emit(MixerEvent::StreamRemoved(stream.to_string()));
            self.forget_default(stream);
        }
        Some(removed)
    }

    fn control_mut(&mut self, target: &ControlRef) -> Option<&mut Control> {
        match target {
            ControlRef::Stream { stream, control } => self
                .streams
                .iter_mut()
                .find(|s| s.name() == stream)?
                .control_mut(control),
            ControlRef::Stored(name) => self.stored.iter_mut().find(|c| c.name() == name),
        }
    }

    /// Applies `update` and notifies only when an observable property changed.
    pub(crate) fn update_control(
        &mut self,
        target: &ControlRef,
        update: impl FnOnce(&mut Control),
    ) -> Result<ControlChanges> {
        let control = self
            .control_mut(target)
            .ok_or_else(|| Error::NotFound(format!("control {target:?}")))?;
        let before = control.clone();
        update(control);
        let changes = control.changes_since(&before);
        if changes.any() {
            self.emit(MixerEvent::ControlChanged {
                control: target.clone(),
                changes,
            });
        }
        Ok(changes)
    }

    pub(crate) fn add_stored_control(&mut self, control: Control) -> Result<()> {
        if self.stored_control(control.name()).is_some() {
            return Err(Error::Protocol(format!(
                "stored control {} already exists",
                control.name()
            )));
        }
        let name = control.name().to_string();
        self.stored.push(control);
        self.emit(MixerEvent::StoredControlAdded(name));
        Ok(())
    }

    pub(crate) fn remove_stored_control(&mut self, name: &str) -> Option<Control> {
        let idx = self.stored.iter().position(|c| c.name() == name)?;
        let control = self.stored.remove(idx);
        self.emit(MixerEvent::StoredControlRemoved(name.to_string()));
        Some(control)
    }

    pub(crate) fn add_switch(&mut self, target: SwitchRef, switch: Switch) -> Result<()> {
        let name = switch.name().to_string();
        if target.switch_name() != name {
            return Err(Error::Protocol(format!(
                "switch {name} added as {}",
                target.switch_name()
            )));
        }
        match &target {
            SwitchRef::Device { device, .. } => {
                let device = self.device_mut(device)?;
                if device.switch(&name).is_some() {
                    return Err(Error::Protocol(format!("switch {name} already exists")));
                }
                device.push_switch(switch);
                self.emit(MixerEvent::SwitchAdded(target));
            }
            SwitchRef::Stream { stream, .. } => {
                let stream = stream.clone();
                let entry = self.stream_entry_mut(&stream)?;
                if entry.switch(&name).is_some() {
                    return Err(Error::Protocol(format!("switch {name} already exists")));
                }
                let was_present = entry.is_present();
                entry.push_switch(switch);
                self.emit(MixerEvent::SwitchAdded(target));
                if !was_present {
                    self.emit(MixerEvent::StreamAdded(stream));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn remove_switch(&mut self, target: &SwitchRef) -> Option<Switch> {
        match target {
            SwitchRef::Device { device, switch } => {
                let removed = self.device_mut(device).ok()?.take_switch(switch)?;
                self.emit(MixerEvent::SwitchRemoved(target.clone()));
                Some(removed)
            }
            SwitchRef::Stream { stream, switch } => {
                let entry = self.stream_entry_mut(stream).ok()?;
                let removed = entry.take_switch(switch)?;
                let now_present = entry.is_present();
                self.emit(MixerEvent::SwitchRemoved(target.clone()));
                if !now_present {
                    self.emit(MixerEvent::StreamRemoved(stream.clone()));
                    self.forget_default(stream);
                }
                Some(removed)
            }
        }
    }

    fn switch_mut(&mut self, target: &SwitchRef) -> Result<&mut Switch> {
        let found = match target {
            SwitchRef::Device { device, switch } => self.device_mut(device)?.switch_mut(switch),
            SwitchRef::Stream { stream, switch } => self.stream_entry_mut(stream)?.switch_mut(switch),
        };
        found.ok_or_else(|| Error::NotFound(format!("switch {}", target.switch_name())))
    }

    /// An option name the switch does not know is a protocol inconsistency.
    pub(crate) fn set_active_option(&mut self, target: &SwitchRef, option: Option<&str>) -> Result<bool> {
        let switch = self.switch_mut(target)?;
        let idx = match option {
            Some(name) => Some(switch.position(name).ok_or_else(|| {
                Error::Protocol(format!("switch {} has no option {name}", switch.name()))
            })?),
            None => None,
        };
        if !switch.set_active(idx) {
            return Ok(false);
        }
        self.emit(MixerEvent::ActiveOptionChanged {
            switch: target.clone(),
            option: option.map(str::to_string),
        });
        Ok(true)
    }

    pub(crate) fn set_switch_options(
        &mut self,
        target: &SwitchRef,
        label: &str,
        options: Vec<SwitchOption>,
    ) -> Result<()> {
        let switch = self.switch_mut(target)?;
        if switch.options() == options.as_slice() && switch.label() == label {
            return Ok(());
        }
        switch.set_label(label);
        switch.set_options(options);
        self.emit(MixerEvent::SwitchChanged(target.clone()));
        Ok(())
    }

    /// Points the default at a present stream, or clears it.
    pub(crate) fn set_default(&mut self, direction: Direction, name: Option<String>) -> Result<bool> {
        if let Some(n) = name.as_deref() {
            let stream = self
                .stream(n)
                .ok_or_else(|| Error::NotFound(format!("stream {n}")))?;
            if stream.direction() != direction {
                return Err(Error::Protocol(format!(
                    "stream {n} is not an {direction:?} stream"
                )));
            }
        }
        let slot = match direction {
            Direction::Input => &mut self.default_input,
            Direction::Output => &mut self.default_output,
            Direction::Unknown => return Ok(false),
        };
        if *slot == name {
            return Ok(false);
        }
        *slot = name.clone();
        self.emit(match direction {
            Direction::Input => MixerEvent::DefaultInputChanged(name),
            _ => MixerEvent::DefaultOutputChanged(name),
        });
        Ok(true)
    }

    pub(crate) fn default_name(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Input => self.default_input.as_deref(),
            Direction::Output => self.default_output.as_deref(),
            Direction::Unknown => None,
        }
    }

    fn forget_default(&mut self, stream: &str) {
        for direction in [Direction::Input, Direction::Output] {
            if self.default_name(direction) == Some(stream) {
                let _ = self.set_default(direction, None);
            }
        }
    }

    /// Removes everything, streams first, emitting the matching events.
    pub(crate) fn clear(&mut self) {
        let streams: Vec<String> = self.streams.iter().map(|s| s.name().to_string()).collect();
        for stream in streams {
            self.remove_stream(&stream);
        }
        let devices: Vec<String> = self.devices.iter().map(|d| d.name().to_string()).collect();
        for device in devices {
            self.remove_device(&device);
        }
        let stored: Vec<String> = self.stored.iter().map(|c| c.name().to_string()).collect();
        for name in stored {
            self.remove_stored_control(&name);
        }
        let _ = self.set_default(Direction::Input, None);
        let _ = self.set_default(Direction::Output, None);
    }
}
