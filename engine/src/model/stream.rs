use super::{control::Control, switch::Switch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Unknown,
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    name: String,
    label: String,
    direction: Direction,
    device: Option<String>,
    controls: Vec<Control>,
    switches: Vec<Switch>,
    default_control: Option<String>,
}

impl Stream {
    pub fn new(name: impl Into<String>, label: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            direction,
            device: None,
            controls: vec![],
            switches: vec![],
            default_control: None,
        }
    }

    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Name of the owning device, if the stream belongs to one.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// A stream without controls and switches is only a shell.
    pub fn is_present(&self) -> bool {
        !self.controls.is_empty() || !self.switches.is_empty()
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.name() == name)
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn switch(&self, name: &str) -> Option<&Switch> {
        self.switches.iter().find(|s| s.name() == name)
    }

    pub fn default_control(&self) -> Option<&Control> {
        self.default_control
            .as_deref()
            .and_then(|name| self.control(name))
            .or_else(|| self.controls.first())
    }

    pub(crate) fn control_mut(&mut self, name: &str) -> Option<&mut Control> {
        self.controls.iter_mut().find(|c| c.name() == name)
    }

    pub(crate) fn switch_mut(&mut self, name: &str) -> Option<&mut Switch> {
        self.switches.iter_mut().find(|s| s.name() == name)
    }

    pub(crate) fn push_control(&mut self, mut control: Control) {
        control.set_stream(Some(self.name.clone()));
        self.controls.push(control);
    }

    pub(crate) fn take_control(&mut self, name: &str) -> Option<Control> {
        let idx = self.controls.iter().position(|c| c.name() == name)?;
        let mut control = self.controls.remove(idx);
        control.set_stream(None);
        Some(control)
    }

    pub(crate) fn push_switch(&mut self, switch: Switch) {
        self.switches.push(switch);
    }

    pub(crate) fn take_switch(&mut self, name: &str) -> Option<Switch> {
        let idx = self.switches.iter().position(|s| s.name() == name)?;
        Some(self.switches.remove(idx))
    }

    pub(crate) fn set_device(&mut self, device: Option<String>) {
        self.device = device;
    }

    pub(crate) fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub(crate) fn set_default_control(&mut self, name: Option<String>) {
        self.default_control = name;
    }
}
