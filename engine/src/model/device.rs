use super::switch::Switch;

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    name: String,
    label: String,
    icon: Option<String>,
    switches: Vec<Switch>,
}

impl Device {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            icon: None,
            switches: vec![],
        }
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn switch(&self, name: &str) -> Option<&Switch> {
        self.switches.iter().find(|s| s.name() == name)
    }

    pub(crate) fn switch_mut(&mut self, name: &str) -> Option<&mut Switch> {
        self.switches.iter_mut().find(|s| s.name() == name)
    }

    pub(crate) fn push_switch(&mut self, switch: Switch) {
        self.switches.push(switch);
    }

    pub(crate) fn take_switch(&mut self, name: &str) -> Option<Switch> {
        let idx = self.switches.iter().position(|s| s.name() == name)?;
        Some(self.switches.remove(idx))
    }

    pub(crate) fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub(crate) fn set_icon(&mut self, icon: Option<String>) {
        self.icon = icon;
    }
}
