use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchKind {
    #[default]
    Generic,
    Port,
    Profile,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOption {
    name: String,
    label: String,
    icon: Option<String>,
}

impl SwitchOption {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            icon: None,
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
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    name: String,
    label: String,
    kind: SwitchKind,
    options: Vec<SwitchOption>,
    active: Option<usize>,
}

impl Switch {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: SwitchKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            options: vec![],
            active: None,
        }
    }

    /// Two-option switch; the first option is "on".
    pub fn toggle(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, SwitchKind::Toggle).with_options(vec![
            SwitchOption::new("on", "On"),
            SwitchOption::new("off", "Off"),
        ])
    }

    pub fn with_options(mut self, options: Vec<SwitchOption>) -> Self {
        self.options = options;
        self.active = None;
        self
    }

    pub fn with_active(mut self, option: Option<&str>) -> Self {
        let active = option.and_then(|name| self.position(name));
        self.active = active;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    pub fn options(&self) -> &[SwitchOption] {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&SwitchOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn active_option(&self) -> Option<&SwitchOption> {
        self.active.and_then(|idx| self.options.get(idx))
    }

    pub fn is_toggle(&self) -> bool {
        self.kind == SwitchKind::Toggle
    }

    /// State of a toggle; `None` for other switches or before the first read.
    pub fn is_on(&self) -> Option<bool> {
        if !self.is_toggle() {
            return None;
        }
        self.active.map(|idx| idx == 0)
    }

    pub(crate) fn position(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|o| o.name == option)
    }

    /// Returns true when the active option actually changed.
    pub(crate) fn set_active(&mut self, option: Option<usize>) -> bool {
        let option = option.filter(|&idx| idx < self.options.len());
        if self.active == option {
            return false;
        }
        self.active = option;
        true
    }

    pub(crate) fn set_options(&mut self, options: Vec<SwitchOption>) {
        let active = self
            .active_option()
            .map(|o| o.name.clone())
            .and_then(|name| options.iter().position(|o| o.name == name));
        self.options = options;
        self.active = active;
    }

    pub(crate) fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }
}
