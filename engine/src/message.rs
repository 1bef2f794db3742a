use crate::backend::BackendState;
use crate::model::{ControlChanges, ControlRef, SwitchRef};

/// Change notifications fanned out to consumers of a backend.
#[derive(Clone, Debug, PartialEq)]
pub enum MixerEvent {
    StateChanged(BackendState),

    DeviceAdded(String),
    DeviceChanged(String),
    DeviceRemoved(String),

    StreamAdded(String),
    StreamChanged(String),
    StreamRemoved(String),

    ControlAdded {
        stream: String,
        control: String,
    },
    ControlChanged {
        control: ControlRef,
        changes: ControlChanges,
    },
    ControlRemoved {
        stream: String,
        control: String,
    },

    StoredControlAdded(String),
    StoredControlRemoved(String),

    SwitchAdded(SwitchRef),
    SwitchChanged(SwitchRef),
    SwitchRemoved(SwitchRef),
    ActiveOptionChanged {
        switch: SwitchRef,
        option: Option<String>,
    },

    DefaultInputChanged(Option<String>),
    DefaultOutputChanged(Option<String>),
}
