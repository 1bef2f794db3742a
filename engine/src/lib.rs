#[cfg(target_os = "linux")]
pub mod alsa_backend;
pub mod backend;
pub mod channel;
pub mod defaults;
pub mod error;
pub mod hw;
pub mod hw_backend;
pub mod hw_worker;
pub mod message;
pub mod model;
pub mod server;
pub mod volume;

pub use backend::{Backend, BackendFlags, BackendInfo, BackendKind, BackendState, pump};
pub use channel::ChannelPosition;
pub use error::{Error, Result};
pub use message::MixerEvent;
pub use model::{Control, ControlRef, Device, Direction, Model, Stream, Switch, SwitchRef};
