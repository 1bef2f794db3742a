use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("I/O error on {target}: {reason}")]
    Io { target: String, reason: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to load {entity}: {reason}")]
    EntityLoad { entity: String, reason: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol inconsistency: {0}")]
    Protocol(String),

    #[error("handle for {0} is closed")]
    Closed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("channels of control {0} are joined, set all channels at once")]
    JoinedChannels(String),

    #[error("control {0} has no channels")]
    NoChannels(String),

    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: String },

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("invalid backend state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn io(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Io {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn entity_load(entity: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::EntityLoad {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
