use super::protocol::{Facility, Index, SubscriptionEvent, TransportState};
use crate::backend::BackendState;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authorizing,
    Loading,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// The transport is ready; the caller issues the bulk lists.
    StartLoading,
    Dropped { was_established: bool },
}

pub type Notification = (Facility, SubscriptionEvent, Index);

/// Connection lifecycle plus the outstanding bulk-list counter.
#[derive(Debug, Default)]
pub struct Connection {
    state: ConnectionState,
    outstanding: usize,
    established: bool,
    deferred: VecDeque<Notification>,
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == ConnectionState::Loading
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether a previous session reached `Connected`.
    pub fn was_established(&self) -> bool {
        self.established
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn start(&mut self) {
        self.state = ConnectionState::Connecting;
        self.outstanding = 0;
        self.deferred.clear();
    }

    pub fn on_transport(&mut self, transport: TransportState) -> Transition {
        match transport {
            TransportState::Connecting => {
                if self.state == ConnectionState::Disconnected {
                    self.state = ConnectionState::Connecting;
                }
                Transition::None
            }
            TransportState::Authorizing | TransportState::SettingName => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Authorizing
                ) {
                    self.state = ConnectionState::Authorizing;
                }
                Transition::None
            }
            TransportState::Ready => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Authorizing
                ) {
                    self.state = ConnectionState::Loading;
                    Transition::StartLoading
                } else {
                    Transition::None
                }
            }
            TransportState::Failed | TransportState::Terminated => {
                if self.state == ConnectionState::Disconnected {
                    return Transition::None;
                }
                self.state = ConnectionState::Disconnected;
                self.outstanding = 0;
                self.deferred.clear();
                Transition::Dropped {
                    was_established: self.established,
                }
            }
        }
    }

    pub fn begin_loading(&mut self, lists: usize) {
        self.outstanding = lists;
    }

    /// Counts one end-of-list marker; true when it was the last one.
    pub fn list_finished(&mut self) -> bool {
        if !self.is_loading() || self.outstanding == 0 {
            return false;
        }
        self.outstanding -= 1;
        self.outstanding == 0
    }

    /// Promotes a finished load to `Connected` on the final server info.
    pub fn server_info_arrived(&mut self) -> bool {
        if self.is_loading() && self.outstanding == 0 {
            self.state = ConnectionState::Connected;
            self.established = true;
            true
        } else {
            false
        }
    }

    pub fn defer(&mut self, notification: Notification) {
        self.deferred.push_back(notification);
    }

    pub fn take_deferred(&mut self) -> Vec<Notification> {
        self.deferred.drain(..).collect()
    }

    pub fn backend_state(&self) -> BackendState {
        match self.state {
            ConnectionState::Connected => BackendState::Ready,
            ConnectionState::Disconnected => BackendState::Idle,
            _ => BackendState::Connecting,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
