//! Boundary between the synchronizer and a sound-server transport.
//!
//! The transport owns the wire format. It reports everything it learns as
//! [`ServerEvent`]s through an [`EventSink`] and accepts [`ServerRequest`]s,
//! whose outcome arrives later as events.

use crate::channel::ChannelPosition;
use crate::error::Result;
use crate::model::AppInfo;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

pub type Index = u32;
pub type RequestId = u64;

/// Software volume at 0 dB.
pub const VOLUME_NORM: u32 = 0x10000;
/// Upper bound offered to users, about +11 dB.
pub const VOLUME_UI_MAX: u32 = 99_957;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Facility {
    Card,
    Sink,
    Source,
    SinkInput,
    SourceOutput,
    Stored,
    Server,
}

impl Facility {
    /// Entity kinds bulk-listed on every (re)connect, stored entries excluded.
    pub const LISTED: [Facility; 5] = [
        Facility::Card,
        Facility::Sink,
        Facility::SinkInput,
        Facility::Source,
        Facility::SourceOutput,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    New,
    Change,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Authorizing,
    SettingName,
    Ready,
    Failed,
    Terminated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_name: String,
    pub server_version: String,
    pub default_sink: Option<String>,
    pub default_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
    pub priority: u32,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub name: String,
    pub description: String,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub index: Index,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub profiles: Vec<ProfileInfo>,
    pub active_profile: Option<String>,
}

/// A sink or a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStreamInfo {
    pub index: Index,
    pub name: String,
    pub description: String,
    pub card: Option<Index>,
    pub positions: Vec<ChannelPosition>,
    pub volumes: Vec<u32>,
    pub base_volume: u32,
    pub mute: bool,
    pub ports: Vec<PortInfo>,
    pub active_port: Option<String>,
    /// Set on sources that only mirror a sink.
    pub monitor_of: Option<Index>,
}

/// A sink input or a source output, i.e. one application's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStreamInfo {
    pub index: Index,
    pub name: String,
    /// Sink or source the client is connected to.
    pub parent: Index,
    pub app: AppInfo,
    pub positions: Vec<ChannelPosition>,
    pub volumes: Vec<u32>,
    pub mute: bool,
    pub has_volume: bool,
    pub volume_writable: bool,
}

/// A volume the server remembers for an application or a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInfo {
    pub name: String,
    pub device: Option<String>,
    pub positions: Vec<ChannelPosition>,
    pub volumes: Vec<u32>,
    pub mute: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    State(TransportState),
    Card(CardInfo),
    Sink(DeviceStreamInfo),
    Source(DeviceStreamInfo),
    SinkInput(ClientStreamInfo),
    SourceOutput(ClientStreamInfo),
    Stored(StoredInfo),
    Server(ServerInfo),
    /// End marker of a bulk list.
    ListEnd(Facility),
    Subscription {
        facility: Facility,
        event: SubscriptionEvent,
        index: Index,
    },
    RequestFailed {
        id: RequestId,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRequest {
    Subscribe,
    List(Facility),
    GetServerInfo,
    Get { facility: Facility, index: Index },
    GetByName { facility: Facility, name: String },
    SetVolume {
        facility: Facility,
        index: Index,
        volumes: Vec<u32>,
    },
    SetMute {
        facility: Facility,
        index: Index,
        mute: bool,
    },
    SetPort {
        facility: Facility,
        index: Index,
        port: String,
    },
    SetProfile { card: Index, profile: String },
    SetDefault { facility: Facility, name: String },
    WriteStored(StoredInfo),
}

/// Where a transport delivers events; every push rings the backend doorbell.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ServerEvent>,
    waker: Arc<Notify>,
}

impl EventSink {
    pub fn new(waker: Arc<Notify>) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, waker }, rx)
    }

    /// Returns false once the backend stopped listening to this sink.
    pub fn push(&self, event: ServerEvent) -> bool {
        let delivered = self.tx.send(event).is_ok();
        if delivered {
            self.waker.notify_one();
        }
        delivered
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Identity the backend announces and the server it asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectTarget {
    pub application_name: String,
    /// The transport's own default server when unset.
    pub address: Option<String>,
}

pub trait ServerConnection: Send {
    /// Starts connecting; progress is reported as [`ServerEvent::State`].
    fn connect(&mut self, sink: EventSink, target: &ConnectTarget) -> Result<()>;

    fn disconnect(&mut self);

    fn send(&mut self, request: ServerRequest) -> Result<RequestId>;
}
