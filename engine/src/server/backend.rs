use super::connection::{Connection, Transition};
use super::entity::{
    self, ControlOps, PORT_SWITCH, PROFILE_SWITCH, ServerControl, ServerSwitch, SwitchOps,
};
use super::protocol::{
    CardInfo, ClientStreamInfo, ConnectTarget, DeviceStreamInfo, EventSink, Facility, Index, RequestId,
    ServerConnection, ServerEvent, ServerInfo, ServerRequest, StoredInfo, SubscriptionEvent,
    TransportState,
};
use crate::backend::{Backend, BackendFlags, BackendInfo, BackendKind, BackendState};
use crate::error::{Error, Result};
use crate::model::{ControlRef, Device, Direction, Model, Stream, Switch, SwitchRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

pub const DEFAULT_PRIORITY: u32 = 100;
pub const DEFAULT_APPLICATION_NAME: &str = "maolan-mixer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub name: String,
    pub priority: u32,
    /// Reconnect once when an established connection drops.
    pub reconnect: bool,
    pub stored_controls: bool,
    pub application_name: String,
    pub address: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "pulse".to_string(),
            priority: DEFAULT_PRIORITY,
            reconnect: true,
            stored_controls: true,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            address: None,
        }
    }
}

impl ServerOptions {
    pub fn target(&self) -> ConnectTarget {
        ConnectTarget {
            application_name: self.application_name.clone(),
            address: self.address.clone(),
        }
    }
}

#[derive(Debug)]
struct CardEntry {
    name: String,
    hanging: bool,
}

#[derive(Debug)]
struct StreamEntry {
    name: String,
    card: Option<Index>,
    hanging: bool,
}

#[derive(Debug)]
struct ClientEntry {
    info: ClientStreamInfo,
    /// Stream the control currently lives in; `None` while the parent is unknown.
    attached: Option<String>,
    hanging: bool,
}

/// Server indices and names behind every model entity this backend created.
#[derive(Debug, Default)]
struct Entities {
    cards: BTreeMap<Index, CardEntry>,
    sinks: BTreeMap<Index, StreamEntry>,
    sources: BTreeMap<Index, StreamEntry>,
    sink_inputs: BTreeMap<Index, ClientEntry>,
    source_outputs: BTreeMap<Index, ClientEntry>,
    stored: BTreeMap<String, bool>,
    controls: HashMap<ControlRef, ServerControl>,
    switches: HashMap<SwitchRef, ServerSwitch>,
}

impl Entities {
    fn streams(&self, facility: Facility) -> &BTreeMap<Index, StreamEntry> {
        match facility {
            Facility::Sink => &self.sinks,
            _ => &self.sources,
        }
    }

    fn streams_mut(&mut self, facility: Facility) -> &mut BTreeMap<Index, StreamEntry> {
        match facility {
            Facility::Sink => &mut self.sinks,
            _ => &mut self.sources,
        }
    }

    fn clients(&self, facility: Facility) -> &BTreeMap<Index, ClientEntry> {
        match facility {
            Facility::SinkInput => &self.sink_inputs,
            _ => &self.source_outputs,
        }
    }

    fn clients_mut(&mut self, facility: Facility) -> &mut BTreeMap<Index, ClientEntry> {
        match facility {
            Facility::SinkInput => &mut self.sink_inputs,
            _ => &mut self.source_outputs,
        }
    }

    fn mark_hanging(&mut self, facility: Facility) {
        match facility {
            Facility::Card => self.cards.values_mut().for_each(|e| e.hanging = true),
            Facility::Sink | Facility::Source => self
                .streams_mut(facility)
                .values_mut()
                .for_each(|e| e.hanging = true),
            Facility::SinkInput | Facility::SourceOutput => self
                .clients_mut(facility)
                .values_mut()
                .for_each(|e| e.hanging = true),
            Facility::Stored => self.stored.values_mut().for_each(|h| *h = true),
            Facility::Server => {}
        }
    }

    fn unmark_hanging(&mut self, facility: Facility) {
        match facility {
            Facility::Stored => self.stored.values_mut().for_each(|h| *h = false),
            Facility::Card => self.cards.values_mut().for_each(|e| e.hanging = false),
            Facility::Sink | Facility::Source => self
                .streams_mut(facility)
                .values_mut()
                .for_each(|e| e.hanging = false),
            Facility::SinkInput | Facility::SourceOutput => self
                .clients_mut(facility)
                .values_mut()
                .for_each(|e| e.hanging = false),
            Facility::Server => {}
        }
    }

    fn hanging_indices(&self, facility: Facility) -> Vec<Index> {
        match facility {
            Facility::Card => self
                .cards
                .iter()
                .filter(|(_, e)| e.hanging)
                .map(|(i, _)| *i)
                .collect(),
            Facility::Sink | Facility::Source => self
                .streams(facility)
                .iter()
                .filter(|(_, e)| e.hanging)
                .map(|(i, _)| *i)
                .collect(),
            Facility::SinkInput | Facility::SourceOutput => self
                .clients(facility)
                .iter()
                .filter(|(_, e)| e.hanging)
                .map(|(i, _)| *i)
                .collect(),
            Facility::Stored | Facility::Server => vec![],
        }
    }
}

fn stream_direction(facility: Facility) -> Direction {
    match facility {
        Facility::Source | Facility::SourceOutput => Direction::Input,
        _ => Direction::Output,
    }
}

fn client_facility(stream: Facility) -> Facility {
    match stream {
        Facility::Sink => Facility::SinkInput,
        _ => Facility::SourceOutput,
    }
}

fn parent_facility(client: Facility) -> Facility {
    match client {
        Facility::SinkInput => Facility::Sink,
        _ => Facility::Source,
    }
}

fn backed_by(facility: Facility, index: Index) -> ServerControl {
    match stream_direction(facility) {
        Direction::Input => ServerControl::Input { facility, index },
        _ => ServerControl::Output { facility, index },
    }
}

/// Asynchronous synchronizer for a sound server reached through `C`.
///
/// All server traffic arrives as events on a queue drained by
/// [`Backend::dispatch`]; setters only submit requests and the model follows
/// once the server confirms, except for the optimistic default stream.
pub struct ServerBackend<C: ServerConnection> {
    info: BackendInfo,
    options: ServerOptions,
    transport: C,
    model: Model,
    connection: Connection,
    entities: Entities,
    waker: Arc<Notify>,
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    pending_input: Option<String>,
    pending_output: Option<String>,
    default_requests: HashMap<RequestId, (Direction, Option<String>)>,
    /// Outstanding bulk lists; a failed one counts as finished.
    list_requests: HashMap<RequestId, Facility>,
    reconnecting: bool,
    opened: bool,
}

impl<C: ServerConnection> ServerBackend<C> {
    pub fn new(transport: C, options: ServerOptions) -> Self {
        let info = BackendInfo::new(options.name.clone(), options.priority, BackendKind::Server)
            .with_flags(BackendFlags {
                application_controls: true,
                stored_controls: options.stored_controls,
                set_default_input: true,
                set_default_output: true,
            });
        Self {
            info,
            options,
            transport,
            model: Model::new(),
            connection: Connection::default(),
            entities: Entities::default(),
            waker: Arc::new(Notify::new()),
            events: None,
            pending_input: None,
            pending_output: None,
            default_requests: HashMap::new(),
            list_requests: HashMap::new(),
            reconnecting: false,
            opened: false,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn transport(&self) -> &C {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut C {
        &mut self.transport
    }

    /// Name the server reported as default before the stream itself arrived.
    pub fn pending_default(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Input => self.pending_input.as_deref(),
            _ => self.pending_output.as_deref(),
        }
    }

    fn pending_mut(&mut self, direction: Direction) -> &mut Option<String> {
        match direction {
            Direction::Input => &mut self.pending_input,
            _ => &mut self.pending_output,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let (sink, rx) = EventSink::new(self.waker.clone());
        self.events = Some(rx);
        self.connection.start();
        self.list_requests.clear();
        let target = self.options.target();
        self.transport.connect(sink, &target).map_err(|e| match e {
            Error::Connection(_) => e,
            other => Error::Connection(other.to_string()),
        })
    }

    fn request(&mut self, request: ServerRequest) -> Result<RequestId> {
        debug!("{} request {:?}", self.info.name, request);
        self.transport.send(request)
    }

    fn submit(&mut self, request: ServerRequest) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(Error::InvalidState(format!("{} is not connected", self.info.name)));
        }
        self.request(request).map(|_| ()).map_err(|e| {
            warn!("{} request failed: {}", self.info.name, e);
            e
        })
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::State(state) => self.on_transport(state),
            ServerEvent::Card(info) => self.upsert_card(info),
            ServerEvent::Sink(info) => self.upsert_stream(Facility::Sink, info),
            ServerEvent::Source(info) => self.upsert_stream(Facility::Source, info),
            ServerEvent::SinkInput(info) => self.upsert_client(Facility::SinkInput, info),
            ServerEvent::SourceOutput(info) => self.upsert_client(Facility::SourceOutput, info),
            ServerEvent::Stored(info) => self.upsert_stored(info),
            ServerEvent::Server(info) => self.on_server_info(info),
            ServerEvent::ListEnd(facility) => self.on_list_end(facility),
            ServerEvent::Subscription {
                facility,
                event,
                index,
            } => {
                if self.connection.is_connected() {
                    self.on_subscription(facility, event, index);
                } else if self.connection.is_loading() {
                    self.connection.defer((facility, event, index));
                }
            }
            ServerEvent::RequestFailed { id, reason } => self.on_request_failed(id, &reason),
        }
    }

    fn on_transport(&mut self, state: TransportState) {
        match self.connection.on_transport(state) {
            Transition::None => {}
            Transition::StartLoading => self.start_loading(),
            Transition::Dropped { was_established } => {
                self.on_dropped(was_established);
                return;
            }
        }
        self.model.set_state(self.connection.backend_state());
    }

    fn start_loading(&mut self) {
        let mut lists = Facility::LISTED.to_vec();
        if self.options.stored_controls {
            lists.push(Facility::Stored);
        }
        for facility in &lists {
            self.entities.mark_hanging(*facility);
        }
        if let Err(e) = self.request(ServerRequest::Subscribe) {
            self.fail(&format!("subscribe failed: {e}"));
            return;
        }
        self.connection.begin_loading(lists.len());
        for facility in lists {
            match self.request(ServerRequest::List(facility)) {
                Ok(id) => {
                    self.list_requests.insert(id, facility);
                }
                Err(e) => {
                    self.fail(&format!("listing {facility:?} failed: {e}"));
                    return;
                }
            }
        }
        debug!("{} loading", self.info.name);
    }

    fn on_dropped(&mut self, was_established: bool) {
        if was_established && self.options.reconnect && !self.reconnecting {
            warn!("{} connection lost, reconnecting", self.info.name);
            self.reconnecting = true;
            self.transport.disconnect();
            self.model.set_state(BackendState::Connecting);
            if let Err(e) = self.connect() {
                self.fail(&e.to_string());
            }
        } else {
            self.fail("connection lost");
        }
    }

    /// Tears everything down and parks the backend in `Failed`.
    fn fail(&mut self, reason: &str) {
        error!("{} failed: {}", self.info.name, reason);
        self.transport.disconnect();
        self.events = None;
        self.connection.reset();
        self.entities = Entities::default();
        self.pending_input = None;
        self.pending_output = None;
        self.default_requests.clear();
        self.list_requests.clear();
        self.reconnecting = false;
        self.model.clear();
        self.model.set_state(BackendState::Failed);
    }

    fn on_list_end(&mut self, facility: Facility) {
        self.list_requests.retain(|_, f| *f != facility);
        for index in self.entities.hanging_indices(facility) {
            debug!("{} {:?} {} vanished while away", self.info.name, facility, index);
            self.remove_entity(facility, index);
        }
        if facility == Facility::Stored {
            let names: Vec<String> = self
                .entities
                .stored
                .iter()
                .filter(|(_, hanging)| **hanging)
                .map(|(name, _)| name.clone())
                .collect();
            for name in names {
                self.remove_stored(&name);
            }
        }
        if self.connection.list_finished()
            && let Err(e) = self.request(ServerRequest::GetServerInfo)
        {
            self.fail(&format!("server info request failed: {e}"));
        }
    }

    fn on_server_info(&mut self, info: ServerInfo) {
        self.resolve_default(Direction::Output, info.default_sink);
        self.resolve_default(Direction::Input, info.default_source);
        if self.connection.server_info_arrived() {
            self.reconnecting = false;
            info!(
                "{} connected to {} {}",
                self.info.name, info.server_name, info.server_version
            );
            self.model.set_state(BackendState::Ready);
            for (facility, event, index) in self.connection.take_deferred() {
                self.on_subscription(facility, event, index);
            }
        }
    }

    fn on_subscription(&mut self, facility: Facility, event: SubscriptionEvent, index: Index) {
        let result = match (facility, event) {
            (Facility::Server, _) => self.request(ServerRequest::GetServerInfo).map(|_| ()),
            (Facility::Stored, _) => {
                if !self.options.stored_controls {
                    return;
                }
                self.entities.mark_hanging(Facility::Stored);
                self.request(ServerRequest::List(Facility::Stored))
                    .map(|id| {
                        self.list_requests.insert(id, Facility::Stored);
                    })
            }
            (_, SubscriptionEvent::Remove) => {
                self.remove_entity(facility, index);
                Ok(())
            }
            (_, SubscriptionEvent::New | SubscriptionEvent::Change) => self
                .request(ServerRequest::Get { facility, index })
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!("{} failed to follow {:?} {}: {}", self.info.name, facility, index, e);
        }
    }

    fn on_request_failed(&mut self, id: RequestId, reason: &str) {
        warn!("{} request {} failed: {}", self.info.name, id, reason);
        if let Some(facility) = self.list_requests.remove(&id) {
            if self.connection.is_loading() {
                self.on_list_end(facility);
            } else {
                self.entities.unmark_hanging(facility);
            }
            return;
        }
        let Some((direction, previous)) = self.default_requests.remove(&id) else {
            return;
        };
        let previous = previous.filter(|name| self.model.stream(name).is_some());
        if let Err(e) = self.model.set_default(direction, previous) {
            warn!("{} could not restore default: {}", self.info.name, e);
        }
    }

    fn remove_entity(&mut self, facility: Facility, index: Index) {
        match facility {
            Facility::Card => self.remove_card(index),
            Facility::Sink | Facility::Source => self.remove_stream_entity(facility, index),
            Facility::SinkInput | Facility::SourceOutput => self.remove_client(facility, index),
            Facility::Stored | Facility::Server => {}
        }
    }

    fn sync_switch(&mut self, target: SwitchRef, switch: Option<Switch>, binding: ServerSwitch) {
        let exists = self.entities.switches.contains_key(&target);
        let result = match (exists, switch) {
            (false, Some(switch)) => {
                self.entities.switches.insert(target.clone(), binding);
                self.model.add_switch(target.clone(), switch)
            }
            (true, Some(switch)) => {
                let active = switch.active_option().map(|o| o.name().to_string());
                self.model
                    .set_switch_options(&target, switch.label(), switch.options().to_vec())
                    .and_then(|_| self.model.set_active_option(&target, active.as_deref()))
                    .map(|_| ())
            }
            (true, None) => {
                self.entities.switches.remove(&target);
                self.model.remove_switch(&target);
                Ok(())
            }
            (false, None) => Ok(()),
        };
        if let Err(e) = result {
            warn!("{} switch {} not synced: {}", self.info.name, target.switch_name(), e);
        }
    }

    fn upsert_card(&mut self, info: CardInfo) {
        let known = self.entities.cards.get(&info.index).map(|e| e.name.clone());
        if let Some(name) = &known
            && *name != info.name
        {
            self.remove_card(info.index);
        }
        let name = info.name.clone();
        if known.as_deref() == Some(name.as_str()) {
            if let Some(entry) = self.entities.cards.get_mut(&info.index) {
                entry.hanging = false;
            }
            if let Err(e) = self
                .model
                .update_device(&name, info.description.clone(), info.icon.clone())
            {
                warn!("{} card {} not updated: {}", self.info.name, name, e);
            }
        } else {
            let device =
                Device::new(name.clone(), info.description.clone()).with_icon(info.icon.clone());
            if let Err(e) = self.model.add_device(device) {
                warn!("{} card {} not added: {}", self.info.name, name, e);
                return;
            }
            self.entities.cards.insert(
                info.index,
                CardEntry {
                    name: name.clone(),
                    hanging: false,
                },
            );
            for facility in [Facility::Sink, Facility::Source] {
                let orphans: Vec<String> = self
                    .entities
                    .streams(facility)
                    .values()
                    .filter(|s| s.card == Some(info.index))
                    .map(|s| s.name.clone())
                    .collect();
                for stream in orphans {
                    if let Err(e) = self.model.set_stream_device(&stream, Some(name.clone())) {
                        debug!("{} stream {} not moved to {}: {}", self.info.name, stream, name, e);
                    }
                }
            }
        }
        self.sync_switch(
            SwitchRef::device(name, PROFILE_SWITCH),
            entity::profile_switch(&info),
            ServerSwitch::Profile { card: info.index },
        );
    }

    fn remove_card(&mut self, index: Index) {
        let Some(entry) = self.entities.cards.remove(&index) else {
            return;
        };
        self.entities
            .switches
            .remove(&SwitchRef::device(entry.name.clone(), PROFILE_SWITCH));
        self.model.remove_device(&entry.name);
    }

    fn upsert_stream(&mut self, facility: Facility, info: DeviceStreamInfo) {
        if info.monitor_of.is_some() {
            self.remove_stream_entity(facility, info.index);
            return;
        }
        let known = self
            .entities
            .streams(facility)
            .get(&info.index)
            .map(|e| e.name.clone());
        if known.as_ref().is_some_and(|n| *n != info.name) {
            self.remove_stream_entity(facility, info.index);
        }
        let name = info.name.clone();
        let device = info
            .card
            .and_then(|c| self.entities.cards.get(&c))
            .map(|c| c.name.clone());
        let role = entity::role_for_stream(facility);
        let target = ControlRef::stream(name.clone(), name.clone());

        if known.as_deref() == Some(name.as_str()) {
            if let Some(entry) = self.entities.streams_mut(facility).get_mut(&info.index) {
                entry.hanging = false;
                entry.card = info.card;
            }
            if let Err(e) = self
                .model
                .set_stream_label(&name, &info.description)
                .and_then(|_| self.model.set_stream_device(&name, device))
            {
                debug!("{} stream {} not relabelled: {}", self.info.name, name, e);
            }
            let control = entity::stream_control(&info, role);
            if let Err(e) = self.model.update_control(&target, |c| c.assign(control)) {
                warn!("{} stream {} not updated: {}", self.info.name, name, e);
            }
        } else {
            let stream = Stream::new(name.clone(), info.description.clone(), stream_direction(facility))
                .with_device(device);
            if let Err(e) = self.model.insert_stream(stream) {
                warn!("{} stream {} not added: {}", self.info.name, name, e);
                return;
            }
            self.entities.streams_mut(facility).insert(
                info.index,
                StreamEntry {
                    name: name.clone(),
                    card: info.card,
                    hanging: false,
                },
            );
            if let Err(e) = self.model.add_control(&name, entity::stream_control(&info, role)) {
                warn!("{} stream {} has no control: {}", self.info.name, name, e);
            } else {
                self.entities
                    .controls
                    .insert(target, backed_by(facility, info.index));
            }
            if let Err(e) = self.model.set_stream_default_control(&name, Some(name.clone())) {
                debug!("{} default control of {} not set: {}", self.info.name, name, e);
            }

            let clients = client_facility(facility);
            let waiting: Vec<Index> = self
                .entities
                .clients(clients)
                .iter()
                .filter(|(_, c)| c.info.parent == info.index && c.attached.is_none())
                .map(|(i, _)| *i)
                .collect();
            for index in waiting {
                self.attach_client(clients, index);
            }
        }

        self.sync_switch(
            SwitchRef::stream(name.clone(), PORT_SWITCH),
            entity::port_switch(&info),
            ServerSwitch::Port {
                facility,
                index: info.index,
            },
        );

        let direction = stream_direction(facility);
        if self.pending_default(direction) == Some(name.as_str()) {
            *self.pending_mut(direction) = None;
            if let Err(e) = self.model.set_default(direction, Some(name)) {
                warn!("{} pending default not applied: {}", self.info.name, e);
            }
        }
    }

    fn remove_stream_entity(&mut self, facility: Facility, index: Index) {
        let Some(entry) = self.entities.streams_mut(facility).remove(&index) else {
            return;
        };
        let clients = client_facility(facility);
        let attached: Vec<Index> = self
            .entities
            .clients(clients)
            .iter()
            .filter(|(_, c)| c.attached.as_deref() == Some(entry.name.as_str()))
            .map(|(i, _)| *i)
            .collect();
        for client in attached {
            self.detach_client(clients, client);
        }
        let port = SwitchRef::stream(entry.name.clone(), PORT_SWITCH);
        if self.entities.switches.remove(&port).is_some() {
            self.model.remove_switch(&port);
        }
        self.entities
            .controls
            .remove(&ControlRef::stream(entry.name.clone(), entry.name.clone()));
        self.model.remove_control(&entry.name, &entry.name);
        self.model.remove_stream(&entry.name);
    }

    fn upsert_client(&mut self, facility: Facility, info: ClientStreamInfo) {
        let index = info.index;
        let parent = self
            .entities
            .streams(parent_facility(facility))
            .get(&info.parent)
            .map(|s| s.name.clone());
        let attached = self
            .entities
            .clients(facility)
            .get(&index)
            .and_then(|c| c.attached.clone());
        self.entities.clients_mut(facility).insert(
            index,
            ClientEntry {
                info: info.clone(),
                attached: attached.clone(),
                hanging: false,
            },
        );
        match (attached, parent) {
            (Some(current), Some(parent)) if current == parent => {
                let target = ControlRef::stream(current, entity::client_control_name(facility, index));
                let control = entity::client_control(facility, &info);
                if let Err(e) = self.model.update_control(&target, |c| c.assign(control)) {
                    warn!("{} client {} not updated: {}", self.info.name, index, e);
                }
            }
            (current, parent) => {
                if current.is_some() {
                    self.detach_client(facility, index);
                }
                if parent.is_some() {
                    self.attach_client(facility, index);
                }
            }
        }
    }

    fn attach_client(&mut self, facility: Facility, index: Index) {
        let Some(entry) = self.entities.clients(facility).get(&index) else {
            return;
        };
        let Some(parent) = self
            .entities
            .streams(parent_facility(facility))
            .get(&entry.info.parent)
            .map(|s| s.name.clone())
        else {
            return;
        };
        let control = entity::client_control(facility, &entry.info);
        let target = ControlRef::stream(parent.clone(), control.name().to_string());
        if let Err(e) = self.model.add_control(&parent, control) {
            warn!("{} client {} not attached: {}", self.info.name, index, e);
            return;
        }
        self.entities
            .controls
            .insert(target, backed_by(facility, index));
        if let Some(entry) = self.entities.clients_mut(facility).get_mut(&index) {
            entry.attached = Some(parent);
        }
    }

    fn detach_client(&mut self, facility: Facility, index: Index) {
        let Some(stream) = self
            .entities
            .clients_mut(facility)
            .get_mut(&index)
            .and_then(|c| c.attached.take())
        else {
            return;
        };
        let name = entity::client_control_name(facility, index);
        self.entities
            .controls
            .remove(&ControlRef::stream(stream.clone(), name.clone()));
        self.model.remove_control(&stream, &name);
    }

    fn remove_client(&mut self, facility: Facility, index: Index) {
        self.detach_client(facility, index);
        self.entities.clients_mut(facility).remove(&index);
    }

    fn upsert_stored(&mut self, info: StoredInfo) {
        if !self.options.stored_controls {
            return;
        }
        let target = ControlRef::stored(info.name.clone());
        let control = entity::stored_control(&info);
        if let Some(hanging) = self.entities.stored.get_mut(&info.name) {
            *hanging = false;
            if let Err(e) = self.model.update_control(&target, |c| c.assign(control)) {
                warn!("{} stored {} not updated: {}", self.info.name, info.name, e);
            }
            return;
        }
        if let Err(e) = self.model.add_stored_control(control) {
            warn!("{} stored {} not added: {}", self.info.name, info.name, e);
            return;
        }
        self.entities.stored.insert(info.name.clone(), false);
        self.entities
            .controls
            .insert(target, ServerControl::Stored { name: info.name });
    }

    fn remove_stored(&mut self, name: &str) {
        if self.entities.stored.remove(name).is_none() {
            return;
        }
        self.entities.controls.remove(&ControlRef::stored(name));
        self.model.remove_stored_control(name);
    }

    fn resolve_default(&mut self, direction: Direction, name: Option<String>) {
        let Some(name) = name else {
            *self.pending_mut(direction) = None;
            let _ = self.model.set_default(direction, None);
            return;
        };
        let known = self
            .model
            .stream(&name)
            .is_some_and(|s| s.direction() == direction);
        if known {
            *self.pending_mut(direction) = None;
            if let Err(e) = self.model.set_default(direction, Some(name)) {
                warn!("{} default not applied: {}", self.info.name, e);
            }
            return;
        }
        if self.pending_default(direction) == Some(name.as_str()) {
            return;
        }
        debug!("{} default {:?} {} not known yet", self.info.name, direction, name);
        let _ = self.model.set_default(direction, None);
        *self.pending_mut(direction) = Some(name.clone());
        let facility = match direction {
            Direction::Input => Facility::Source,
            _ => Facility::Sink,
        };
        if let Err(e) = self.request(ServerRequest::GetByName { facility, name }) {
            warn!("{} could not fetch default stream: {}", self.info.name, e);
        }
    }

    fn set_default_stream(&mut self, direction: Direction, name: &str) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(Error::InvalidState(format!("{} is not connected", self.info.name)));
        }
        if !self
            .model
            .stream(name)
            .is_some_and(|s| s.direction() == direction)
        {
            return Err(Error::NotFound(format!("{direction:?} stream {name}")));
        }
        let facility = match direction {
            Direction::Input => Facility::Source,
            _ => Facility::Sink,
        };
        let previous = self.model.default_name(direction).map(str::to_string);
        let id = self.request(ServerRequest::SetDefault {
            facility,
            name: name.to_string(),
        })?;
        self.default_requests.insert(id, (direction, previous));
        *self.pending_mut(direction) = None;
        self.model.set_default(direction, Some(name.to_string()))?;
        Ok(())
    }
}

impl<C: ServerConnection> Backend for ServerBackend<C> {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn model(&self) -> &Model {
        &self.model
    }

    fn open(&mut self) -> Result<BackendState> {
        if self.opened {
            return Ok(self.model.state());
        }
        self.opened = true;
        self.model.set_state(BackendState::Connecting);
        if let Err(e) = self.connect() {
            self.fail(&e.to_string());
            return Err(e);
        }
        Ok(BackendState::Connecting)
    }

    fn close(&mut self) {
        if !self.opened {
            return;
        }
        self.transport.disconnect();
        self.events = None;
        self.connection.reset();
        self.entities = Entities::default();
        self.pending_input = None;
        self.pending_output = None;
        self.default_requests.clear();
        self.list_requests.clear();
        self.reconnecting = false;
        self.model.clear();
        self.opened = false;
        self.model.set_state(BackendState::Idle);
    }

    fn dispatch(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(events) = self.events.as_mut() else {
                break;
            };
            let Ok(event) = events.try_recv() else {
                break;
            };
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn waker(&self) -> Arc<Notify> {
        self.waker.clone()
    }

    fn set_default_input(&mut self, stream: &str) -> Result<()> {
        self.set_default_stream(Direction::Input, stream)
    }

    fn set_default_output(&mut self, stream: &str) -> Result<()> {
        self.set_default_stream(Direction::Output, stream)
    }

    fn write_volumes(&mut self, target: &ControlRef, volumes: Vec<u32>) -> Result<()> {
        let binding = self
            .entities
            .controls
            .get(target)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("control {target:?}")))?;
        let request = binding.volume_request(self.control(target)?, volumes)?;
        self.submit(request)
    }

    fn write_mute(&mut self, target: &ControlRef, mute: bool) -> Result<()> {
        let binding = self
            .entities
            .controls
            .get(target)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("control {target:?}")))?;
        let request = binding.mute_request(self.control(target)?, mute)?;
        self.submit(request)
    }

    fn write_active_option(&mut self, target: &SwitchRef, option: &str) -> Result<()> {
        let binding = self
            .entities
            .switches
            .get(target)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("switch {target:?}")))?;
        self.submit(binding.select_request(option))
    }
}

impl<C: ServerConnection> Drop for ServerBackend<C> {
    fn drop(&mut self) {
        if self.opened {
            self.transport.disconnect();
        }
    }
}
