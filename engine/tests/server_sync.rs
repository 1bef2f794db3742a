mod common;

use common::{FakeServer, drain, trace};
use maolan_mixer_engine::backend::{Backend, BackendState};
use maolan_mixer_engine::channel::ChannelPosition::{BackLeft, BackRight, FrontLeft, FrontRight};
use maolan_mixer_engine::message::MixerEvent;
use maolan_mixer_engine::model::{ControlRef, Direction, SwitchRef};
use maolan_mixer_engine::server::protocol::{
    CardInfo, ConnectTarget, DeviceStreamInfo, Facility, Index, PortInfo, ProfileInfo, RequestId, ServerEvent,
    ServerInfo, ServerRequest, StoredInfo, SubscriptionEvent, TransportState, VOLUME_NORM,
};
use maolan_mixer_engine::server::{ServerBackend, ServerOptions};

fn sink(index: Index, name: &str) -> DeviceStreamInfo {
    DeviceStreamInfo {
        index,
        name: name.into(),
        description: format!("Sink {name}"),
        card: None,
        positions: vec![FrontLeft, FrontRight],
        volumes: vec![VOLUME_NORM, VOLUME_NORM],
        base_volume: VOLUME_NORM,
        mute: false,
        ports: vec![],
        active_port: None,
        monitor_of: None,
    }
}

fn options(reconnect: bool) -> ServerOptions {
    trace();
    ServerOptions {
        reconnect,
        stored_controls: false,
        ..ServerOptions::default()
    }
}

fn stored(name: &str, volume: u32) -> StoredInfo {
    StoredInfo {
        name: name.into(),
        device: None,
        positions: vec![FrontLeft, FrontRight],
        volumes: vec![volume, volume],
        mute: false,
    }
}

/// Id the fake transport handed out for the latest `request`.
fn request_id(server: &FakeServer, request: &ServerRequest) -> RequestId {
    let position = server.sent().iter().rposition(|r| r == request).unwrap();
    position as RequestId + 1
}

fn stored_names(backend: &ServerBackend<FakeServer>) -> Vec<String> {
    let mut names: Vec<String> = backend
        .list_stored_controls()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    names.sort();
    names
}

fn load(server: &FakeServer, sinks: &[DeviceStreamInfo], default: &str) {
    let mut events = vec![ServerEvent::State(TransportState::Ready)];
    events.extend(sinks.iter().cloned().map(ServerEvent::Sink));
    events.extend(Facility::LISTED.into_iter().map(ServerEvent::ListEnd));
    events.push(ServerEvent::Server(ServerInfo {
        default_sink: Some(default.into()),
        ..ServerInfo::default()
    }));
    server.push(events);
}

fn connected(server: &FakeServer, sinks: &[DeviceStreamInfo]) -> ServerBackend<FakeServer> {
    let mut backend = ServerBackend::new(server.clone(), options(true));
    assert_eq!(backend.open().unwrap(), BackendState::Connecting);
    load(server, sinks, "a");
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Ready);
    backend
}

fn stream_names(backend: &ServerBackend<FakeServer>) -> Vec<String> {
    backend
        .list_streams()
        .iter()
        .map(|s| s.name().to_string())
        .collect()
}

#[test]
fn reconnect_drops_vanished_sink_after_its_list() {
    let server = FakeServer::default();
    let mut backend = connected(&server, &[sink(1, "a"), sink(2, "b"), sink(3, "c")]);
    assert_eq!(stream_names(&backend), vec!["a", "b", "c"]);
    let mut events = backend.subscribe();

    server.push([ServerEvent::State(TransportState::Terminated)]);
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Connecting);
    assert_eq!(server.connects(), 2);

    server.push([
        ServerEvent::State(TransportState::Ready),
        ServerEvent::Sink(sink(1, "a")),
        ServerEvent::Sink(sink(3, "c")),
        ServerEvent::ListEnd(Facility::Card),
    ]);
    backend.dispatch();
    assert_eq!(stream_names(&backend), vec!["a", "b", "c"]);

    server.push([ServerEvent::ListEnd(Facility::Sink)]);
    backend.dispatch();
    assert_eq!(stream_names(&backend), vec!["a", "c"]);

    server.push([
        ServerEvent::ListEnd(Facility::SinkInput),
        ServerEvent::ListEnd(Facility::Source),
        ServerEvent::ListEnd(Facility::SourceOutput),
        ServerEvent::Server(ServerInfo {
            default_sink: Some("a".into()),
            ..ServerInfo::default()
        }),
    ]);
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Ready);

    let events = drain(&mut events);
    let removed: Vec<&MixerEvent> = events
        .iter()
        .filter(|e| matches!(e, MixerEvent::StreamRemoved(_)))
        .collect();
    assert_eq!(removed, vec![&MixerEvent::StreamRemoved("b".into())]);
    assert!(!events.contains(&MixerEvent::StreamAdded("a".into())));
    assert_eq!(backend.default_output_stream().unwrap().name(), "a");
    let subscribes = server
        .sent()
        .iter()
        .filter(|r| **r == ServerRequest::Subscribe)
        .count();
    assert_eq!(subscribes, 2);
}

#[test]
fn drop_without_reconnect_fails_and_clears() {
    let server = FakeServer::default();
    let mut backend = ServerBackend::new(server.clone(), options(false));
    backend.open().unwrap();
    load(&server, &[sink(1, "a")], "a");
    backend.dispatch();
    assert_eq!(backend.list_streams().len(), 1);

    server.push([ServerEvent::State(TransportState::Failed)]);
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Failed);
    assert!(backend.list_streams().is_empty());
    assert!(backend.default_output_stream().is_none());
    assert!(!server.is_connected());
}

#[test]
fn second_drop_while_reconnecting_is_terminal() {
    let server = FakeServer::default();
    let mut backend = connected(&server, &[sink(1, "a")]);
    server.push([ServerEvent::State(TransportState::Terminated)]);
    backend.dispatch();
    server.push([ServerEvent::State(TransportState::Failed)]);
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Failed);
    assert_eq!(server.connects(), 2);
}

#[test]
fn removal_of_unknown_index_is_ignored() {
    let server = FakeServer::default();
    let mut backend = connected(&server, &[sink(1, "a")]);
    let mut events = backend.subscribe();
    server.push([ServerEvent::Subscription {
        facility: Facility::Sink,
        event: SubscriptionEvent::Remove,
        index: 42,
    }]);
    backend.dispatch();
    assert!(drain(&mut events).is_empty());
    assert_eq!(stream_names(&backend), vec!["a"]);
}

#[test]
fn change_notification_refetches_entity() {
    let server = FakeServer::default();
    let mut backend = connected(&server, &[sink(1, "a")]);
    server.push([ServerEvent::Subscription {
        facility: Facility::Sink,
        event: SubscriptionEvent::Change,
        index: 1,
    }]);
    backend.dispatch();
    assert_eq!(
        server.sent().last(),
        Some(&ServerRequest::Get {
            facility: Facility::Sink,
            index: 1
        })
    );

    let mut quieter = sink(1, "a");
    quieter.volumes = vec![VOLUME_NORM / 2, VOLUME_NORM / 2];
    server.push([ServerEvent::Sink(quieter)]);
    backend.dispatch();
    let control = backend.control(&ControlRef::stream("a", "a")).unwrap();
    assert_eq!(control.volume(), Some(VOLUME_NORM / 2));
}

#[test]
fn card_profiles_and_sink_ports_become_switches() {
    let server = FakeServer::default();
    let mut backend = ServerBackend::new(server.clone(), options(true));
    backend.open().unwrap();

    let card = CardInfo {
        index: 0,
        name: "alsa_card.pci".into(),
        description: "Built-in Audio".into(),
        icon: Some("audio-card".into()),
        profiles: vec![
            ProfileInfo {
                name: "output:analog-stereo".into(),
                description: "Analog Stereo Output".into(),
                priority: 60,
            },
            ProfileInfo {
                name: "off".into(),
                description: "Off".into(),
                priority: 0,
            },
        ],
        active_profile: Some("output:analog-stereo".into()),
    };
    let mut speakers = sink(5, "speakers");
    speakers.card = Some(0);
    speakers.ports = vec![PortInfo {
        name: "analog-output-speaker".into(),
        description: "Speakers".into(),
        priority: 100,
        available: true,
    }];
    speakers.active_port = Some("analog-output-speaker".into());

    // The sink arrives before its card and is attached once the card shows up.
    let mut events = vec![
        ServerEvent::State(TransportState::Ready),
        ServerEvent::Sink(speakers),
        ServerEvent::Card(card),
    ];
    events.extend(Facility::LISTED.into_iter().map(ServerEvent::ListEnd));
    events.push(ServerEvent::Server(ServerInfo::default()));
    server.push(events);
    backend.dispatch();

    let stream = backend.model().stream("speakers").unwrap();
    assert_eq!(stream.device(), Some("alsa_card.pci"));
    let profile = SwitchRef::device("alsa_card.pci", "profile");
    assert_eq!(
        backend.switch(&profile).unwrap().active_option().unwrap().name(),
        "output:analog-stereo"
    );

    backend.set_active_option(&profile, "off").unwrap();
    assert_eq!(
        server.sent().last(),
        Some(&ServerRequest::SetProfile {
            card: 0,
            profile: "off".into()
        })
    );
    assert!(
        backend
            .set_active_option(&SwitchRef::stream("speakers", "port"), "hdmi")
            .is_err()
    );
}

#[test]
fn monitor_sources_are_not_modelled() {
    let server = FakeServer::default();
    let mut backend = connected(&server, &[sink(1, "a")]);
    let mut monitor = sink(2, "a.monitor");
    monitor.monitor_of = Some(1);
    server.push([ServerEvent::Source(monitor)]);
    backend.dispatch();
    assert!(backend.model().stream("a.monitor").is_none());
}

#[test]
fn failed_stored_list_still_finishes_loading() {
    trace();
    let server = FakeServer::default();
    let mut backend = ServerBackend::new(server.clone(), ServerOptions::default());
    backend.open().unwrap();
    server.push([ServerEvent::State(TransportState::Ready)]);
    backend.dispatch();

    let id = request_id(&server, &ServerRequest::List(Facility::Stored));
    let mut events: Vec<ServerEvent> = Facility::LISTED.into_iter().map(ServerEvent::ListEnd).collect();
    events.push(ServerEvent::RequestFailed {
        id,
        reason: "no such extension".into(),
    });
    server.push(events);
    backend.dispatch();
    assert_eq!(backend.connection().outstanding(), 0);
    assert_eq!(server.sent().last(), Some(&ServerRequest::GetServerInfo));

    server.push([ServerEvent::Server(ServerInfo::default())]);
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Ready);
}

#[test]
fn stored_controls_follow_relists() {
    trace();
    let server = FakeServer::default();
    let mut backend = ServerBackend::new(server.clone(), ServerOptions::default());
    backend.open().unwrap();
    let mut events = vec![
        ServerEvent::State(TransportState::Ready),
        ServerEvent::Stored(stored("app:Music", VOLUME_NORM)),
        ServerEvent::Stored(stored("app:Game", VOLUME_NORM)),
    ];
    events.extend(Facility::LISTED.into_iter().map(ServerEvent::ListEnd));
    events.push(ServerEvent::ListEnd(Facility::Stored));
    events.push(ServerEvent::Server(ServerInfo::default()));
    server.push(events);
    backend.dispatch();
    assert_eq!(backend.state(), BackendState::Ready);
    assert_eq!(stored_names(&backend), vec!["app:Game", "app:Music"]);
    let mut model_events = backend.subscribe();

    let changed = ServerEvent::Subscription {
        facility: Facility::Stored,
        event: SubscriptionEvent::Change,
        index: 0,
    };
    server.push([changed.clone()]);
    backend.dispatch();
    assert_eq!(server.sent().last(), Some(&ServerRequest::List(Facility::Stored)));

    server.push([
        ServerEvent::Stored(stored("app:Music", VOLUME_NORM / 2)),
        ServerEvent::ListEnd(Facility::Stored),
    ]);
    backend.dispatch();
    assert_eq!(stored_names(&backend), vec!["app:Music"]);
    let music = ControlRef::stored("app:Music");
    assert_eq!(backend.control(&music).unwrap().volume(), Some(VOLUME_NORM / 2));
    let seen = drain(&mut model_events);
    assert!(seen.contains(&MixerEvent::StoredControlRemoved("app:Game".into())));
    assert!(!seen.contains(&MixerEvent::StoredControlAdded("app:Music".into())));

    // A relist the server refuses keeps what is already known.
    server.push([changed]);
    backend.dispatch();
    let id = request_id(&server, &ServerRequest::List(Facility::Stored));
    server.push([
        ServerEvent::RequestFailed {
            id,
            reason: "busy".into(),
        },
        ServerEvent::ListEnd(Facility::Stored),
    ]);
    backend.dispatch();
    assert_eq!(stored_names(&backend), vec!["app:Music"]);

    backend.set_volume(&music, VOLUME_NORM).unwrap();
    assert_eq!(
        server.sent().last(),
        Some(&ServerRequest::WriteStored(stored("app:Music", VOLUME_NORM)))
    );
}

#[test]
fn unknown_default_is_fetched_by_name() {
    let server = FakeServer::default();
    let mut backend = connected(&server, &[sink(1, "a")]);
    server.push([ServerEvent::Server(ServerInfo {
        default_sink: Some("usb".into()),
        ..ServerInfo::default()
    })]);
    backend.dispatch();
    assert!(backend.default_output_stream().is_none());
    assert_eq!(backend.pending_default(Direction::Output), Some("usb"));
    assert_eq!(
        server.sent().last(),
        Some(&ServerRequest::GetByName {
            facility: Facility::Sink,
            name: "usb".into()
        })
    );

    server.push([ServerEvent::Sink(sink(2, "usb"))]);
    backend.dispatch();
    assert_eq!(backend.pending_default(Direction::Output), None);
    assert_eq!(backend.default_output_stream().unwrap().name(), "usb");
}

#[test]
fn fade_moves_back_channels() {
    let server = FakeServer::default();
    let mut quad = sink(1, "a");
    quad.positions = vec![FrontLeft, FrontRight, BackLeft, BackRight];
    quad.volumes = vec![VOLUME_NORM; 4];
    let mut backend = connected(&server, &[quad]);
    let target = ControlRef::stream("a", "a");

    backend.set_fade(&target, 0.5).unwrap();
    assert_eq!(
        server.sent().last(),
        Some(&ServerRequest::SetVolume {
            facility: Facility::Sink,
            index: 1,
            volumes: vec![VOLUME_NORM, VOLUME_NORM, VOLUME_NORM / 2, VOLUME_NORM / 2],
        })
    );
    assert!(backend.set_fade(&target, 1.5).is_err());
}

#[test]
fn balance_on_amplified_sink_keeps_volume() {
    let server = FakeServer::default();
    let mut loud = sink(1, "a");
    loud.volumes = vec![2 * VOLUME_NORM, 2 * VOLUME_NORM];
    let mut backend = connected(&server, &[loud]);
    let target = ControlRef::stream("a", "a");
    assert_eq!(backend.control(&target).unwrap().volume(), Some(2 * VOLUME_NORM));

    backend.set_balance(&target, -0.5).unwrap();
    assert_eq!(
        server.sent().last(),
        Some(&ServerRequest::SetVolume {
            facility: Facility::Sink,
            index: 1,
            volumes: vec![2 * VOLUME_NORM, VOLUME_NORM],
        })
    );
}

#[test]
fn reconnect_reuses_the_configured_target() {
    let server = FakeServer::default();
    let options = ServerOptions {
        application_name: "panel".into(),
        address: Some("unix:/run/pulse/native".into()),
        ..options(true)
    };
    let mut backend = ServerBackend::new(server.clone(), options);
    backend.open().unwrap();
    load(&server, &[sink(1, "a")], "a");
    backend.dispatch();
    server.push([ServerEvent::State(TransportState::Terminated)]);
    backend.dispatch();

    assert_eq!(server.connects(), 2);
    assert_eq!(
        server.target(),
        Some(ConnectTarget {
            application_name: "panel".into(),
            address: Some("unix:/run/pulse/native".into()),
        })
    );
}
