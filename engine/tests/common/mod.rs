#![allow(dead_code)]

use maolan_mixer_engine::backend::Backend;
use maolan_mixer_engine::channel::ChannelPosition;
use maolan_mixer_engine::error::{Error, Result};
use maolan_mixer_engine::hw::traits::{
    Element, ElementKey, ElementKind, EventWaiter, HardwareUnit, MixerHardware, UnitInfo,
    VolumeElement,
};
use maolan_mixer_engine::message::MixerEvent;
use maolan_mixer_engine::model::Direction;
use maolan_mixer_engine::server::protocol::{
    ConnectTarget, EventSink, RequestId, ServerConnection, ServerEvent, ServerRequest,
};
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub enum Signal {
    Event,
    Gone,
}

#[derive(Default)]
pub struct UnitState {
    pub label: String,
    pub plugged: bool,
    pub open: bool,
    pub elements: Vec<Element>,
    pub woken: usize,
    pub reads: usize,
    /// Driver-side decibels per volume step, with the top step at 0 dB.
    pub db_step: Option<f64>,
    signals: Weak<Sender<Signal>>,
}

/// Shared view of the fake sound cards, driven by the test thread.
#[derive(Clone, Default)]
pub struct Rig(Arc<Mutex<BTreeMap<String, UnitState>>>);

impl Rig {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, UnitState>> {
        self.0.lock().unwrap()
    }

    fn with<T>(&self, id: &str, f: impl FnOnce(&mut UnitState) -> T) -> T {
        let mut units = self.lock();
        f(units.get_mut(id).unwrap())
    }

    pub fn plug(&self, id: &str, label: &str, elements: Vec<Element>) {
        self.lock().insert(
            id.to_string(),
            UnitState {
                label: label.to_string(),
                plugged: true,
                elements,
                ..Default::default()
            },
        );
    }

    pub fn unplug(&self, id: &str) {
        self.with(id, |u| u.plugged = false);
    }

    pub fn set_elements(&self, id: &str, elements: Vec<Element>) {
        self.with(id, |u| u.elements = elements);
    }

    pub fn elements(&self, id: &str) -> Vec<Element> {
        self.with(id, |u| u.elements.clone())
    }

    /// Raises one driver event on an open unit.
    pub fn fire(&self, id: &str) {
        self.signal(id, Signal::Event);
    }

    /// Makes the unit's waiter report that the handle became invalid.
    pub fn vanish(&self, id: &str) {
        self.signal(id, Signal::Gone);
    }

    fn signal(&self, id: &str, signal: Signal) {
        let sender = self.with(id, |u| u.signals.upgrade());
        if let Some(sender) = sender {
            let _ = sender.send(signal);
        }
    }

    pub fn exact_decibels(&self, id: &str, step: f64) {
        self.with(id, |u| u.db_step = Some(step));
    }

    pub fn woken(&self, id: &str) -> usize {
        self.with(id, |u| u.woken)
    }

    pub fn reads(&self, id: &str) -> usize {
        self.with(id, |u| u.reads)
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.with(id, |u| u.open)
    }
}

pub struct FakeHardware {
    rig: Rig,
}

impl FakeHardware {
    pub fn new(rig: Rig) -> Self {
        Self { rig }
    }
}

impl MixerHardware for FakeHardware {
    type Unit = FakeUnit;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn enumerate(&mut self) -> Result<Vec<UnitInfo>> {
        Ok(self
            .rig
            .lock()
            .iter()
            .filter(|(_, u)| u.plugged)
            .map(|(id, u)| UnitInfo {
                id: id.clone(),
                address: format!("fake:{id}"),
                label: u.label.clone(),
                icon: None,
            })
            .collect())
    }

    fn open(&mut self, unit: &UnitInfo) -> Result<FakeUnit> {
        let (tx, rx) = channel();
        let alive = Arc::new(tx);
        let mut units = self.rig.lock();
        let state = units
            .get_mut(&unit.id)
            .filter(|u| u.plugged)
            .ok_or_else(|| Error::NotFound(unit.id.clone()))?;
        state.open = true;
        state.signals = Arc::downgrade(&alive);
        Ok(FakeUnit {
            id: unit.id.clone(),
            rig: self.rig.clone(),
            _alive: alive,
            events: Some(rx),
        })
    }
}

pub struct FakeUnit {
    id: String,
    rig: Rig,
    _alive: Arc<Sender<Signal>>,
    events: Option<Receiver<Signal>>,
}

impl Drop for FakeUnit {
    fn drop(&mut self) {
        self.rig.with(&self.id, |u| u.open = false);
    }
}

struct FakeWaiter {
    id: String,
    rig: Rig,
    events: Receiver<Signal>,
}

impl EventWaiter for FakeWaiter {
    fn wait(&mut self) -> Result<()> {
        match self.events.recv() {
            Ok(Signal::Event) => {
                self.rig.with(&self.id, |u| u.woken += 1);
                Ok(())
            }
            Ok(Signal::Gone) | Err(_) => Err(Error::Closed(self.id.clone())),
        }
    }
}

impl FakeUnit {
    fn element_mut<'a>(
        elements: &'a mut [Element],
        key: &ElementKey,
        direction: Direction,
    ) -> Result<&'a mut Element> {
        elements
            .iter_mut()
            .find(|e| e.key == *key && e.direction == direction)
            .ok_or_else(|| Error::NotFound(key.model_name()))
    }
}

impl HardwareUnit for FakeUnit {
    fn waiter(&mut self) -> Result<Box<dyn EventWaiter>> {
        let events = self
            .events
            .take()
            .ok_or_else(|| Error::InvalidState(format!("{} waiter taken", self.id)))?;
        Ok(Box::new(FakeWaiter {
            id: self.id.clone(),
            rig: self.rig.clone(),
            events,
        }))
    }

    fn handle_events(&mut self) -> Result<()> {
        Ok(())
    }

    fn elements(&mut self) -> Result<Vec<Element>> {
        self.rig.with(&self.id, |u| {
            u.reads += 1;
            let mut elements = u.elements.clone();
            if let Some(step) = u.db_step {
                for element in &mut elements {
                    if let ElementKind::Volume(el) = &mut element.kind {
                        let max = el.max;
                        el.channel_decibels = Some(
                            el.volumes
                                .iter()
                                .map(|&v| (f64::from(v) - f64::from(max)) * step)
                                .collect(),
                        );
                    }
                }
            }
            Ok(elements)
        })
    }

    fn write_volume(&mut self, key: &ElementKey, direction: Direction, volumes: &[u32]) -> Result<()> {
        self.rig.with(&self.id, |u| {
            match &mut Self::element_mut(&mut u.elements, key, direction)?.kind {
                ElementKind::Volume(el) => el.volumes = volumes.to_vec(),
                _ => return Err(Error::Unsupported(key.model_name())),
            }
            Ok(())
        })
    }

    fn decibel_to_volume(
        &mut self,
        key: &ElementKey,
        direction: Direction,
        decibel: f64,
    ) -> Result<Option<u32>> {
        self.rig.with(&self.id, |u| {
            let Some(step) = u.db_step else {
                return Ok(None);
            };
            match &Self::element_mut(&mut u.elements, key, direction)?.kind {
                ElementKind::Volume(el) => {
                    let steps = (decibel / step).floor();
                    Ok(Some((f64::from(el.max) + steps).max(f64::from(el.min)) as u32))
                }
                _ => Err(Error::Unsupported(key.model_name())),
            }
        })
    }

    fn write_mute(&mut self, key: &ElementKey, direction: Direction, mute: bool) -> Result<()> {
        self.rig.with(&self.id, |u| {
            match &mut Self::element_mut(&mut u.elements, key, direction)?.kind {
                ElementKind::Volume(el) if el.mute.is_some() => el.mute = Some(mute),
                _ => return Err(Error::Unsupported(key.model_name())),
            }
            Ok(())
        })
    }

    fn write_switch(&mut self, key: &ElementKey, option: usize) -> Result<()> {
        self.rig.with(&self.id, |u| {
            let element = u
                .elements
                .iter_mut()
                .find(|e| e.key == *key)
                .ok_or_else(|| Error::NotFound(key.model_name()))?;
            match &mut element.kind {
                ElementKind::Switch { active, .. } => *active = Some(option),
                _ => return Err(Error::Unsupported(key.model_name())),
            }
            Ok(())
        })
    }

    fn write_toggle(&mut self, key: &ElementKey, direction: Direction, on: bool) -> Result<()> {
        self.rig.with(&self.id, |u| {
            match &mut Self::element_mut(&mut u.elements, key, direction)?.kind {
                ElementKind::Toggle { on: current } => *current = on,
                _ => return Err(Error::Unsupported(key.model_name())),
            }
            Ok(())
        })
    }
}

pub fn stereo(name: &str, direction: Direction, volume: u32) -> Element {
    Element {
        key: ElementKey::new(name, 0),
        direction,
        kind: ElementKind::Volume(VolumeElement {
            positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
            volumes: vec![volume, volume],
            min: 0,
            max: 100,
            decibel: Some((-50.0, 0.0)),
            channel_decibels: None,
            mute: Some(false),
            can_set_volume: true,
            volume_joined: false,
            switch_joined: false,
        }),
    }
}

pub fn master(volume: u32) -> Element {
    stereo("Master", Direction::Output, volume)
}

/// Test-side handle of a fake sound server transport.
#[derive(Clone, Default)]
pub struct FakeServer {
    sink: Arc<Mutex<Option<EventSink>>>,
    sent: Arc<Mutex<Vec<ServerRequest>>>,
    connects: Arc<Mutex<usize>>,
    target: Arc<Mutex<Option<ConnectTarget>>>,
}

impl FakeServer {
    pub fn push(&self, events: impl IntoIterator<Item = ServerEvent>) {
        let sink = self.sink.lock().unwrap().clone().unwrap();
        for event in events {
            assert!(sink.push(event));
        }
    }

    pub fn sent(&self) -> Vec<ServerRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }

    /// Target of the latest connect.
    pub fn target(&self) -> Option<ConnectTarget> {
        self.target.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

impl ServerConnection for FakeServer {
    fn connect(&mut self, sink: EventSink, target: &ConnectTarget) -> Result<()> {
        *self.connects.lock().unwrap() += 1;
        *self.target.lock().unwrap() = Some(target.clone());
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn disconnect(&mut self) {
        *self.sink.lock().unwrap() = None;
    }

    fn send(&mut self, request: ServerRequest) -> Result<RequestId> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(request);
        Ok(sent.len() as RequestId)
    }
}

/// Routes engine logs to the test harness output.
pub fn trace() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Dispatches until `done` holds, giving worker threads time to catch up.
pub fn dispatch_until<B: Backend>(backend: &mut B, mut done: impl FnMut(&B) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        backend.dispatch();
        if done(backend) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

pub fn drain(events: &mut broadcast::Receiver<MixerEvent>) -> Vec<MixerEvent> {
    let mut out = vec![];
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
