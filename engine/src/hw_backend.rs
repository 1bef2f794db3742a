use crate::backend::{Backend, BackendInfo, BackendKind, BackendState};
use crate::defaults::reselect_defaults;
use crate::error::{Error, Result};
use crate::hw::options::HwOptions;
use crate::hw::traits::{
    Element, ElementKey, ElementKind, HardwareUnit, MixerHardware, UnitInfo, VolumeElement,
};
use crate::hw_worker::{HotplugTimer, UnitWorker};
use crate::model::{
    Control, ControlFlags, ControlRef, ControlRole, Device, Direction, Model, Stream, Switch,
    SwitchKind, SwitchOption, SwitchRef,
};
use crate::volume::{DecibelScale, VolumeRange};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SwitchBinding {
    Enumerated { key: ElementKey },
    Toggle { key: ElementKey, direction: Direction },
}

#[derive(Debug)]
struct UnitEntry<U> {
    info: UnitInfo,
    unit: U,
    worker: Option<UnitWorker>,
    controls: HashMap<ControlRef, (ElementKey, Direction)>,
    switches: HashMap<SwitchRef, SwitchBinding>,
}

impl<U> UnitEntry<U> {
    fn owns_switch(&self, target: &SwitchRef) -> bool {
        self.switches.contains_key(target)
    }
}

pub fn stream_name(unit: &str, direction: Direction) -> String {
    match direction {
        Direction::Input => format!("{unit}-input"),
        _ => format!("{unit}-output"),
    }
}

pub fn control_role(name: &str, direction: Direction) -> ControlRole {
    let lower = name.to_ascii_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));
    if starts(&["master"]) {
        ControlRole::Master
    } else if starts(&["pcm", "wave"]) {
        ControlRole::Pcm
    } else if starts(&["speaker"]) {
        ControlRole::Speaker
    } else if starts(&["headphone"]) {
        ControlRole::Headphones
    } else if starts(&["mic", "internal mic", "front mic", "rear mic"]) || lower.contains(" mic") {
        ControlRole::Microphone
    } else if starts(&["capture", "adc"]) {
        ControlRole::Capture
    } else if starts(&["bass"]) {
        ControlRole::Bass
    } else if starts(&["treble"]) {
        ControlRole::Treble
    } else if starts(&["cd"]) {
        ControlRole::Cd
    } else if starts(&["video"]) {
        ControlRole::Video
    } else if starts(&["music", "synth", "midi"]) {
        ControlRole::Music
    } else if starts(&["lfe", "woofer"]) {
        ControlRole::Lfe
    } else if starts(&["center"]) {
        ControlRole::Center
    } else if starts(&["surround", "side", "rear"]) {
        ControlRole::Surround
    } else if starts(&["front", "line", "aux", "digital", "iec958", "phone"]) {
        ControlRole::Port
    } else if direction == Direction::Input {
        ControlRole::Capture
    } else {
        ControlRole::Unknown
    }
}

fn control_from_element(key: &ElementKey, direction: Direction, el: &VolumeElement) -> Control {
    let name = key.model_name();
    Control::new(name.clone(), name, control_role(&key.name, direction))
        .with_flags(ControlFlags {
            has_volume: true,
            can_set_volume: el.can_set_volume,
            has_mute: el.mute.is_some(),
            can_set_mute: el.mute.is_some(),
            volume_joined: el.volume_joined,
            switch_joined: el.switch_joined,
        })
        .with_range(VolumeRange::new(el.min, el.max))
        .with_decibel(el.decibel.and_then(|(lo, hi)| DecibelScale::hardware(lo, hi)))
        .with_channel_decibels(el.channel_decibels.clone())
        .with_mute(el.mute.unwrap_or(false))
        .with_channels(el.positions.clone(), el.volumes.clone())
}

fn switch_kind(name: &str) -> SwitchKind {
    let lower = name.to_ascii_lowercase();
    if lower.contains("source") || lower.contains("mux") || lower.contains("input") {
        SwitchKind::Port
    } else {
        SwitchKind::Generic
    }
}

/// Polling synchronizer over any [`MixerHardware`].
///
/// Each unit becomes a device with an input and an output shell stream.
/// One worker thread per unit waits for driver events; all reads and
/// model updates happen in [`Backend::dispatch`].
pub struct HwBackend<H: MixerHardware> {
    info: BackendInfo,
    hardware: H,
    options: HwOptions,
    model: Model,
    units: Vec<UnitEntry<H::Unit>>,
    waker: Arc<Notify>,
    timer: Option<HotplugTimer>,
    opened: bool,
}

impl<H: MixerHardware> HwBackend<H> {
    pub fn new(hardware: H, options: HwOptions) -> Self {
        let info = BackendInfo::new(hardware.name(), options.priority, BackendKind::Hardware);
        Self {
            info,
            hardware,
            options,
            model: Model::new(),
            units: vec![],
            waker: Arc::new(Notify::new()),
            timer: None,
            opened: false,
        }
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.info.id.clone()).collect()
    }

    fn unit_index(&self, id: &str) -> Option<usize> {
        self.units.iter().position(|u| u.info.id == id)
    }

    /// Opens a unit and mirrors it into the model. Nothing is added to the
    /// model unless the unit could be opened and read.
    fn add_unit(&mut self, info: UnitInfo) -> Result<()> {
        let mut unit = self
            .hardware
            .open(&info)
            .map_err(|e| Error::entity_load(&info.id, e))?;
        let waiter = unit.waiter().map_err(|e| Error::entity_load(&info.id, e))?;
        let elements = unit
            .elements()
            .map_err(|e| Error::entity_load(&info.id, e))?;

        let device = Device::new(info.id.clone(), info.label.clone()).with_icon(info.icon.clone());
        self.model.add_device(device)?;
        for direction in [Direction::Input, Direction::Output] {
            let label = match direction {
                Direction::Input => format!("{} Input", info.label),
                _ => format!("{} Output", info.label),
            };
            let stream = Stream::new(stream_name(&info.id, direction), label, direction)
                .with_device(Some(info.id.clone()));
            if let Err(e) = self.model.insert_stream(stream) {
                warn!("{} stream setup failed: {}", info.id, e);
            }
        }

        let id = info.id.clone();
        self.units.push(UnitEntry {
            info,
            unit,
            worker: None,
            controls: HashMap::new(),
            switches: HashMap::new(),
        });
        let idx = self.units.len() - 1;
        self.reconcile(idx, elements);

        match UnitWorker::spawn(&id, waiter, self.waker.clone()) {
            Ok(worker) => {
                self.units[idx].worker = Some(worker);
                info!("{} opened unit {}", self.info.name, id);
                Ok(())
            }
            Err(e) => {
                self.remove_unit(&id);
                Err(e)
            }
        }
    }

    /// Stops the worker and releases the handle, then removes the unit's
    /// entities from the model.
    fn remove_unit(&mut self, id: &str) {
        let Some(idx) = self.unit_index(id) else {
            return;
        };
        let UnitEntry {
            info,
            unit,
            worker,
            controls,
            switches,
        } = self.units.remove(idx);
        if let Some(worker) = &worker {
            worker.close();
        }
        drop(unit);
        if let Some(worker) = worker {
            worker.join();
        }

        for target in switches.keys() {
            self.model.remove_switch(target);
        }
        for target in controls.keys() {
            if let ControlRef::Stream { stream, control } = target {
                self.model.remove_control(stream, control);
            }
        }
        for direction in [Direction::Input, Direction::Output] {
            self.model.remove_stream(&stream_name(&info.id, direction));
        }
        self.model.remove_device(&info.id);
        info!("{} removed unit {}", self.info.name, info.id);
        reselect_defaults(&mut self.model);
    }

    fn reconcile(&mut self, idx: usize, elements: Vec<Element>) {
        let id = self.units[idx].info.id.clone();
        let mut seen_controls = HashSet::new();
        let mut seen_switches = HashSet::new();

        for element in elements {
            let Element {
                key,
                direction,
                kind,
            } = element;
            match kind {
                ElementKind::Volume(el) => {
                    let direction = match direction {
                        Direction::Input => Direction::Input,
                        _ => Direction::Output,
                    };
                    let stream = stream_name(&id, direction);
                    let target = ControlRef::stream(stream.clone(), key.model_name());
                    let control = control_from_element(&key, direction, &el);
                    let result = if self.model.control(&target).is_some() {
                        self.model
                            .update_control(&target, |c| c.assign(control))
                            .map(|_| ())
                    } else {
                        self.model.add_control(&stream, control)
                    };
                    match result {
                        Ok(()) => {
                            self.units[idx]
                                .controls
                                .insert(target.clone(), (key, direction));
                            seen_controls.insert(target);
                        }
                        Err(e) => warn!("{} control {} not synced: {}", id, key.name, e),
                    }
                }
                ElementKind::Switch { options, active } => {
                    let name = key.model_name();
                    let target = match direction {
                        Direction::Unknown => SwitchRef::device(id.clone(), name.clone()),
                        d => SwitchRef::stream(stream_name(&id, d), name.clone()),
                    };
                    let options: Vec<SwitchOption> = options
                        .iter()
                        .map(|o| SwitchOption::new(o.clone(), o.clone()))
                        .collect();
                    let active = active.and_then(|i| options.get(i)).map(|o| o.name().to_string());
                    let binding = SwitchBinding::Enumerated { key: key.clone() };
                    let switch = Switch::new(name.clone(), name, switch_kind(&key.name))
                        .with_options(options.clone());
                    self.sync_switch(idx, target, switch, options, active, binding, &mut seen_switches);
                }
                ElementKind::Toggle { on } => {
                    let name = key.model_name();
                    let stream = match direction {
                        Direction::Input => stream_name(&id, Direction::Input),
                        _ => stream_name(&id, Direction::Output),
                    };
                    let target = SwitchRef::stream(stream, name.clone());
                    let switch = Switch::toggle(name.clone(), name);
                    let options = switch.options().to_vec();
                    let active = Some(if on { "on" } else { "off" }.to_string());
                    let binding = SwitchBinding::Toggle {
                        key: key.clone(),
                        direction,
                    };
                    self.sync_switch(idx, target, switch, options, active, binding, &mut seen_switches);
                }
            }
        }

        let stale_controls: Vec<ControlRef> = self.units[idx]
            .controls
            .keys()
            .filter(|t| !seen_controls.contains(*t))
            .cloned()
            .collect();
        for target in stale_controls {
            self.units[idx].controls.remove(&target);
            if let ControlRef::Stream { stream, control } = &target {
                self.model.remove_control(stream, control);
            }
        }
        let stale_switches: Vec<SwitchRef> = self.units[idx]
            .switches
            .keys()
            .filter(|t| !seen_switches.contains(*t))
            .cloned()
            .collect();
        for target in stale_switches {
            self.units[idx].switches.remove(&target);
            self.model.remove_switch(&target);
        }

        for direction in [Direction::Input, Direction::Output] {
            let stream = stream_name(&id, direction);
            let default = self.model.stream_entry(&stream).and_then(|s| {
                s.controls()
                    .iter()
                    .find(|c| c.role() == ControlRole::Master)
                    .or_else(|| s.controls().first())
                    .map(|c| c.name().to_string())
            });
            if let Err(e) = self.model.set_stream_default_control(&stream, default) {
                debug!("{} default control of {} not set: {}", self.info.name, stream, e);
            }
        }
        reselect_defaults(&mut self.model);
    }

    #[allow(clippy::too_many_arguments)]
    fn sync_switch(
        &mut self,
        idx: usize,
        target: SwitchRef,
        switch: Switch,
        options: Vec<SwitchOption>,
        active: Option<String>,
        binding: SwitchBinding,
        seen: &mut HashSet<SwitchRef>,
    ) {
        let result = if self.model.switch(&target).is_some() {
            self.model
                .set_switch_options(&target, switch.label(), options)
                .and_then(|_| self.model.set_active_option(&target, active.as_deref()))
                .map(|_| ())
        } else {
            let switch = switch.with_active(active.as_deref());
            self.model.add_switch(target.clone(), switch)
        };
        match result {
            Ok(()) => {
                self.units[idx].switches.insert(target.clone(), binding);
                seen.insert(target);
            }
            Err(e) => warn!("switch {} not synced: {}", target.switch_name(), e),
        }
    }

    fn refresh_unit(&mut self, idx: usize) -> Result<()> {
        let entry = &mut self.units[idx];
        entry.unit.handle_events()?;
        let elements = entry.unit.elements()?;
        self.reconcile(idx, elements);
        Ok(())
    }

    fn handle_unit_error(&mut self, idx: usize, e: Error) {
        let id = self.units[idx].info.id.clone();
        if e.is_closed() {
            warn!("{} handle for {} became invalid", self.info.name, id);
            self.remove_unit(&id);
        } else {
            error!("{} failed to read {}: {}", self.info.name, id, e);
        }
    }

    fn rescan(&mut self) -> usize {
        let found = match self.hardware.enumerate() {
            Ok(found) => found,
            Err(e) => {
                warn!("{} hot-plug rescan failed: {}", self.info.name, e);
                return 0;
            }
        };
        let mut changes = 0;
        let gone: Vec<String> = self
            .units
            .iter()
            .filter(|u| !found.iter().any(|f| f.id == u.info.id))
            .map(|u| u.info.id.clone())
            .collect();
        for id in gone {
            self.remove_unit(&id);
            changes += 1;
        }
        for info in found {
            if self.unit_index(&info.id).is_some() {
                continue;
            }
            let id = info.id.clone();
            match self.add_unit(info) {
                Ok(()) => changes += 1,
                Err(e) => warn!("{} skipping unit {}: {}", self.info.name, id, e),
            }
        }
        if changes > 0 {
            debug!("{} rescan applied {} changes", self.info.name, changes);
        }
        changes
    }

    fn owner_of_control(&self, target: &ControlRef) -> Result<(usize, ElementKey, Direction)> {
        self.units
            .iter()
            .enumerate()
            .find_map(|(idx, u)| {
                u.controls
                    .get(target)
                    .map(|(key, direction)| (idx, key.clone(), *direction))
            })
            .ok_or_else(|| Error::NotFound(format!("control {target:?}")))
    }

    fn after_write(&mut self, idx: usize, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                if let Err(e) = self.refresh_unit(idx) {
                    self.handle_unit_error(idx, e);
                }
                Ok(())
            }
            Err(e) => {
                if e.is_closed() {
                    self.handle_unit_error(idx, e.clone());
                }
                Err(e)
            }
        }
    }
}

impl<H: MixerHardware> Backend for HwBackend<H> {
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
        self.model.set_state(BackendState::Connecting);
        let found = match self.hardware.enumerate() {
            Ok(found) => found,
            Err(e) => {
                error!("{} enumeration failed: {}", self.info.name, e);
                self.model.set_state(BackendState::Failed);
                return Err(e);
            }
        };
        for info in found {
            let id = info.id.clone();
            if let Err(e) = self.add_unit(info) {
                warn!("{} skipping unit {}: {}", self.info.name, id, e);
            }
        }
        if let Some(interval) = self.options.hotplug_interval {
            match HotplugTimer::spawn(interval, self.waker.clone()) {
                Ok(timer) => self.timer = Some(timer),
                Err(e) => warn!("{} hot-plug detection disabled: {}", self.info.name, e),
            }
        }
        self.opened = true;
        self.model.set_state(BackendState::Ready);
        Ok(BackendState::Ready)
    }

    fn close(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        for id in self.unit_ids() {
            self.remove_unit(&id);
        }
        self.model.clear();
        self.opened = false;
        self.model.set_state(BackendState::Idle);
    }

    fn dispatch(&mut self) -> usize {
        let mut handled = 0;

        let failed: Vec<String> = self
            .units
            .iter()
            .filter(|u| u.worker.as_ref().is_some_and(|w| w.failure().is_some()))
            .map(|u| u.info.id.clone())
            .collect();
        for id in failed {
            warn!("{} unit {} went away", self.info.name, id);
            self.remove_unit(&id);
            handled += 1;
        }

        let mut idx = 0;
        while idx < self.units.len() {
            let pending = self.units[idx].worker.as_ref().and_then(|w| w.pending());
            let Some(seq) = pending else {
                idx += 1;
                continue;
            };
            handled += 1;
            let id = self.units[idx].info.id.clone();
            let result = self.refresh_unit(idx);
            if let Some(worker) = &self.units[idx].worker {
                worker.acknowledge(seq);
            }
            if let Err(e) = result {
                self.handle_unit_error(idx, e);
            }
            if self.unit_index(&id).is_some() {
                idx += 1;
            }
        }

        if self.timer.as_ref().is_some_and(|t| t.take_due()) {
            handled += self.rescan().max(1);
        }
        handled
    }

    fn waker(&self) -> Arc<Notify> {
        self.waker.clone()
    }

    fn set_decibel(&mut self, target: &ControlRef, decibel: f64) -> Result<()> {
        let (idx, key, direction) = self.owner_of_control(target)?;
        let exact = if decibel.is_finite() && self.control(target)?.has_decibel() {
            self.units[idx].unit.decibel_to_volume(&key, direction, decibel)?
        } else {
            None
        };
        let control = self.control(target)?;
        let volumes = match exact {
            Some(volume) => control.plan_volume(volume)?,
            None => control.plan_decibel(decibel)?,
        };
        self.write_volumes(target, volumes)
    }

    fn write_volumes(&mut self, target: &ControlRef, volumes: Vec<u32>) -> Result<()> {
        let (idx, key, direction) = self.owner_of_control(target)?;
        let result = self.units[idx].unit.write_volume(&key, direction, &volumes);
        self.after_write(idx, result)
    }

    fn write_mute(&mut self, target: &ControlRef, mute: bool) -> Result<()> {
        let (idx, key, direction) = self.owner_of_control(target)?;
        let result = self.units[idx].unit.write_mute(&key, direction, mute);
        self.after_write(idx, result)
    }

    fn write_active_option(&mut self, target: &SwitchRef, option: &str) -> Result<()> {
        let idx = self
            .units
            .iter()
            .position(|u| u.owns_switch(target))
            .ok_or_else(|| Error::NotFound(format!("switch {target:?}")))?;
        let binding = self.units[idx].switches.get(target).cloned();
        let result = match binding {
            Some(SwitchBinding::Enumerated { key }) => {
                let position = self
                    .model
                    .switch(target)
                    .and_then(|s| s.options().iter().position(|o| o.name() == option))
                    .ok_or_else(|| Error::NotFound(format!("option {option}")))?;
                self.units[idx].unit.write_switch(&key, position)
            }
            Some(SwitchBinding::Toggle { key, direction }) => {
                self.units[idx]
                    .unit
                    .write_toggle(&key, direction, option == "on")
            }
            None => return Err(Error::NotFound(format!("switch {target:?}"))),
        };
        self.after_write(idx, result)
    }
}

impl<H: MixerHardware> Drop for HwBackend<H> {
    fn drop(&mut self) {
        if self.opened {
            self.close();
        }
    }
}
