use crate::channel::ChannelPosition;
use crate::error::Result;
use crate::model::Direction;

/// A hardware unit as seen during enumeration, before it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    /// Stable model name, e.g. `card0`.
    pub id: String,
    /// Address passed to the driver when opening the unit, e.g. `hw:0`.
    pub address: String,
    pub label: String,
    pub icon: Option<String>,
}

/// Identity of a mixer element inside one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementKey {
    pub name: String,
    pub index: u32,
}

impl ElementKey {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Model-facing name; only secondary instances carry their index.
    pub fn model_name(&self) -> String {
        if self.index == 0 {
            self.name.clone()
        } else {
            format!("{},{}", self.name, self.index)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeElement {
    pub positions: Vec<ChannelPosition>,
    pub volumes: Vec<u32>,
    pub min: u32,
    pub max: u32,
    /// Decibel bounds matching `min` and `max`.
    pub decibel: Option<(f64, f64)>,
    /// Per-channel decibels when the driver converts them itself.
    pub channel_decibels: Option<Vec<f64>>,
    pub mute: Option<bool>,
    pub can_set_volume: bool,
    pub volume_joined: bool,
    pub switch_joined: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Volume(VolumeElement),
    Switch {
        options: Vec<String>,
        active: Option<usize>,
    },
    Toggle {
        on: bool,
    },
}

/// Snapshot of one element for one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub key: ElementKey,
    pub direction: Direction,
    pub kind: ElementKind,
}

/// Blocks on the worker thread until the unit reports an event.
///
/// Returning an error ends the worker; the unit is then treated as gone
/// unless the backend already closed it.
pub trait EventWaiter: Send {
    fn wait(&mut self) -> Result<()>;
}

pub trait HardwareUnit: Send {
    fn waiter(&mut self) -> Result<Box<dyn EventWaiter>>;

    /// Drains pending driver events so element reads see fresh values.
    fn handle_events(&mut self) -> Result<()>;

    fn elements(&mut self) -> Result<Vec<Element>>;

    fn write_volume(&mut self, key: &ElementKey, direction: Direction, volumes: &[u32]) -> Result<()>;

    /// Volume the driver maps `decibel` to, rounded down.
    ///
    /// `None` leaves the conversion to the element's linear decibel bounds.
    fn decibel_to_volume(
        &mut self,
        _key: &ElementKey,
        _direction: Direction,
        _decibel: f64,
    ) -> Result<Option<u32>> {
        Ok(None)
    }

    fn write_mute(&mut self, key: &ElementKey, direction: Direction, mute: bool) -> Result<()>;

    fn write_switch(&mut self, key: &ElementKey, option: usize) -> Result<()>;

    fn write_toggle(&mut self, key: &ElementKey, direction: Direction, on: bool) -> Result<()>;
}

pub trait MixerHardware: Send {
    type Unit: HardwareUnit + 'static;

    fn name(&self) -> &'static str;

    fn enumerate(&mut self) -> Result<Vec<UnitInfo>>;

    fn open(&mut self, unit: &UnitInfo) -> Result<Self::Unit>;
}
