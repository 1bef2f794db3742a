use crate::channel::{self, ChannelPosition, PositionMask};
use crate::error::{Error, Result};
use crate::volume::{self, DecibelScale, VolumeRange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlRole {
    #[default]
    Unknown,
    Master,
    Application,
    Pcm,
    Speaker,
    Headphones,
    Microphone,
    Capture,
    Port,
    Bass,
    Treble,
    Cd,
    Video,
    Music,
    Lfe,
    Center,
    Surround,
}

/// Capabilities of a control as reported by its backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub has_volume: bool,
    pub can_set_volume: bool,
    pub has_mute: bool,
    pub can_set_mute: bool,
    pub volume_joined: bool,
    pub switch_joined: bool,
}

impl ControlFlags {
    pub fn full() -> Self {
        Self {
            has_volume: true,
            can_set_volume: true,
            has_mute: true,
            can_set_mute: true,
            volume_joined: false,
            switch_joined: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: Option<String>,
    pub id: Option<String>,
    pub version: Option<String>,
    pub icon: Option<String>,
}

/// Which observable properties of a control changed in one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChanges {
    pub volume: bool,
    pub mute: bool,
    pub balance: bool,
    pub fade: bool,
    pub channels: bool,
    pub flags: bool,
    pub label: bool,
}

impl ControlChanges {
    pub fn any(&self) -> bool {
        self.volume
            || self.mute
            || self.balance
            || self.fade
            || self.channels
            || self.flags
            || self.label
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    name: String,
    label: String,
    role: ControlRole,
    app_info: Option<AppInfo>,
    flags: ControlFlags,
    positions: Vec<ChannelPosition>,
    volumes: Vec<u32>,
    mask: PositionMask,
    mute: bool,
    range: VolumeRange,
    decibel: Option<DecibelScale>,
    /// Per-channel decibels reported by the driver; preferred over the scale.
    channel_decibels: Option<Vec<f64>>,
    stream: Option<String>,
    target_device: Option<String>,
}

impl Control {
    pub fn new(name: impl Into<String>, label: impl Into<String>, role: ControlRole) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            role,
            app_info: None,
            flags: ControlFlags::default(),
            positions: vec![],
            volumes: vec![],
            mask: PositionMask::default(),
            mute: false,
            range: VolumeRange::default(),
            decibel: None,
            channel_decibels: None,
            stream: None,
            target_device: None,
        }
    }

    pub fn with_channels(mut self, positions: Vec<ChannelPosition>, volumes: Vec<u32>) -> Self {
        self.set_channels(positions, volumes);
        self
    }

    pub fn with_range(mut self, range: VolumeRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    pub fn with_decibel(mut self, scale: Option<DecibelScale>) -> Self {
        self.decibel = scale;
        self
    }

    pub fn with_channel_decibels(mut self, decibels: Option<Vec<f64>>) -> Self {
        self.channel_decibels = decibels;
        self
    }

    pub fn with_app_info(mut self, info: AppInfo) -> Self {
        self.app_info = Some(info);
        self
    }

    pub fn with_target_device(mut self, device: Option<String>) -> Self {
        self.target_device = device;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> ControlRole {
        self.role
    }

    pub fn app_info(&self) -> Option<&AppInfo> {
        self.app_info.as_ref()
    }

    pub fn flags(&self) -> ControlFlags {
        self.flags
    }

    /// Name of the owning stream, resolved through the model.
    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    /// Device a stored control is routed to, if any.
    pub fn target_device(&self) -> Option<&str> {
        self.target_device.as_deref()
    }

    pub fn range(&self) -> VolumeRange {
        self.range
    }

    pub fn min_volume(&self) -> u32 {
        self.range.min
    }

    pub fn max_volume(&self) -> u32 {
        self.range.max
    }

    pub fn normal_volume(&self) -> u32 {
        self.range.normal
    }

    pub fn base_volume(&self) -> u32 {
        self.range.base
    }

    pub fn channel_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    pub fn volumes(&self) -> &[u32] {
        &self.volumes
    }

    pub fn channel_position(&self, channel: usize) -> Option<ChannelPosition> {
        self.positions.get(channel).copied()
    }

    pub fn channel_volume(&self, channel: usize) -> Option<u32> {
        self.volumes.get(channel).copied()
    }

    pub fn has_position(&self, position: ChannelPosition) -> bool {
        self.mask.has(position)
    }

    /// Overall volume, the loudest channel. `None` while the control has no channels.
    pub fn volume(&self) -> Option<u32> {
        if !self.flags.has_volume {
            return None;
        }
        channel::max_volume(&self.volumes)
    }

    pub fn mute(&self) -> Option<bool> {
        if !self.flags.has_mute || self.volumes.is_empty() {
            return None;
        }
        Some(self.mute)
    }

    pub fn balance(&self) -> f32 {
        channel::balance(&self.volumes, &self.positions)
    }

    pub fn fade(&self) -> f32 {
        channel::fade(&self.volumes, &self.positions)
    }

    pub fn can_balance(&self) -> bool {
        self.mask.has_left_right()
    }

    pub fn can_fade(&self) -> bool {
        self.mask.has_front_back()
    }

    pub fn has_decibel(&self) -> bool {
        self.decibel.is_some()
    }

    pub fn decibel_scale(&self) -> Option<DecibelScale> {
        self.decibel
    }

    fn reported_decibels(&self) -> Option<&[f64]> {
        self.channel_decibels
            .as_deref()
            .filter(|d| self.decibel.is_some() && d.len() == self.volumes.len())
    }

    pub fn decibel(&self) -> f64 {
        if let Some(decibels) = self.reported_decibels() {
            return decibels.iter().copied().fold(volume::DECIBEL_SILENCE, f64::max);
        }
        match (self.volume(), self.decibel) {
            (Some(v), Some(scale)) => volume::linear_to_decibel(v, &self.range, &scale),
            _ => volume::DECIBEL_SILENCE,
        }
    }

    pub fn channel_decibel(&self, channel: usize) -> f64 {
        if let Some(decibels) = self.reported_decibels() {
            return decibels.get(channel).copied().unwrap_or(volume::DECIBEL_SILENCE);
        }
        match (self.channel_volume(channel), self.decibel) {
            (Some(v), Some(scale)) => volume::linear_to_decibel(v, &self.range, &scale),
            _ => volume::DECIBEL_SILENCE,
        }
    }

    fn check_volume_writable(&self) -> Result<()> {
        if !self.flags.has_volume || !self.flags.can_set_volume {
            return Err(Error::Unsupported(format!("volume of {}", self.name)));
        }
        if self.volumes.is_empty() {
            return Err(Error::NoChannels(self.name.clone()));
        }
        Ok(())
    }

    pub fn check_mute_writable(&self) -> Result<()> {
        if !self.flags.has_mute || !self.flags.can_set_mute {
            return Err(Error::Unsupported(format!("mute of {}", self.name)));
        }
        Ok(())
    }

    pub fn plan_volume(&self, volume: u32) -> Result<Vec<u32>> {
        self.check_volume_writable()?;
        let volume = self.range.clamp(volume);
        Ok(channel::scale_all(&self.volumes, volume))
    }

    pub fn plan_decibel(&self, decibel: f64) -> Result<Vec<u32>> {
        let scale = self
            .decibel
            .ok_or_else(|| Error::Unsupported(format!("decibel volume of {}", self.name)))?;
        self.plan_volume(volume::decibel_to_linear(decibel, &self.range, &scale))
    }

    /// Joined controls reject per-channel writes; callers must use the all-channels setter.
    pub fn plan_channel_volume(&self, channel: usize, volume: u32) -> Result<Vec<u32>> {
        self.check_volume_writable()?;
        if self.flags.volume_joined {
            return Err(Error::JoinedChannels(self.name.clone()));
        }
        if channel >= self.volumes.len() {
            return Err(Error::OutOfRange {
                what: "channel",
                value: channel.to_string(),
            });
        }
        let mut volumes = self.volumes.clone();
        volumes[channel] = self.range.clamp(volume);
        Ok(volumes)
    }

    pub fn plan_balance(&self, balance: f32) -> Result<Vec<u32>> {
        self.check_volume_writable()?;
        check_unit("balance", balance)?;
        if !self.can_balance() {
            return Err(Error::Unsupported(format!("balance of {}", self.name)));
        }
        let volumes = channel::apply_balance(&self.volumes, &self.positions, balance);
        Ok(self.clamp_reshaped(volumes))
    }

    pub fn plan_fade(&self, fade: f32) -> Result<Vec<u32>> {
        self.check_volume_writable()?;
        check_unit("fade", fade)?;
        if !self.can_fade() {
            return Err(Error::Unsupported(format!("fade of {}", self.name)));
        }
        let volumes = channel::apply_fade(&self.volumes, &self.positions, fade);
        Ok(self.clamp_reshaped(volumes))
    }

    /// Balance and fade keep the loudest channel, even above the nominal range.
    fn clamp_reshaped(&self, volumes: Vec<u32>) -> Vec<u32> {
        let ceiling = channel::max_volume(&self.volumes)
            .unwrap_or(self.range.max)
            .max(self.range.max);
        volumes
            .into_iter()
            .map(|v| channel::clamp_volume(v, self.range.min, ceiling))
            .collect()
    }

    pub(crate) fn set_stream(&mut self, stream: Option<String>) {
        self.stream = stream;
    }

    pub(crate) fn set_channels(&mut self, positions: Vec<ChannelPosition>, volumes: Vec<u32>) {
        let mut positions = positions;
        positions.resize(volumes.len(), ChannelPosition::Unknown);
        self.mask = PositionMask::from_positions(&positions);
        self.positions = positions;
        self.volumes = volumes;
    }

    pub(crate) fn set_volumes(&mut self, volumes: Vec<u32>) {
        self.channel_decibels = None;
        if volumes.len() == self.positions.len() {
            self.volumes = volumes;
        } else {
            let positions = self.positions.clone();
            self.set_channels(positions, volumes);
        }
    }

    pub(crate) fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    pub(crate) fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub(crate) fn set_flags(&mut self, flags: ControlFlags) {
        self.flags = flags;
    }

    pub(crate) fn set_range(&mut self, range: VolumeRange) {
        self.range = range;
    }

    pub(crate) fn set_decibel(&mut self, scale: Option<DecibelScale>) {
        self.decibel = scale;
    }

    pub(crate) fn set_app_info(&mut self, info: Option<AppInfo>) {
        self.app_info = info;
    }

    pub(crate) fn set_target_device(&mut self, device: Option<String>) {
        self.target_device = device;
    }

    /// Copies every backend-reported property from `other`, keeping identity.
    pub(crate) fn assign(&mut self, other: Control) {
        let stream = self.stream.take();
        *self = Control {
            name: std::mem::take(&mut self.name),
            stream,
            ..other
        };
    }

    pub(crate) fn changes_since(&self, before: &Control) -> ControlChanges {
        ControlChanges {
            volume: self.volumes != before.volumes || self.range != before.range,
            mute: self.mute != before.mute,
            balance: self.balance() != before.balance(),
            fade: self.fade() != before.fade(),
            channels: self.positions != before.positions,
            flags: self.flags != before.flags || self.decibel != before.decibel,
            label: self.label != before.label || self.app_info != before.app_info,
        }
    }
}

fn check_unit(what: &'static str, value: f32) -> Result<()> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(Error::OutOfRange {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}
