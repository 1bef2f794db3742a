use super::protocol::{
    CardInfo, ClientStreamInfo, DeviceStreamInfo, Facility, Index, ServerRequest, StoredInfo,
    VOLUME_NORM, VOLUME_UI_MAX,
};
use crate::error::{Error, Result};
use crate::model::{Control, ControlFlags, ControlRole, Switch, SwitchKind, SwitchOption};
use crate::volume::{DecibelScale, VolumeRange};

pub const PORT_SWITCH: &str = "port";
pub const PROFILE_SWITCH: &str = "profile";

/// What a model control is backed by on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerControl {
    /// A source, or a source output recording from one.
    Input { facility: Facility, index: Index },
    /// A sink, or a sink input playing to one.
    Output { facility: Facility, index: Index },
    Stored { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSwitch {
    Port { facility: Facility, index: Index },
    Profile { card: Index },
}

pub trait ControlOps {
    fn volume_request(&self, control: &Control, volumes: Vec<u32>) -> Result<ServerRequest>;

    fn mute_request(&self, control: &Control, mute: bool) -> Result<ServerRequest>;
}

pub trait SwitchOps {
    fn select_request(&self, option: &str) -> ServerRequest;
}

impl ControlOps for ServerControl {
    fn volume_request(&self, control: &Control, volumes: Vec<u32>) -> Result<ServerRequest> {
        match self {
            Self::Input { facility, index } | Self::Output { facility, index } => {
                Ok(ServerRequest::SetVolume {
                    facility: *facility,
                    index: *index,
                    volumes,
                })
            }
            Self::Stored { name } => Ok(ServerRequest::WriteStored(StoredInfo {
                name: name.clone(),
                device: control.target_device().map(str::to_string),
                positions: control.positions().to_vec(),
                volumes,
                mute: control.mute().unwrap_or(false),
            })),
        }
    }

    fn mute_request(&self, control: &Control, mute: bool) -> Result<ServerRequest> {
        match self {
            Self::Input { facility, index } | Self::Output { facility, index } => {
                Ok(ServerRequest::SetMute {
                    facility: *facility,
                    index: *index,
                    mute,
                })
            }
            Self::Stored { name } => {
                if control.channel_count() == 0 {
                    return Err(Error::NoChannels(name.clone()));
                }
                Ok(ServerRequest::WriteStored(StoredInfo {
                    name: name.clone(),
                    device: control.target_device().map(str::to_string),
                    positions: control.positions().to_vec(),
                    volumes: control.volumes().to_vec(),
                    mute,
                }))
            }
        }
    }
}

impl SwitchOps for ServerSwitch {
    fn select_request(&self, option: &str) -> ServerRequest {
        match self {
            Self::Port { facility, index } => ServerRequest::SetPort {
                facility: *facility,
                index: *index,
                port: option.to_string(),
            },
            Self::Profile { card } => ServerRequest::SetProfile {
                card: *card,
                profile: option.to_string(),
            },
        }
    }
}

/// Servers may report amplified volumes above the UI maximum; the range grows to hold them.
fn software_range(base: u32, volumes: &[u32]) -> VolumeRange {
    let max = volumes.iter().copied().fold(VOLUME_UI_MAX, u32::max);
    VolumeRange::new(0, max)
        .with_normal(VOLUME_NORM)
        .with_base(if base == 0 { VOLUME_NORM } else { base })
}

pub fn stream_control(info: &DeviceStreamInfo, role: ControlRole) -> Control {
    Control::new(info.name.clone(), info.description.clone(), role)
        .with_flags(ControlFlags::full())
        .with_range(software_range(info.base_volume, &info.volumes))
        .with_decibel(DecibelScale::software(VOLUME_NORM))
        .with_mute(info.mute)
        .with_channels(info.positions.clone(), info.volumes.clone())
}

pub fn client_control_name(facility: Facility, index: Index) -> String {
    match facility {
        Facility::SourceOutput => format!("record-{index}"),
        _ => format!("playback-{index}"),
    }
}

pub fn client_control(facility: Facility, info: &ClientStreamInfo) -> Control {
    let label = info.app.name.clone().unwrap_or_else(|| info.name.clone());
    Control::new(client_control_name(facility, info.index), label, ControlRole::Application)
        .with_flags(ControlFlags {
            has_volume: info.has_volume,
            can_set_volume: info.has_volume && info.volume_writable,
            has_mute: true,
            can_set_mute: true,
            volume_joined: false,
            switch_joined: false,
        })
        .with_range(software_range(VOLUME_NORM, &info.volumes))
        .with_decibel(DecibelScale::software(VOLUME_NORM))
        .with_mute(info.mute)
        .with_app_info(info.app.clone())
        .with_channels(info.positions.clone(), info.volumes.clone())
}

pub fn stored_control(info: &StoredInfo) -> Control {
    let label = info
        .name
        .split_once(':')
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_else(|| info.name.clone());
    Control::new(info.name.clone(), label, ControlRole::Application)
        .with_flags(ControlFlags::full())
        .with_range(software_range(VOLUME_NORM, &info.volumes))
        .with_decibel(DecibelScale::software(VOLUME_NORM))
        .with_mute(info.mute)
        .with_target_device(info.device.clone())
        .with_channels(info.positions.clone(), info.volumes.clone())
}

/// Ports ordered by priority, highest first; unavailable ports are kept.
pub fn port_options(info: &DeviceStreamInfo) -> Vec<SwitchOption> {
    let mut ports = info.ports.clone();
    ports.sort_by(|a, b| b.priority.cmp(&a.priority));
    ports
        .into_iter()
        .map(|p| SwitchOption::new(p.name, p.description))
        .collect()
}

pub fn port_switch(info: &DeviceStreamInfo) -> Option<Switch> {
    if info.ports.is_empty() {
        return None;
    }
    Some(
        Switch::new(PORT_SWITCH, "Connector", SwitchKind::Port)
            .with_options(port_options(info))
            .with_active(info.active_port.as_deref()),
    )
}

pub fn profile_options(info: &CardInfo) -> Vec<SwitchOption> {
    let mut profiles = info.profiles.clone();
    profiles.sort_by(|a, b| b.priority.cmp(&a.priority));
    profiles
        .into_iter()
        .map(|p| SwitchOption::new(p.name, p.description))
        .collect()
}

pub fn profile_switch(info: &CardInfo) -> Option<Switch> {
    if info.profiles.is_empty() {
        return None;
    }
    Some(
        Switch::new(PROFILE_SWITCH, "Profile", SwitchKind::Profile)
            .with_options(profile_options(info))
            .with_active(info.active_profile.as_deref()),
    )
}

pub fn role_for_stream(facility: Facility) -> ControlRole {
    match facility {
        Facility::Source => ControlRole::Capture,
        _ => ControlRole::Master,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelPosition::{FrontLeft, FrontRight};
    use crate::model::AppInfo;
    use crate::server::protocol::PortInfo;

    fn sink() -> DeviceStreamInfo {
        DeviceStreamInfo {
            index: 1,
            name: "alsa_output.analog".into(),
            description: "Analog Output".into(),
            card: Some(0),
            positions: vec![FrontLeft, FrontRight],
            volumes: vec![VOLUME_NORM, VOLUME_NORM / 2],
            base_volume: VOLUME_NORM,
            mute: false,
            ports: vec![
                PortInfo {
                    name: "speaker".into(),
                    description: "Speakers".into(),
                    priority: 10,
                    available: true,
                },
                PortInfo {
                    name: "headphones".into(),
                    description: "Headphones".into(),
                    priority: 20,
                    available: false,
                },
            ],
            active_port: Some("speaker".into()),
            monitor_of: None,
        }
    }

    #[test]
    fn stream_control_mirrors_server_volumes() {
        let control = stream_control(&sink(), ControlRole::Master);
        assert_eq!(control.volume(), Some(VOLUME_NORM));
        assert!(control.balance() < 0.0);
        assert!(control.decibel().abs() < 1e-9);
        assert_eq!(control.normal_volume(), VOLUME_NORM);
    }

    #[test]
    fn amplified_stream_keeps_its_volume_in_range() {
        let mut info = sink();
        info.volumes = vec![2 * VOLUME_NORM, 2 * VOLUME_NORM];
        let control = stream_control(&info, ControlRole::Master);
        assert_eq!(control.max_volume(), 2 * VOLUME_NORM);
        assert_eq!(
            control.plan_balance(-0.5),
            Ok(vec![2 * VOLUME_NORM, VOLUME_NORM])
        );
        assert_eq!(stream_control(&sink(), ControlRole::Master).max_volume(), VOLUME_UI_MAX);
    }

    #[test]
    fn ports_sorted_by_priority_keep_active() {
        let switch = port_switch(&sink()).unwrap();
        let names: Vec<&str> = switch.options().iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["headphones", "speaker"]);
        assert_eq!(switch.active_option().unwrap().name(), "speaker");
    }

    #[test]
    fn client_control_is_application_role() {
        let info = ClientStreamInfo {
            index: 7,
            name: "playback".into(),
            parent: 1,
            app: AppInfo {
                name: Some("Music Player".into()),
                ..Default::default()
            },
            positions: vec![FrontLeft, FrontRight],
            volumes: vec![100, 100],
            mute: false,
            has_volume: true,
            volume_writable: false,
        };
        let control = client_control(Facility::SinkInput, &info);
        assert_eq!(control.name(), "playback-7");
        assert_eq!(control.label(), "Music Player");
        assert_eq!(control.role(), ControlRole::Application);
        assert!(control.plan_volume(10).is_err());
    }

    #[test]
    fn stored_writes_carry_full_entry() {
        let info = StoredInfo {
            name: "sink-input-by-application-name:Music Player".into(),
            device: None,
            positions: vec![FrontLeft, FrontRight],
            volumes: vec![500, 500],
            mute: true,
        };
        let control = stored_control(&info);
        assert_eq!(control.label(), "Music Player");
        let target = ServerControl::Stored {
            name: info.name.clone(),
        };
        let request = target.volume_request(&control, vec![600, 600]).unwrap();
        assert_eq!(
            request,
            ServerRequest::WriteStored(StoredInfo {
                volumes: vec![600, 600],
                ..info
            })
        );
    }

    #[test]
    fn profile_selection_targets_card() {
        let switch = ServerSwitch::Profile { card: 3 };
        assert_eq!(
            switch.select_request("output:hdmi"),
            ServerRequest::SetProfile {
                card: 3,
                profile: "output:hdmi".into()
            }
        );
    }
}
