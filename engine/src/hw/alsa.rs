use super::traits::{
    Element, ElementKey, ElementKind, EventWaiter, HardwareUnit, MixerHardware, UnitInfo,
    VolumeElement,
};
use crate::channel::ChannelPosition;
use crate::error::{Error, Result};
use crate::model::Direction;
use alsa::Round;
use alsa::mixer::{MilliBel, Mixer, Selem, SelemChannelId, SelemId};
use alsa::poll::Descriptors;
use nix::libc;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use tracing::{debug, warn};

const CARD_ICON: &str = "audio-card";
/// Gain the driver reports for a volume that mutes the element.
const DB_GAIN_MUTE: i64 = -9_999_999;

fn alsa_error(target: &str, e: alsa::Error) -> Error {
    if e.errno() == libc::ENODEV {
        Error::Closed(target.to_string())
    } else {
        Error::io(target, e)
    }
}

pub fn channel_position(channel: SelemChannelId) -> ChannelPosition {
    match channel {
        SelemChannelId::FrontLeft => ChannelPosition::FrontLeft,
        SelemChannelId::FrontRight => ChannelPosition::FrontRight,
        SelemChannelId::RearLeft => ChannelPosition::BackLeft,
        SelemChannelId::RearRight => ChannelPosition::BackRight,
        SelemChannelId::FrontCenter => ChannelPosition::FrontCenter,
        SelemChannelId::Woofer => ChannelPosition::Lfe,
        SelemChannelId::SideLeft => ChannelPosition::SideLeft,
        SelemChannelId::SideRight => ChannelPosition::SideRight,
        SelemChannelId::RearCenter => ChannelPosition::BackCenter,
        _ => ChannelPosition::Unknown,
    }
}

#[derive(Debug, Default)]
pub struct AlsaHardware;

impl MixerHardware for AlsaHardware {
    type Unit = AlsaUnit;

    fn name(&self) -> &'static str {
        "alsa"
    }

    fn enumerate(&mut self) -> Result<Vec<UnitInfo>> {
        let mut units = vec![];
        for card in alsa::card::Iter::new() {
            let card = match card {
                Ok(card) => card,
                Err(e) => {
                    warn!("ALSA card enumeration error: {}", e);
                    continue;
                }
            };
            let index = card.get_index();
            let label = card
                .get_name()
                .unwrap_or_else(|_| format!("Card {index}"));
            units.push(UnitInfo {
                id: format!("card{index}"),
                address: format!("hw:{index}"),
                label,
                icon: Some(CARD_ICON.to_string()),
            });
        }
        Ok(units)
    }

    fn open(&mut self, unit: &UnitInfo) -> Result<AlsaUnit> {
        let mixer = Mixer::new(&unit.address, true).map_err(|e| alsa_error(&unit.address, e))?;
        debug!("opened ALSA mixer {}", unit.address);
        Ok(AlsaUnit {
            wake: None,
            mixer: UnitMixer(mixer),
            address: unit.address.clone(),
        })
    }
}

struct UnitMixer(Mixer);

// SAFETY: the mixer handle is only touched by whoever owns the unit, which is
// the single consumer context; the worker thread only polls copied descriptors.
unsafe impl Send for UnitMixer {}

/// One opened ALSA card.
///
/// The write end of the wake pair is declared first so it closes before the
/// mixer, letting a worker blocked in `poll` return.
pub struct AlsaUnit {
    wake: Option<UnixStream>,
    mixer: UnitMixer,
    address: String,
}

impl AlsaUnit {
    fn selem(&self, key: &ElementKey) -> Result<Selem<'_>> {
        let id = SelemId::new(&key.name, key.index);
        self.mixer
            .0
            .find_selem(&id)
            .ok_or_else(|| Error::NotFound(format!("{} element {}", self.address, key.name)))
    }
}

fn channels(selem: &Selem, direction: Direction) -> Vec<SelemChannelId> {
    let mono = match direction {
        Direction::Input => selem.is_capture_mono(),
        _ => selem.is_playback_mono(),
    };
    if mono {
        return vec![SelemChannelId::mono()];
    }
    let found: Vec<SelemChannelId> = SelemChannelId::all()
        .iter()
        .copied()
        .filter(|&c| match direction {
            Direction::Input => selem.has_capture_channel(c),
            _ => selem.has_playback_channel(c),
        })
        .collect();
    if found.is_empty() {
        vec![SelemChannelId::mono()]
    } else {
        found
    }
}

fn read_volume(selem: &Selem, direction: Direction, address: &str) -> Result<VolumeElement> {
    let input = direction == Direction::Input;
    let (min, max) = if input {
        selem.get_capture_volume_range()
    } else {
        selem.get_playback_volume_range()
    };
    let chans = channels(selem, direction);
    let mono = chans.len() == 1;
    let mut volumes = Vec::with_capacity(chans.len());
    for &c in &chans {
        let raw = if input {
            selem.get_capture_volume(c)
        } else {
            selem.get_playback_volume(c)
        }
        .map_err(|e| alsa_error(address, e))?;
        volumes.push((raw - min).max(0) as u32);
    }
    let positions = if mono {
        vec![ChannelPosition::Mono]
    } else {
        chans.iter().map(|&c| channel_position(c)).collect()
    };
    let (db_min, db_max) = if input {
        selem.get_capture_db_range()
    } else {
        selem.get_playback_db_range()
    };
    let decibel = (db_max.0 > db_min.0).then(|| (db_min.0 as f64 / 100.0, db_max.0 as f64 / 100.0));
    let channel_decibels = decibel.and_then(|_| {
        chans
            .iter()
            .map(|&c| {
                let db = if input {
                    selem.get_capture_vol_db(c)
                } else {
                    selem.get_playback_vol_db(c)
                };
                db.ok().map(|db| match db {
                    MilliBel(DB_GAIN_MUTE) => f64::NEG_INFINITY,
                    db => f64::from(db.to_db()),
                })
            })
            .collect::<Option<Vec<f64>>>()
    });
    let has_switch = if input {
        selem.has_capture_switch()
    } else {
        selem.has_playback_switch()
    };
    let mute = if has_switch {
        let on = if input {
            selem.get_capture_switch(chans[0])
        } else {
            selem.get_playback_switch(chans[0])
        }
        .map_err(|e| alsa_error(address, e))?;
        Some(on == 0)
    } else {
        None
    };
    Ok(VolumeElement {
        positions,
        volumes,
        min: 0,
        max: (max - min).max(0) as u32,
        decibel,
        channel_decibels,
        mute,
        can_set_volume: true,
        volume_joined: mono,
        switch_joined: mono,
    })
}

impl HardwareUnit for AlsaUnit {
    fn waiter(&mut self) -> Result<Box<dyn EventWaiter>> {
        let mixer = &self.mixer.0;
        let mut fds = vec![
            libc::pollfd {
                fd: -1,
                events: 0,
                revents: 0,
            };
            Descriptors::count(mixer)
        ];
        let filled = Descriptors::fill(mixer, &mut fds).map_err(|e| alsa_error(&self.address, e))?;
        fds.truncate(filled);
        let (wake_read, wake_write) = UnixStream::pair().map_err(|e| Error::io(&self.address, e))?;
        fds.push(libc::pollfd {
            fd: wake_read.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        self.wake = Some(wake_write);
        Ok(Box::new(AlsaWaiter {
            fds,
            _wake: wake_read,
            address: self.address.clone(),
        }))
    }

    fn handle_events(&mut self) -> Result<()> {
        self.mixer
            .0
            .handle_events()
            .map(|_| ())
            .map_err(|e| alsa_error(&self.address, e))
    }

    fn elements(&mut self) -> Result<Vec<Element>> {
        let mut out = vec![];
        for elem in self.mixer.0.iter() {
            let Some(selem) = Selem::new(elem) else {
                continue;
            };
            let id = selem.get_id();
            let name = match id.get_name() {
                Ok(name) => name.to_string(),
                Err(e) => {
                    warn!("{} element without a name: {}", self.address, e);
                    continue;
                }
            };
            let key = ElementKey::new(name, id.get_index());

            if selem.is_enumerated() {
                let options: Vec<String> = match selem.iter_enum() {
                    Ok(items) => items.filter_map(|item| item.ok()).collect(),
                    Err(e) => {
                        warn!("{} {} has unreadable items: {}", self.address, key.name, e);
                        continue;
                    }
                };
                let active = selem
                    .get_enum_item(SelemChannelId::mono())
                    .ok()
                    .map(|i| i as usize)
                    .filter(|&i| i < options.len());
                let direction = if selem.is_enum_capture() {
                    Direction::Input
                } else if selem.is_enum_playback() {
                    Direction::Output
                } else {
                    Direction::Unknown
                };
                out.push(Element {
                    key,
                    direction,
                    kind: ElementKind::Switch { options, active },
                });
                continue;
            }

            for direction in [Direction::Output, Direction::Input] {
                let (has_volume, has_switch) = match direction {
                    Direction::Input => (selem.has_capture_volume(), selem.has_capture_switch()),
                    _ => (selem.has_playback_volume(), selem.has_playback_switch()),
                };
                if has_volume {
                    match read_volume(&selem, direction, &self.address) {
                        Ok(el) => out.push(Element {
                            key: key.clone(),
                            direction,
                            kind: ElementKind::Volume(el),
                        }),
                        Err(e) if e.is_closed() => return Err(e),
                        Err(e) => warn!("{} skipping {}: {}", self.address, key.name, e),
                    }
                } else if has_switch {
                    let chan = channels(&selem, direction)[0];
                    let on = match direction {
                        Direction::Input => selem.get_capture_switch(chan),
                        _ => selem.get_playback_switch(chan),
                    };
                    match on {
                        Ok(on) => out.push(Element {
                            key: key.clone(),
                            direction,
                            kind: ElementKind::Toggle { on: on != 0 },
                        }),
                        Err(e) => warn!("{} skipping {}: {}", self.address, key.name, e),
                    }
                }
            }
        }
        Ok(out)
    }

    fn write_volume(&mut self, key: &ElementKey, direction: Direction, volumes: &[u32]) -> Result<()> {
        let selem = self.selem(key)?;
        let input = direction == Direction::Input;
        let (min, _) = if input {
            selem.get_capture_volume_range()
        } else {
            selem.get_playback_volume_range()
        };
        for (&c, &v) in channels(&selem, direction).iter().zip(volumes) {
            let raw = min + i64::from(v);
            if input {
                selem.set_capture_volume(c, raw)
            } else {
                selem.set_playback_volume(c, raw)
            }
            .map_err(|e| alsa_error(&self.address, e))?;
        }
        Ok(())
    }

    fn decibel_to_volume(
        &mut self,
        key: &ElementKey,
        direction: Direction,
        decibel: f64,
    ) -> Result<Option<u32>> {
        let selem = self.selem(key)?;
        let db = MilliBel::from_db(decibel as f32);
        let (min, raw) = match direction {
            Direction::Input => (
                selem.get_capture_volume_range().0,
                selem.ask_capture_db_vol(db, Round::Floor),
            ),
            _ => (
                selem.get_playback_volume_range().0,
                selem.ask_playback_db_vol(db, Round::Floor),
            ),
        };
        match raw {
            Ok(raw) => Ok(Some((raw - min).max(0) as u32)),
            Err(e) => {
                debug!("{} {} has no decibel mapping: {}", self.address, key.name, e);
                Ok(None)
            }
        }
    }

    fn write_mute(&mut self, key: &ElementKey, direction: Direction, mute: bool) -> Result<()> {
        self.write_toggle(key, direction, !mute)
    }

    fn write_switch(&mut self, key: &ElementKey, option: usize) -> Result<()> {
        let selem = self.selem(key)?;
        let option = u32::try_from(option).map_err(|_| Error::OutOfRange {
            what: "option",
            value: option.to_string(),
        })?;
        selem
            .set_enum_item(SelemChannelId::mono(), option)
            .map_err(|e| alsa_error(&self.address, e))
    }

    fn write_toggle(&mut self, key: &ElementKey, direction: Direction, on: bool) -> Result<()> {
        let selem = self.selem(key)?;
        let value = i32::from(on);
        match direction {
            Direction::Input => selem.set_capture_switch_all(value),
            _ => selem.set_playback_switch_all(value),
        }
        .map_err(|e| alsa_error(&self.address, e))
    }
}

struct AlsaWaiter {
    fds: Vec<libc::pollfd>,
    _wake: UnixStream,
    address: String,
}

impl EventWaiter for AlsaWaiter {
    fn wait(&mut self) -> Result<()> {
        loop {
            for fd in &mut self.fds {
                fd.revents = 0;
            }
            // SAFETY: `fds` is a live, correctly sized pollfd array for the call.
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    -1,
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::io(&self.address, err));
            }
            let closed = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
            let woken = self.fds.last().is_some_and(|fd| fd.revents != 0);
            if woken || self.fds.iter().any(|fd| fd.revents & closed != 0) {
                return Err(Error::Closed(self.address.clone()));
            }
            return Ok(());
        }
    }
}
