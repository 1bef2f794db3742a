use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelPosition {
    Unknown,
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    BackCenter,
    FrontLeftCenter,
    FrontRightCenter,
    SideLeft,
    SideRight,
    TopFrontLeft,
    TopFrontRight,
    TopFrontCenter,
    TopCenter,
    TopBackLeft,
    TopBackRight,
    TopBackCenter,
}

impl ChannelPosition {
    pub fn is_left(self) -> bool {
        matches!(
            self,
            Self::FrontLeft
                | Self::BackLeft
                | Self::FrontLeftCenter
                | Self::SideLeft
                | Self::TopFrontLeft
                | Self::TopBackLeft
        )
    }

    pub fn is_right(self) -> bool {
        matches!(
            self,
            Self::FrontRight
                | Self::BackRight
                | Self::FrontRightCenter
                | Self::SideRight
                | Self::TopFrontRight
                | Self::TopBackRight
        )
    }

    pub fn is_front(self) -> bool {
        matches!(
            self,
            Self::FrontLeft
                | Self::FrontRight
                | Self::FrontCenter
                | Self::FrontLeftCenter
                | Self::FrontRightCenter
                | Self::TopFrontLeft
                | Self::TopFrontRight
                | Self::TopFrontCenter
        )
    }

    pub fn is_back(self) -> bool {
        matches!(
            self,
            Self::BackLeft
                | Self::BackRight
                | Self::BackCenter
                | Self::TopBackLeft
                | Self::TopBackRight
                | Self::TopBackCenter
        )
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Set of positions present in a channel map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionMask(u32);

impl PositionMask {
    pub fn from_positions(positions: &[ChannelPosition]) -> Self {
        Self(positions.iter().fold(0, |mask, p| mask | p.bit()))
    }

    pub fn has(self, position: ChannelPosition) -> bool {
        self.0 & position.bit() != 0
    }

    pub fn has_any(self, predicate: impl Fn(ChannelPosition) -> bool) -> bool {
        ALL_POSITIONS
            .iter()
            .any(|&p| predicate(p) && self.has(p))
    }

    pub fn has_left_right(self) -> bool {
        self.has_any(ChannelPosition::is_left) && self.has_any(ChannelPosition::is_right)
    }

    pub fn has_front_back(self) -> bool {
        self.has_any(ChannelPosition::is_front) && self.has_any(ChannelPosition::is_back)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

const ALL_POSITIONS: [ChannelPosition; 20] = [
    ChannelPosition::Unknown,
    ChannelPosition::Mono,
    ChannelPosition::FrontLeft,
    ChannelPosition::FrontRight,
    ChannelPosition::FrontCenter,
    ChannelPosition::Lfe,
    ChannelPosition::BackLeft,
    ChannelPosition::BackRight,
    ChannelPosition::BackCenter,
    ChannelPosition::FrontLeftCenter,
    ChannelPosition::FrontRightCenter,
    ChannelPosition::SideLeft,
    ChannelPosition::SideRight,
    ChannelPosition::TopFrontLeft,
    ChannelPosition::TopFrontRight,
    ChannelPosition::TopFrontCenter,
    ChannelPosition::TopCenter,
    ChannelPosition::TopBackLeft,
    ChannelPosition::TopBackRight,
    ChannelPosition::TopBackCenter,
];

pub fn clamp_volume(volume: u32, min: u32, max: u32) -> u32 {
    volume.clamp(min, max.max(min))
}

pub fn max_volume(volumes: &[u32]) -> Option<u32> {
    volumes.iter().copied().max()
}

/// Rescales every channel so that the loudest one ends up at `target`.
pub fn scale_all(volumes: &[u32], target: u32) -> Vec<u32> {
    let current = max_volume(volumes).unwrap_or(0);
    if current == 0 {
        return vec![target; volumes.len()];
    }
    let factor = target as f64 / current as f64;
    volumes
        .iter()
        .map(|&v| round_volume(v as f64 * factor))
        .collect()
}

fn round_volume(value: f64) -> u32 {
    if value <= 0.0 {
        0
    } else if value >= u32::MAX as f64 {
        u32::MAX
    } else {
        value.round() as u32
    }
}

fn side_averages(
    volumes: &[u32],
    positions: &[ChannelPosition],
    first: fn(ChannelPosition) -> bool,
    second: fn(ChannelPosition) -> bool,
) -> (f64, f64) {
    let (mut a_sum, mut a_n, mut b_sum, mut b_n) = (0.0, 0_u32, 0.0, 0_u32);
    for (&v, &p) in volumes.iter().zip(positions) {
        if first(p) {
            a_sum += v as f64;
            a_n += 1;
        } else if second(p) {
            b_sum += v as f64;
            b_n += 1;
        }
    }
    let a = if a_n > 0 { a_sum / a_n as f64 } else { 0.0 };
    let b = if b_n > 0 { b_sum / b_n as f64 } else { 0.0 };
    (a, b)
}

fn side_ratio(first: f64, second: f64) -> f32 {
    if first == second {
        0.0
    } else if first > second {
        (-1.0 + second / first) as f32
    } else {
        (1.0 - first / second) as f32
    }
}

fn apply_sides(
    volumes: &[u32],
    positions: &[ChannelPosition],
    first: fn(ChannelPosition) -> bool,
    second: fn(ChannelPosition) -> bool,
    target: f32,
) -> Vec<u32> {
    let target = target.clamp(-1.0, 1.0) as f64;
    let (a, b) = side_averages(volumes, positions, first, second);
    let m = a.max(b);
    let (na, nb) = if target <= 0.0 {
        (m, (target + 1.0) * m)
    } else {
        ((1.0 - target) * m, m)
    };
    volumes
        .iter()
        .zip(positions)
        .map(|(&v, &p)| {
            if first(p) {
                if a == 0.0 { round_volume(na) } else { round_volume(v as f64 * na / a) }
            } else if second(p) {
                if b == 0.0 { round_volume(nb) } else { round_volume(v as f64 * nb / b) }
            } else {
                v
            }
        })
        .collect()
}

/// Left/right balance in [-1, 1]; negative when the left side is louder.
pub fn balance(volumes: &[u32], positions: &[ChannelPosition]) -> f32 {
    if !PositionMask::from_positions(positions).has_left_right() {
        return 0.0;
    }
    let (left, right) = side_averages(
        volumes,
        positions,
        ChannelPosition::is_left,
        ChannelPosition::is_right,
    );
    side_ratio(left, right)
}

/// Back/front fade in [-1, 1]; negative when the back is louder.
pub fn fade(volumes: &[u32], positions: &[ChannelPosition]) -> f32 {
    if !PositionMask::from_positions(positions).has_front_back() {
        return 0.0;
    }
    let (back, front) = side_averages(
        volumes,
        positions,
        ChannelPosition::is_back,
        ChannelPosition::is_front,
    );
    side_ratio(back, front)
}

pub fn apply_balance(volumes: &[u32], positions: &[ChannelPosition], balance: f32) -> Vec<u32> {
    if !PositionMask::from_positions(positions).has_left_right() {
        return volumes.to_vec();
    }
    apply_sides(
        volumes,
        positions,
        ChannelPosition::is_left,
        ChannelPosition::is_right,
        balance,
    )
}

pub fn apply_fade(volumes: &[u32], positions: &[ChannelPosition], fade: f32) -> Vec<u32> {
    if !PositionMask::from_positions(positions).has_front_back() {
        return volumes.to_vec();
    }
    apply_sides(
        volumes,
        positions,
        ChannelPosition::is_back,
        ChannelPosition::is_front,
        fade,
    )
}
