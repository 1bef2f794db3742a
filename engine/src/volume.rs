use serde::{Deserialize, Serialize};

/// Silence in decibels.
pub const DECIBEL_SILENCE: f64 = f64::NEG_INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRange {
    pub min: u32,
    pub max: u32,
    pub normal: u32,
    pub base: u32,
}

impl VolumeRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            normal: max,
            base: max,
        }
    }

    pub fn with_normal(mut self, normal: u32) -> Self {
        self.normal = normal;
        self
    }

    pub fn with_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub fn clamp(&self, volume: u32) -> u32 {
        crate::channel::clamp_volume(volume, self.min, self.max)
    }

    pub fn contains(&self, volume: u32) -> bool {
        volume >= self.min && volume <= self.max
    }
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecibelScale {
    /// Cubic curve used by sound servers for software volumes.
    Software { normal: u32 },
    /// Range reported by the hardware for `min..=max`; `min` itself is silence.
    Hardware { min_db: f64, max_db: f64 },
}

impl DecibelScale {
    pub fn software(normal: u32) -> Option<Self> {
        (normal > 0).then_some(Self::Software { normal })
    }

    pub fn hardware(min_db: f64, max_db: f64) -> Option<Self> {
        (min_db.is_finite() && max_db.is_finite() && min_db < max_db)
            .then_some(Self::Hardware { min_db, max_db })
    }
}

pub fn linear_to_decibel(volume: u32, range: &VolumeRange, scale: &DecibelScale) -> f64 {
    match *scale {
        DecibelScale::Software { normal } => {
            if volume == 0 {
                return DECIBEL_SILENCE;
            }
            60.0 * (volume as f64 / normal as f64).log10()
        }
        DecibelScale::Hardware { min_db, max_db } => {
            let volume = range.clamp(volume);
            if volume <= range.min || range.max <= range.min {
                return DECIBEL_SILENCE;
            }
            let t = (volume - range.min) as f64 / (range.max - range.min) as f64;
            min_db + t * (max_db - min_db)
        }
    }
}

pub fn decibel_to_linear(decibel: f64, range: &VolumeRange, scale: &DecibelScale) -> u32 {
    if decibel.is_nan() || decibel == DECIBEL_SILENCE {
        return match scale {
            DecibelScale::Software { .. } => 0,
            DecibelScale::Hardware { .. } => range.min,
        };
    }
    match *scale {
        DecibelScale::Software { normal } => {
            let v = normal as f64 * 10_f64.powf(decibel / 60.0);
            if v >= u32::MAX as f64 {
                u32::MAX
            } else {
                v.round() as u32
            }
        }
        DecibelScale::Hardware { min_db, max_db } => {
            if decibel <= min_db {
                return range.min;
            }
            if decibel >= max_db {
                return range.max;
            }
            let t = (decibel - min_db) / (max_db - min_db);
            let v = range.min as f64 + t * (range.max - range.min) as f64;
            range.clamp(v.round() as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NORM: u32 = 65_536;

    #[test]
    fn zero_is_silence() {
        let range = VolumeRange::new(0, NORM);
        let scale = DecibelScale::software(NORM).unwrap();
        assert_eq!(linear_to_decibel(0, &range, &scale), DECIBEL_SILENCE);
        assert_eq!(decibel_to_linear(DECIBEL_SILENCE, &range, &scale), 0);
    }

    #[test]
    fn normal_is_zero_db() {
        let range = VolumeRange::new(0, NORM);
        let scale = DecibelScale::software(NORM).unwrap();
        assert!(linear_to_decibel(NORM, &range, &scale).abs() < 1e-9);
    }

    #[test]
    fn hardware_min_is_silence() {
        let range = VolumeRange::new(0, 87);
        let scale = DecibelScale::hardware(-65.25, 0.0).unwrap();
        assert_eq!(linear_to_decibel(0, &range, &scale), DECIBEL_SILENCE);
        assert_eq!(linear_to_decibel(87, &range, &scale), 0.0);
        assert_eq!(decibel_to_linear(DECIBEL_SILENCE, &range, &scale), 0);
        assert_eq!(decibel_to_linear(-200.0, &range, &scale), 0);
        assert_eq!(decibel_to_linear(6.0, &range, &scale), 87);
    }

    #[test]
    fn degenerate_hardware_range_is_rejected() {
        assert!(DecibelScale::hardware(0.0, 0.0).is_none());
        assert!(DecibelScale::hardware(f64::NEG_INFINITY, 0.0).is_none());
        assert!(DecibelScale::software(0).is_none());
    }

    proptest! {
        #[test]
        fn software_round_trip(v in 0_u32..=(NORM * 3 / 2)) {
            let range = VolumeRange::new(0, NORM * 3 / 2).with_normal(NORM);
            let scale = DecibelScale::software(NORM).unwrap();
            let db = linear_to_decibel(v, &range, &scale);
            prop_assert_eq!(decibel_to_linear(db, &range, &scale), v);
        }

        #[test]
        fn hardware_round_trip(v in 0_u32..=255, min_db in -100.0_f64..-1.0, max_db in 0.0_f64..12.0) {
            let range = VolumeRange::new(0, 255);
            let scale = DecibelScale::hardware(min_db, max_db).unwrap();
            let db = linear_to_decibel(v, &range, &scale);
            prop_assert_eq!(decibel_to_linear(db, &range, &scale), v);
        }

        #[test]
        fn conversion_is_monotonic(a in 1_u32..NORM, b in 1_u32..NORM) {
            let range = VolumeRange::new(0, NORM);
            let scale = DecibelScale::software(NORM).unwrap();
            let (da, db) = (linear_to_decibel(a, &range, &scale), linear_to_decibel(b, &range, &scale));
            prop_assert_eq!(a.cmp(&b), da.partial_cmp(&db).unwrap());
        }
    }
}
