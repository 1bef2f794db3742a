use crate::hw::alsa::AlsaHardware;
use crate::hw::options::HwOptions;
use crate::hw_backend::HwBackend;

pub type AlsaBackend = HwBackend<AlsaHardware>;

pub const NAME: &str = "alsa";

pub fn new(options: HwOptions) -> AlsaBackend {
    HwBackend::new(AlsaHardware, options)
}
