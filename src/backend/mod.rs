//! Device backends implementing the PCM and mixer operations contract

pub mod hw;
pub mod ops;

pub use hw::{HwMixer, HwPcm};
pub use ops::{ioctl, ioctl_none, MixerOps, OpenFlags, PcmOps};
