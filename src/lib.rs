//! # sndcard-node
//!
//! Backend abstraction and virtual-card plugin resolution for sound device
//! nodes.
//!
//! An audio transfer/control engine addresses a sound device through one of
//! two interchangeable backends: a hardware backend that talks directly to
//! the kernel device nodes under `/dev/snd`, or a plugin backend that
//! presents a synthetic card through a dynamically loaded card definition
//! module. The engine asks the loader for a node, then calls the generic
//! property and I/O operations without branching on which backend is
//! active.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐  open_pcm / open_mixer   ┌──────────────────────────┐
//! │  transfer /      │ ───────────────────────▶ │  plugin loader           │
//! │  control engine  │                          │  (SndNode resolution)    │
//! │                  │ ◀─────────────────────── │                          │
//! └────────┬─────────┘   Some(node) | None      └────────────┬─────────────┘
//!          │                                                 │ loads
//!          │ PcmOps / MixerOps                               ▼
//!          ▼                                   ┌──────────────────────────┐
//! ┌──────────────────┐                         │  card definition module  │
//! │ HwPcm / HwMixer  │──▶ /dev/snd/pcmC*D*,    │  (snd_card_ops table)    │
//! └──────────────────┘    /dev/snd/controlC*   └──────────────────────────┘
//! ```
//!
//! A `None` resolution (no module installed, or the module declined the
//! card id) is the signal to stay on the hardware backend; it is never
//! escalated as an error.

pub mod backend;
pub mod error;
pub mod plugin;

pub use backend::{HwMixer, HwPcm, MixerOps, OpenFlags, PcmOps};
pub use error::{Error, Result};
pub use plugin::{NodeType, SndNode, CARD_MODULE, VIRTUAL_CARD};
