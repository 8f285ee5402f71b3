//! Card definition module loading and the device node abstraction
//!
//! Resolves the card definition module, selects a card and device, and
//! hands the transfer engine an opaque node it can query without branching
//! on which backend serves it.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;

use libloading::Library;
use tracing::debug;

use crate::error::{Error, Result};
use crate::plugin::abi::{self, CardOps, NodeType, CARD_MODULE, CARD_OPS_SYMBOL};

/// Which kind of device a resolution targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DevKind {
    Pcm,
    Mixer,
}

/// Resolved, open handle to a PCM or mixer device definition
///
/// The node exclusively owns its card handle and the loaded module. Field
/// order is load-bearing: `Drop` closes the card handle before the `lib`
/// field unloads the module that implements `close_card`. Raw module
/// handles make the node neither `Send` nor `Sync`; the contract is
/// single-threaded and distinct nodes never share state.
pub struct SndNode {
    card: *mut c_void,
    dev: *mut c_void,
    ops: *const CardOps,
    lib: Option<Library>,
}

impl SndNode {
    /// Resolve PCM device `device` on `card` through the card module
    ///
    /// `Ok(None)` means no card definition module is installed, or the
    /// module declined the card id; either way the caller falls back to
    /// the hardware backend. Errors are reserved for a module that is
    /// present but broken.
    pub fn open_pcm(card: c_uint, device: c_uint) -> Result<Option<SndNode>> {
        Self::open_dev_node(card, device, DevKind::Pcm)
    }

    /// Resolve the mixer device on `card` through the card module
    pub fn open_mixer(card: c_uint) -> Result<Option<SndNode>> {
        Self::open_dev_node(card, 0, DevKind::Mixer)
    }

    fn open_dev_node(card: c_uint, device: c_uint, kind: DevKind) -> Result<Option<SndNode>> {
        // A missing module is the normal case on hardware-only systems.
        let lib = match unsafe { Library::new(CARD_MODULE) } {
            Ok(lib) => lib,
            Err(err) => {
                debug!("no card definition module ({}): {}", CARD_MODULE, err);
                return Ok(None);
            }
        };

        let ops = Self::resolve_ops(&lib)?;

        let card_handle = unsafe { ((*ops).open_card)(card) };
        if card_handle.is_null() {
            debug!("card definition module declined card {}", card);
            return Ok(None);
        }

        // The node owns the handles from here on; every early return below
        // unwinds through Drop in reverse acquisition order (close_card,
        // then module unload, then the node itself).
        let mut node = SndNode {
            card: card_handle,
            dev: ptr::null_mut(),
            ops,
            lib: Some(lib),
        };

        node.dev = unsafe {
            match kind {
                DevKind::Pcm => ((*ops).get_pcm)(node.card, device),
                DevKind::Mixer => ((*ops).get_mixer)(node.card, device),
            }
        };
        if node.dev.is_null() {
            return Err(Error::NotFound(match kind {
                DevKind::Pcm => format!("pcm device {} on card {}", device, card),
                DevKind::Mixer => format!("mixer on card {}", card),
            }));
        }

        Ok(Some(node))
    }

    /// Resolve and validate the module's operations table
    fn resolve_ops(lib: &Library) -> Result<*const CardOps> {
        let symbol = String::from_utf8_lossy(CARD_OPS_SYMBOL);

        let ops: *const CardOps = unsafe {
            match lib.get::<*const CardOps>(CARD_OPS_SYMBOL) {
                Ok(sym) => *sym,
                Err(err) => return Err(Error::AbiMismatch(format!("{symbol}: {err}"))),
            }
        };

        if ops.is_null() || !unsafe { abi::table_is_complete(ops) } {
            return Err(Error::AbiMismatch(format!(
                "{symbol}: operations table is incomplete"
            )));
        }

        Ok(ops)
    }

    fn usable(&self) -> bool {
        !self.ops.is_null() && !self.card.is_null() && !self.dev.is_null()
    }

    /// Read an integer property of the resolved device
    ///
    /// A node without a resolved card or device handle fails without
    /// dereferencing anything.
    pub fn get_int(&self, prop: &str) -> Result<c_int> {
        if !self.usable() {
            return Err(Error::InvalidArgument("node has no resolved device".into()));
        }

        let cprop = CString::new(prop)
            .map_err(|_| Error::InvalidArgument(format!("property name contains NUL: {prop:?}")))?;
        let mut val: c_int = 0;

        let rc = unsafe { ((*self.ops).get_int)(self.dev, cprop.as_ptr(), &mut val) };
        if rc < 0 {
            return Err(Error::from_abi_code(rc, prop));
        }
        Ok(val)
    }

    /// Read a string property of the resolved device
    ///
    /// The value is copied out before returning, so nothing borrowed from
    /// the module outlives the card handle.
    pub fn get_str(&self, prop: &str) -> Result<String> {
        if !self.usable() {
            return Err(Error::InvalidArgument("node has no resolved device".into()));
        }

        let cprop = CString::new(prop)
            .map_err(|_| Error::InvalidArgument(format!("property name contains NUL: {prop:?}")))?;
        let mut val: *const c_char = ptr::null();

        let rc = unsafe { ((*self.ops).get_str)(self.dev, cprop.as_ptr(), &mut val) };
        if rc < 0 {
            return Err(Error::from_abi_code(rc, prop));
        }
        if val.is_null() {
            return Err(Error::NotFound(prop.to_string()));
        }
        Ok(unsafe { CStr::from_ptr(val) }.to_string_lossy().into_owned())
    }

    /// Backend kind of the resolved device
    ///
    /// Defaults to [`NodeType::Hw`] on an unusable node or failed read, so
    /// callers route such devices to the hardware backend.
    pub fn node_type(&self) -> NodeType {
        match self.get_int("type") {
            Ok(val) => NodeType::from_raw(val),
            Err(_) => NodeType::Hw,
        }
    }
}

impl Drop for SndNode {
    fn drop(&mut self) {
        // Close the card first; the module that implements close_card is
        // unloaded only when the `lib` field drops after this body.
        if !self.card.is_null() && !self.ops.is_null() {
            unsafe { ((*self.ops).close_card)(self.card) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::abi::VIRTUAL_CARD;
    use crate::plugin::card::snd_card_ops;

    /// Build a node over the in-process reference table, skipping dlopen
    fn reference_node(card: c_uint, device: c_uint, kind: DevKind) -> Option<SndNode> {
        let ops: *const CardOps = &snd_card_ops;
        let card_handle = unsafe { (snd_card_ops.open_card)(card) };
        if card_handle.is_null() {
            return None;
        }

        let mut node = SndNode {
            card: card_handle,
            dev: ptr::null_mut(),
            ops,
            lib: None,
        };
        node.dev = unsafe {
            match kind {
                DevKind::Pcm => (snd_card_ops.get_pcm)(node.card, device),
                DevKind::Mixer => (snd_card_ops.get_mixer)(node.card, device),
            }
        };
        if node.dev.is_null() {
            // Dropping the partial node closes the card handle.
            return None;
        }
        Some(node)
    }

    #[test]
    fn test_missing_module_is_soft_decline() {
        // Test machines do not install the card parser module; resolution
        // must come back as the hardware-fallback signal, not an error.
        let resolved = SndNode::open_pcm(VIRTUAL_CARD, 100).unwrap();
        assert!(resolved.is_none());

        let mixer = SndNode::open_mixer(VIRTUAL_CARD).unwrap();
        assert!(mixer.is_none());
    }

    #[test]
    fn test_pcm_node_properties_via_dispatch() {
        let node = reference_node(VIRTUAL_CARD, 100, DevKind::Pcm).unwrap();

        assert_eq!(node.node_type(), NodeType::Plugin);
        assert_eq!(node.get_int("playback").unwrap(), 1);
        assert_eq!(node.get_int("capture").unwrap(), 0);
        assert_eq!(node.get_int("id").unwrap(), 100);
        assert_eq!(node.get_str("name").unwrap(), "PCM100");
        assert!(matches!(
            node.get_int("bogus"),
            Err(Error::InvalidArgument(_))
        ));

        // Drop closes the card through the module's own close_card.
        drop(node);
    }

    #[test]
    fn test_mixer_node_resolves_regardless_of_id() {
        let node = reference_node(VIRTUAL_CARD, 0, DevKind::Mixer).unwrap();
        assert_eq!(node.node_type(), NodeType::Plugin);
        assert_eq!(node.get_str("name").unwrap(), "virtual-snd-card");
    }

    #[test]
    fn test_declined_card_yields_no_node() {
        assert!(reference_node(0, 100, DevKind::Pcm).is_none());
        assert!(reference_node(VIRTUAL_CARD + 1, 100, DevKind::Pcm).is_none());
    }

    #[test]
    fn test_unknown_device_yields_no_node() {
        assert!(reference_node(VIRTUAL_CARD, 7, DevKind::Pcm).is_none());
    }

    #[test]
    fn test_unusable_node_defaults() {
        let node = SndNode {
            card: ptr::null_mut(),
            dev: ptr::null_mut(),
            ops: &snd_card_ops,
            lib: None,
        };

        assert!(matches!(
            node.get_int("type"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            node.get_str("name"),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(node.node_type(), NodeType::Hw);
    }
}
