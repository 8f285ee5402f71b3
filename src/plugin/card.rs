//! Reference card definition module for the synthetic sound card
//!
//! Serves one virtual card with a fixed PCM list and a single mixer
//! device. Built as part of the crate's `cdylib` target this is a loadable
//! card definition module in its own right; the exported `snd_card_ops`
//! table is the whole contract.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;

use tracing::debug;

use crate::plugin::abi::{CardOps, NodeType, VIRTUAL_CARD};

/// Template for one device record, cloned into fresh storage per open
struct DevTemplate {
    device: c_uint,
    ty: NodeType,
    name: &'static str,
    so_name: &'static str,
    playback: c_int,
    capture: c_int,
}

/// PCM devices served on the virtual card
const PCM_TEMPLATES: &[DevTemplate] = &[DevTemplate {
    device: 100,
    ty: NodeType::Plugin,
    name: "PCM100",
    so_name: "libsndcard_plugin_pcm.so",
    playback: 1,
    capture: 0,
}];

/// The single mixer device on the virtual card
const MIXER_TEMPLATE: DevTemplate = DevTemplate {
    device: VIRTUAL_CARD,
    ty: NodeType::Plugin,
    name: "virtual-snd-card",
    so_name: "libsndcard_plugin_mixer.so",
    playback: 0,
    capture: 0,
};

/// One PCM or mixer device record
///
/// Pointers handed across the ABI reference these records in place; they
/// die with the card definition that owns them.
struct DevDef {
    device: c_uint,
    ty: c_int,
    name: CString,
    so_name: CString,
    playback: c_int,
    capture: c_int,
}

impl DevDef {
    fn from_template(template: &DevTemplate) -> Option<DevDef> {
        Some(DevDef {
            device: template.device,
            ty: template.ty as c_int,
            name: CString::new(template.name).ok()?,
            so_name: CString::new(template.so_name).ok()?,
            playback: template.playback,
            capture: template.capture,
        })
    }
}

/// A card's device tree: the PCM list plus the one mixer
struct CardDef {
    card: c_uint,
    name: CString,
    pcm: Vec<DevDef>,
    mixer: DevDef,
}

impl CardDef {
    /// Build the definition by cloning the templates
    ///
    /// All-or-nothing: a failure at any step yields `None` with every
    /// partially built record already released.
    fn build(card: c_uint) -> Option<CardDef> {
        let mut pcm = Vec::with_capacity(PCM_TEMPLATES.len());
        for template in PCM_TEMPLATES {
            pcm.push(DevDef::from_template(template)?);
        }

        Some(CardDef {
            card,
            name: CString::new(MIXER_TEMPLATE.name).ok()?,
            pcm,
            mixer: DevDef::from_template(&MIXER_TEMPLATE)?,
        })
    }
}

unsafe extern "C" fn card_open(card: c_uint) -> *mut c_void {
    if card != VIRTUAL_CARD {
        return ptr::null_mut();
    }

    match CardDef::build(card) {
        Some(def) => Box::into_raw(Box::new(def)).cast(),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn card_close(card: *mut c_void) {
    if card.is_null() {
        return;
    }

    let def = Box::from_raw(card.cast::<CardDef>());
    debug!("closed card {} ({})", def.card, def.name.to_string_lossy());
}

unsafe extern "C" fn dev_get_int(dev: *mut c_void, prop: *const c_char, val: *mut c_int) -> c_int {
    if dev.is_null() || prop.is_null() || val.is_null() {
        return -libc::EINVAL;
    }

    let dev = &*dev.cast::<DevDef>();
    let out = match CStr::from_ptr(prop).to_bytes() {
        b"type" => dev.ty,
        b"id" => dev.device as c_int,
        b"playback" => dev.playback,
        b"capture" => dev.capture,
        _ => return -libc::EINVAL,
    };

    *val = out;
    0
}

unsafe extern "C" fn dev_get_str(
    dev: *mut c_void,
    prop: *const c_char,
    val: *mut *const c_char,
) -> c_int {
    if dev.is_null() || prop.is_null() || val.is_null() {
        return -libc::EINVAL;
    }

    let dev = &*dev.cast::<DevDef>();
    let out = match CStr::from_ptr(prop).to_bytes() {
        b"so-name" => dev.so_name.as_ptr(),
        b"name" => dev.name.as_ptr(),
        _ => return -libc::EINVAL,
    };

    *val = out;
    0
}

unsafe extern "C" fn card_get_mixer(card: *mut c_void, _id: c_uint) -> *mut c_void {
    // One mixer per card as served today; the requested id is not consulted.
    if card.is_null() {
        return ptr::null_mut();
    }

    let def = &*card.cast::<CardDef>();
    (&def.mixer as *const DevDef as *mut DevDef).cast()
}

unsafe extern "C" fn card_get_pcm(card: *mut c_void, id: c_uint) -> *mut c_void {
    find_pcm(card, id)
}

unsafe extern "C" fn card_get_compress(card: *mut c_void, id: c_uint) -> *mut c_void {
    find_pcm(card, id)
}

/// Linear scan by device id; device counts are small and this is not a
/// hot path
unsafe fn find_pcm(card: *mut c_void, id: c_uint) -> *mut c_void {
    if card.is_null() {
        return ptr::null_mut();
    }

    let def = &*card.cast::<CardDef>();
    for dev in &def.pcm {
        if dev.device == id {
            return (dev as *const DevDef as *mut DevDef).cast();
        }
    }

    ptr::null_mut()
}

/// Operations table exported for the loader
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static snd_card_ops: CardOps = CardOps {
    open_card: card_open,
    close_card: card_close,
    get_int: dev_get_int,
    get_str: dev_get_str,
    get_mixer: card_get_mixer,
    get_pcm: card_get_pcm,
    get_compress: card_get_compress,
};
