//! Operations contract shared by PCM and mixer backends
//!
//! Every backend dispatches purely through its own handle; there is no
//! shared global state. Opening is a concrete constructor on each backend
//! and closing is `Drop`, so release ordering is structural rather than
//! hand-written per error path.

use std::os::raw::{c_int, c_ulong, c_void};
use std::ptr;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Flags accepted when opening a PCM device
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open the capture direction instead of playback
        const CAPTURE = 0x1;
        /// Keep the descriptor in non-blocking mode after open
        const NONBLOCK = 0x2;
    }
}

/// PCM device operations every backend must implement
pub trait PcmOps {
    /// Forward one pointer-sized ioctl argument to the device
    ///
    /// # Safety
    ///
    /// `arg` must point to a value with the layout the kernel expects for
    /// `cmd`, or be null for commands that take no argument.
    unsafe fn ioctl_raw(&self, cmd: c_ulong, arg: *mut c_void) -> Result<c_int>;

    /// Map device memory into the caller's address space
    ///
    /// # Safety
    ///
    /// Same contract as `mmap(2)`; the returned mapping must be released
    /// with [`PcmOps::munmap`] before the handle is dropped.
    unsafe fn mmap(
        &self,
        addr: *mut c_void,
        length: usize,
        prot: c_int,
        flags: c_int,
        offset: libc::off_t,
    ) -> Result<*mut c_void>;

    /// Release a mapping previously returned by [`PcmOps::mmap`]
    ///
    /// # Safety
    ///
    /// `addr`/`length` must describe exactly one live mapping.
    unsafe fn munmap(&self, addr: *mut c_void, length: usize) -> Result<()>;

    /// Wait for readiness on the caller-supplied descriptor set
    ///
    /// Returns the number of ready descriptors. A bounded wait is the
    /// caller's job: pass a timeout in milliseconds, or a negative value to
    /// block indefinitely.
    fn poll(&self, fds: &mut [libc::pollfd], timeout_ms: c_int) -> Result<usize>;
}

/// Issue an ioctl with a typed request/response argument
pub fn ioctl<O, T>(ops: &O, cmd: c_ulong, arg: &mut T) -> Result<c_int>
where
    O: PcmOps + ?Sized,
{
    unsafe { ops.ioctl_raw(cmd, (arg as *mut T).cast()) }
}

/// Issue an ioctl that carries no argument
pub fn ioctl_none<O>(ops: &O, cmd: c_ulong) -> Result<c_int>
where
    O: PcmOps + ?Sized,
{
    unsafe { ops.ioctl_raw(cmd, ptr::null_mut()) }
}

/// Mixer device operations
pub trait MixerOps {
    /// Forward one pointer-sized ioctl argument to the control device
    ///
    /// # Safety
    ///
    /// Same contract as [`PcmOps::ioctl_raw`].
    unsafe fn ioctl_raw(&self, cmd: c_ulong, arg: *mut c_void) -> Result<c_int>;

    /// Read one pending control event into `buf`
    fn read_event(&self, buf: &mut [u8]) -> Result<usize>;
}
