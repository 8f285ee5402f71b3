//! Hardware backend over kernel sound device nodes
//!
//! Talks directly to the `/dev/snd` character devices with descriptor-based
//! ioctl, mmap and poll. All calls are direct pass-throughs; blocking
//! behavior is fixed at open time by the captured flags.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::raw::{c_int, c_uint, c_ulong, c_void};
use std::sync::Arc;

use tracing::{debug, error};

use crate::backend::ops::{MixerOps, OpenFlags, PcmOps};
use crate::error::{Error, Result};
use crate::plugin::node::SndNode;

/// Build the PCM device node path for a card, device and direction
fn pcm_device_path(card: c_uint, device: c_uint, flags: OpenFlags) -> String {
    let direction = if flags.contains(OpenFlags::CAPTURE) {
        'c'
    } else {
        'p'
    };
    format!("/dev/snd/pcmC{}D{}{}", card, device, direction)
}

/// Build the mixer control node path for a card
fn mixer_device_path(card: c_uint) -> String {
    format!("/dev/snd/controlC{}", card)
}

/// Open a device node, always non-blocking first
///
/// Opening with `O_NONBLOCK` avoids blocking inside the open call itself
/// when every substream of the device is already claimed by another
/// process. The flag is cleared afterwards unless the caller asked for
/// non-blocking semantics; a failed clear closes the descriptor rather
/// than handing back one with the wrong mode.
fn open_device_node(path: &str, nonblock: bool) -> Result<OwnedFd> {
    let cpath = CString::new(path)
        .map_err(|_| Error::InvalidArgument(format!("device path contains NUL: {path:?}")))?;

    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        debug!("failed to open {}: {}", path, err);
        return Err(Error::DeviceUnavailable(format!("{path}: {err}")));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    if !nonblock {
        let fl = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
        if fl < 0
            || unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, fl & !libc::O_NONBLOCK) } < 0
        {
            // The descriptor is closed on this return; a blocking open must
            // not silently hand back a non-blocking descriptor.
            error!("failed to set blocking mode on {}", path);
            return Err(Error::DeviceUnavailable(format!(
                "{path}: cannot restore blocking mode"
            )));
        }
    }

    Ok(fd)
}

/// Hardware PCM device handle
///
/// Owns the descriptor to one `/dev/snd/pcmC*D*` node. Dropping the handle
/// releases the descriptor exactly once.
pub struct HwPcm {
    card: c_uint,
    device: c_uint,
    fd: OwnedFd,
    node: Option<Arc<SndNode>>,
}

impl HwPcm {
    /// Open the PCM node for `card`/`device`
    ///
    /// `node` is the resolved card definition for this device when one
    /// exists; the handle keeps it available for property queries by the
    /// owning engine.
    pub fn open(
        card: c_uint,
        device: c_uint,
        flags: OpenFlags,
        node: Option<Arc<SndNode>>,
    ) -> Result<Self> {
        let path = pcm_device_path(card, device, flags);
        let fd = open_device_node(&path, flags.contains(OpenFlags::NONBLOCK))?;

        Ok(Self {
            card,
            device,
            fd,
            node,
        })
    }

    /// Card number this handle was opened on
    pub fn card(&self) -> c_uint {
        self.card
    }

    /// Device number this handle was opened on
    pub fn device(&self) -> c_uint {
        self.device
    }

    /// Card definition node for this device, when one was resolved
    pub fn node(&self) -> Option<&SndNode> {
        self.node.as_deref()
    }
}

impl AsRawFd for HwPcm {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl PcmOps for HwPcm {
    unsafe fn ioctl_raw(&self, cmd: c_ulong, arg: *mut c_void) -> Result<c_int> {
        let rc = libc::ioctl(self.fd.as_raw_fd(), cmd as _, arg);
        if rc < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(rc)
    }

    unsafe fn mmap(
        &self,
        addr: *mut c_void,
        length: usize,
        prot: c_int,
        flags: c_int,
        offset: libc::off_t,
    ) -> Result<*mut c_void> {
        let mapping = libc::mmap(addr, length, prot, flags, self.fd.as_raw_fd(), offset);
        if mapping == libc::MAP_FAILED {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(mapping)
    }

    unsafe fn munmap(&self, addr: *mut c_void, length: usize) -> Result<()> {
        if libc::munmap(addr, length) < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn poll(&self, fds: &mut [libc::pollfd], timeout_ms: c_int) -> Result<usize> {
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(rc as usize)
    }
}

/// Hardware mixer handle over the card control node
pub struct HwMixer {
    card: c_uint,
    fd: OwnedFd,
}

impl HwMixer {
    /// Open the control node for `card`
    ///
    /// The control node is opened blocking; event reads block until the
    /// kernel queues a control change.
    pub fn open(card: c_uint) -> Result<Self> {
        let path = mixer_device_path(card);
        let cpath = CString::new(path.as_str())
            .map_err(|_| Error::InvalidArgument(format!("device path contains NUL: {path:?}")))?;

        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            debug!("failed to open {}: {}", path, err);
            return Err(Error::DeviceUnavailable(format!("{path}: {err}")));
        }

        Ok(Self {
            card,
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Card number this handle was opened on
    pub fn card(&self) -> c_uint {
        self.card
    }
}

impl AsRawFd for HwMixer {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl MixerOps for HwMixer {
    unsafe fn ioctl_raw(&self, cmd: c_ulong, arg: *mut c_void) -> Result<c_int> {
        let rc = libc::ioctl(self.fd.as_raw_fd(), cmd as _, arg);
        if rc < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(rc)
    }

    fn read_event(&self, buf: &mut [u8]) -> Result<usize> {
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::NamedTempFile;

    fn nonblock_flag(fd: RawFd) -> bool {
        let fl = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        assert!(fl >= 0);
        fl & libc::O_NONBLOCK != 0
    }

    #[test]
    fn test_device_path_patterns() {
        assert_eq!(
            pcm_device_path(0, 0, OpenFlags::empty()),
            "/dev/snd/pcmC0D0p"
        );
        assert_eq!(
            pcm_device_path(1, 3, OpenFlags::CAPTURE),
            "/dev/snd/pcmC1D3c"
        );
        assert_eq!(
            pcm_device_path(2, 7, OpenFlags::CAPTURE | OpenFlags::NONBLOCK),
            "/dev/snd/pcmC2D7c"
        );
        assert_eq!(mixer_device_path(0), "/dev/snd/controlC0");
        assert_eq!(mixer_device_path(12), "/dev/snd/controlC12");
    }

    #[test]
    fn test_blocking_open_clears_nonblock() {
        let file = NamedTempFile::new().unwrap();
        let fd = open_device_node(file.path().to_str().unwrap(), false).unwrap();
        assert!(!nonblock_flag(fd.as_raw_fd()));
    }

    #[test]
    fn test_nonblock_open_keeps_flag() {
        let file = NamedTempFile::new().unwrap();
        let fd = open_device_node(file.path().to_str().unwrap(), true).unwrap();
        assert!(nonblock_flag(fd.as_raw_fd()));
    }

    #[test]
    fn test_open_missing_node_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcmC9D9p");
        let result = open_device_node(path.to_str().unwrap(), false);
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }

    fn hw_pcm_over(file: &NamedTempFile) -> HwPcm {
        HwPcm {
            card: 0,
            device: 0,
            fd: open_device_node(file.path().to_str().unwrap(), true).unwrap(),
            node: None,
        }
    }

    #[test]
    fn test_ioctl_on_regular_file_fails() {
        let file = NamedTempFile::new().unwrap();
        let pcm = hw_pcm_over(&file);

        // Regular files reject ioctl; the error must surface, not panic.
        let result = unsafe { pcm.ioctl_raw(0, std::ptr::null_mut()) };
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_poll_reports_ready_descriptor() {
        let file = NamedTempFile::new().unwrap();
        let pcm = hw_pcm_over(&file);

        let mut pipe_fds = [0 as RawFd; 2];
        assert_eq!(unsafe { libc::pipe(pipe_fds.as_mut_ptr()) }, 0);
        assert_eq!(
            unsafe { libc::write(pipe_fds[1], b"x".as_ptr().cast(), 1) },
            1
        );

        let mut fds = [libc::pollfd {
            fd: pipe_fds[0],
            events: libc::POLLIN,
            revents: 0,
        }];
        let ready = pcm.poll(&mut fds, 1000).unwrap();
        assert_eq!(ready, 1);
        assert!(fds[0].revents & libc::POLLIN != 0);

        unsafe {
            libc::close(pipe_fds[0]);
            libc::close(pipe_fds[1]);
        }
    }

    #[test]
    fn test_mixer_event_read_on_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let mixer = HwMixer {
            card: 0,
            fd: open_device_node(file.path().to_str().unwrap(), true).unwrap(),
        };

        let mut buf = [0u8; 64];
        assert_eq!(mixer.read_event(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_real_pcm_if_present() {
        // Only meaningful on machines with a sound card; degrade quietly.
        if !Path::new("/dev/snd/pcmC0D0p").exists() {
            return;
        }

        if let Ok(pcm) = HwPcm::open(0, 0, OpenFlags::NONBLOCK, None) {
            assert!(pcm.as_raw_fd() >= 0);
            assert_eq!(pcm.card(), 0);
            assert_eq!(pcm.device(), 0);
            drop(pcm);
        }
    }
}
