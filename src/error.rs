//! Error types for the device node layer

use std::io;
use std::os::raw::c_int;

use thiserror::Error;

/// Main error type for backend and loader operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("allocation failed")]
    ResourceExhausted,

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("card module ABI mismatch: {0}")]
    AbiMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Map a negative errno-style code returned across the card module ABI
    pub(crate) fn from_abi_code(code: c_int, context: &str) -> Error {
        match -code {
            libc::ENOENT => Error::NotFound(context.to_string()),
            libc::EINVAL => Error::InvalidArgument(context.to_string()),
            libc::ENOMEM => Error::ResourceExhausted,
            libc::ENODEV => Error::DeviceUnavailable(context.to_string()),
            _ => Error::Io(io::Error::from_raw_os_error(-code)),
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
