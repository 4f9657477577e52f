//! Error types for the capture engine.
//!
//! Hot-path parsing never produces these: malformed frames are simply
//! dropped as `None`. Errors surface where the main loop needs to count a
//! drop or retry later.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Frame too short or carrying a bad signature
    #[error("malformed frame")]
    Malformed,

    /// A bounded store or slot is full
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// Storage backend refused a read or write
    #[error("storage unavailable")]
    StorageUnavailable,

    /// Free heap is below the configured guard
    #[error("free memory below guard")]
    OutOfMemory,

    /// Export needs an SSID and none is known yet
    #[error("ssid unknown")]
    MissingSsid,

    /// A fixed-size text or frame buffer overflowed
    #[error("buffer overflow")]
    Overflow,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::Overflow
    }
}
