//! Error types, kept small and `Copy` for use on the hot paths.
//!
//! Runtime failures in the pipeline are recorded as counters and never
//! unwind across task boundaries; the types here cover the two places
//! where a checked result genuinely crosses an interface: the bus
//! transport collaborator and one-time pipeline startup.

use thiserror_no_std::Error;

/// Failure reported by the serial transport collaborator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The transport rejected or truncated an outgoing write.
    #[error("transport write failed")]
    WriteFailed,

    /// The transport could not drain its transmit buffer.
    #[error("transport flush failed")]
    FlushFailed,
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransportError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::WriteFailed => defmt::write!(fmt, "transport write failed"),
            Self::FlushFailed => defmt::write!(fmt, "transport flush failed"),
        }
    }
}

/// Fatal error during one-time pipeline startup.
///
/// Anything that fails here leaves the system in a known-bad state, so
/// the caller is expected to halt rather than continue degraded.
#[cfg(feature = "std")]
#[derive(Error, Debug)]
pub enum StartError {
    /// A task thread could not be spawned.
    #[error("failed to spawn {task} task: {source}")]
    Spawn {
        /// Name of the task that failed to start.
        task: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },
}
