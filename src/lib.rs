//! Accelerometer telemetry pipeline with a Modbus RTU slave interface.
//!
//! VibraSense continuously samples a 3-axis accelerometer at 1 kHz,
//! reduces the stream into per-second window statistics and long-running
//! analytics, and serves the results to a bus master over a half-duplex
//! Modbus RTU link. Built for dual-core embedded targets with fixed,
//! statically sized memory: `heapless` buffers, `libm` math, no heap in
//! the hot path.
//!
//! The crate core (`buffer`, `analytics`, `modbus`, `queue`) is
//! `no_std`-capable; the task orchestration layer (`tasks`, `sync`)
//! needs the `std` feature, which is on by default. Hardware access
//! goes through the collaborator traits in [`hal`] and [`time`], so the
//! whole pipeline runs against mocks on a host.
//!
//! ```
//! use vibrasense::{AnalyticsEngine, WindowStats};
//!
//! let mut engine = AnalyticsEngine::new();
//! let stats = WindowStats::default();
//! engine.process_window(&stats, 256_000.0, 0);
//! assert_eq!(engine.snapshot().window_count, 1);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

// Optional logging, compiled out entirely without the `log` feature.
#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{}};
}

pub mod analytics;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod hal;
pub mod modbus;
pub mod queue;
pub mod status;
pub mod time;

#[cfg(feature = "std")]
pub mod sync;
#[cfg(feature = "std")]
pub mod tasks;

// Public API
pub use analytics::{AnalyticsData, AnalyticsEngine};
pub use buffer::{Sample, SampleBuffer, WindowStats};
pub use errors::TransportError;
pub use hal::{Accelerometer, AxisReading, BusTransport, Direction};
pub use modbus::{ExceptionCode, LinkConfig, LinkStats, ModbusSlave};
pub use status::{StatusSnapshot, TaskStatus};
pub use time::Clock;

#[cfg(feature = "std")]
pub use errors::StartError;
#[cfg(feature = "std")]
pub use tasks::{Pipeline, PipelineConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
