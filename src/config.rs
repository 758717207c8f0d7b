//! Compile-time configuration for the sampling pipeline and the field bus
//! link.
//!
//! Values mirror the deployed firmware: a 1 kHz accelerometer stream cut
//! into one-second windows, served over a 9600 baud RS-485 link.

/// Accelerometer sampling rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 1000;

/// Samples per window. One full buffer is one analytics window.
pub const WINDOW_SIZE: usize = 1000;

/// Interval between samples in microseconds.
pub const SAMPLING_INTERVAL_US: u64 = 1_000_000 / SAMPLE_RATE_HZ as u64;

/// Smoothing weight applied to the newest window in the running averages.
pub const EWMA_ALPHA: f32 = 0.1;

/// Running statistics are reported every this many windows.
pub const REPORT_EVERY_WINDOWS: u32 = 10;

/// Handoff queue capacity (power of two; one slot is reserved, so three
/// windows may be in flight between the processor and the analytics task).
pub const HANDOFF_CAPACITY: usize = 4;

/// Modbus slave address this device answers to.
pub const DEFAULT_SLAVE_ID: u8 = 2;

/// Serial bit rate of the field bus (8N1).
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Inter-frame silence threshold: 3.5 character times at 9600 baud.
pub const DEFAULT_T35_US: u64 = 1750;

/// Settling delay after toggling the transmit-enable line.
pub const DEFAULT_SETTLE_US: u64 = 10;

/// Register refresh cadence for the protocol task.
pub const REGISTER_REFRESH_MS: u64 = 100;

/// Device identification reported in holding register 0.
pub const DEVICE_ID: u16 = 0x1234;

/// Firmware version reported in holding register 1 (v1.00).
pub const FIRMWARE_VERSION: u16 = 100;
