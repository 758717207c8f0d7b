//! Cross-task health counters.
//!
//! Every pipeline task writes its own counters here; the protocol task
//! reads them when refreshing the status registers. All fields are
//! atomics so no lock is ever taken on this shared state. Timestamps are
//! truncated to 32-bit milliseconds, which wraps after ~49 days; the
//! age arithmetic below uses wrapping subtraction on purpose.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Shared task health state. One instance per pipeline.
#[derive(Debug, Default)]
pub struct TaskStatus {
    pub sampling_loops: AtomicU32,
    pub processing_loops: AtomicU32,
    pub analytics_loops: AtomicU32,
    pub protocol_loops: AtomicU32,

    pub sampling_errors: AtomicU32,
    pub processing_errors: AtomicU32,
    pub analytics_errors: AtomicU32,
    pub protocol_errors: AtomicU32,

    /// Samples lost to a full buffer or a missed lock deadline.
    pub missed_samples: AtomicU32,

    pub last_sample_ms: AtomicU32,
    pub last_processing_ms: AtomicU32,
    pub last_analytics_ms: AtomicU32,
    pub last_protocol_ms: AtomicU32,

    pub sampling_running: AtomicBool,
    pub processing_running: AtomicBool,
    pub analytics_running: AtomicBool,
    pub protocol_running: AtomicBool,

    /// Measured sample rate, stored as f32 bits.
    sample_rate_bits: AtomicU32,
}

impl TaskStatus {
    pub const fn new() -> Self {
        Self {
            sampling_loops: AtomicU32::new(0),
            processing_loops: AtomicU32::new(0),
            analytics_loops: AtomicU32::new(0),
            protocol_loops: AtomicU32::new(0),
            sampling_errors: AtomicU32::new(0),
            processing_errors: AtomicU32::new(0),
            analytics_errors: AtomicU32::new(0),
            protocol_errors: AtomicU32::new(0),
            missed_samples: AtomicU32::new(0),
            last_sample_ms: AtomicU32::new(0),
            last_processing_ms: AtomicU32::new(0),
            last_analytics_ms: AtomicU32::new(0),
            last_protocol_ms: AtomicU32::new(0),
            sampling_running: AtomicBool::new(false),
            processing_running: AtomicBool::new(false),
            analytics_running: AtomicBool::new(false),
            protocol_running: AtomicBool::new(false),
            sample_rate_bits: AtomicU32::new(0),
        }
    }

    pub fn set_sample_rate(&self, hz: f32) {
        self.sample_rate_bits.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate_bits.load(Ordering::Relaxed))
    }

    /// Point-in-time copy for register refresh and reporting.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            sampling_running: self.sampling_running.load(Ordering::Relaxed),
            processing_running: self.processing_running.load(Ordering::Relaxed),
            analytics_running: self.analytics_running.load(Ordering::Relaxed),
            protocol_running: self.protocol_running.load(Ordering::Relaxed),
            sampling_errors: self.sampling_errors.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            analytics_errors: self.analytics_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            missed_samples: self.missed_samples.load(Ordering::Relaxed),
            sample_rate: self.sample_rate(),
        }
    }
}

/// Copyable view of [`TaskStatus`] taken at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSnapshot {
    pub sampling_running: bool,
    pub processing_running: bool,
    pub analytics_running: bool,
    pub protocol_running: bool,
    pub sampling_errors: u32,
    pub processing_errors: u32,
    pub analytics_errors: u32,
    pub protocol_errors: u32,
    pub missed_samples: u32,
    pub sample_rate: f32,
}

impl StatusSnapshot {
    /// Task-running bit-field as exposed in the status register:
    /// bit 0 sampler, bit 1 processor, bit 2 analytics, bit 3 protocol.
    pub fn running_flags(&self) -> u16 {
        let mut flags = 0;
        if self.sampling_running {
            flags |= 0x0001;
        }
        if self.processing_running {
            flags |= 0x0002;
        }
        if self.analytics_running {
            flags |= 0x0004;
        }
        if self.protocol_running {
            flags |= 0x0008;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let status = TaskStatus::new();
        status.sampling_errors.fetch_add(3, Ordering::Relaxed);
        status.missed_samples.fetch_add(7, Ordering::Relaxed);
        status.set_sample_rate(999.5);

        let snap = status.snapshot();
        assert_eq!(snap.sampling_errors, 3);
        assert_eq!(snap.missed_samples, 7);
        assert_eq!(snap.sample_rate, 999.5);
    }

    #[test]
    fn running_flags_bit_field() {
        let status = TaskStatus::new();
        status.sampling_running.store(true, Ordering::Relaxed);
        status.analytics_running.store(true, Ordering::Relaxed);
        assert_eq!(status.snapshot().running_flags(), 0b0101);

        status.processing_running.store(true, Ordering::Relaxed);
        status.protocol_running.store(true, Ordering::Relaxed);
        assert_eq!(status.snapshot().running_flags(), 0b1111);
    }
}
