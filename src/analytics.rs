//! Long-running analytics over completed sample windows.
//!
//! Each window's raw statistics are converted to physical units, enriched
//! with a derived standard deviation, and folded into exponentially
//! weighted running averages plus lifetime extrema. The engine is owned
//! and mutated by exactly one task; everyone else sees point-in-time
//! copies of [`AnalyticsData`].

use libm::sqrtf;

use crate::buffer::WindowStats;
use crate::config::EWMA_ALPHA;

/// Complete analytics state in physical units (g).
///
/// `Copy` on purpose: the protocol side takes whole-struct snapshots, so
/// there is no window in which a reader can observe a half-updated
/// record. Axis order in every array is X, Y, Z.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalyticsData {
    /// Most recently completed window.
    pub current_avg: [f32; 3],
    pub current_max: [f32; 3],
    pub current_min: [f32; 3],
    pub current_std: [f32; 3],
    pub current_rms: [f32; 3],

    /// Exponentially weighted running statistics.
    pub running_avg: [f32; 3],
    pub running_std: [f32; 3],
    pub running_rms: [f32; 3],

    /// Lifetime extrema; never shrink while the process runs.
    pub global_max: [f32; 3],
    pub global_min: [f32; 3],

    /// Number of windows folded in so far.
    pub window_count: u32,
    /// Clock millis of the latest update.
    pub last_update_ms: u64,
    /// False until the first window has been processed.
    pub valid: bool,
}

/// Folds window statistics into the running analytics state.
pub struct AnalyticsEngine {
    data: AnalyticsData,
}

impl AnalyticsEngine {
    pub const fn new() -> Self {
        Self {
            data: AnalyticsData {
                current_avg: [0.0; 3],
                current_max: [0.0; 3],
                current_min: [0.0; 3],
                current_std: [0.0; 3],
                current_rms: [0.0; 3],
                running_avg: [0.0; 3],
                running_std: [0.0; 3],
                running_rms: [0.0; 3],
                global_max: [0.0; 3],
                global_min: [0.0; 3],
                window_count: 0,
                last_update_ms: 0,
                valid: false,
            },
        }
    }

    /// Processes one completed window.
    ///
    /// `scale_factor` is the sensor's calibration constant (counts per g)
    /// and is applied as-is; the engine does not second-guess it. The
    /// first window seeds the running statistics directly, later windows
    /// blend in with weight [`EWMA_ALPHA`] and extend the lifetime
    /// extrema monotonically.
    pub fn process_window(&mut self, stats: &WindowStats, scale_factor: f32, now_ms: u64) {
        let d = &mut self.data;

        for axis in 0..3 {
            d.current_avg[axis] = stats.avg[axis] / scale_factor;
            d.current_max[axis] = stats.max[axis] / scale_factor;
            d.current_min[axis] = stats.min[axis] / scale_factor;
            d.current_rms[axis] = stats.rms[axis] / scale_factor;

            // std = sqrt(rms^2 - avg^2), clamped at zero: when the signal
            // is nearly constant the subtraction can go slightly negative
            // through floating-point cancellation.
            let variance =
                d.current_rms[axis] * d.current_rms[axis] - d.current_avg[axis] * d.current_avg[axis];
            d.current_std[axis] = sqrtf(variance.max(0.0));
        }

        if d.window_count == 0 {
            d.running_avg = d.current_avg;
            d.running_std = d.current_std;
            d.running_rms = d.current_rms;
            d.global_max = d.current_max;
            d.global_min = d.current_min;
        } else {
            for axis in 0..3 {
                d.running_avg[axis] = blend(d.current_avg[axis], d.running_avg[axis]);
                d.running_std[axis] = blend(d.current_std[axis], d.running_std[axis]);
                d.running_rms[axis] = blend(d.current_rms[axis], d.running_rms[axis]);

                if d.current_max[axis] > d.global_max[axis] {
                    d.global_max[axis] = d.current_max[axis];
                }
                if d.current_min[axis] < d.global_min[axis] {
                    d.global_min[axis] = d.current_min[axis];
                }
            }
        }

        d.window_count = d.window_count.wrapping_add(1);
        d.last_update_ms = now_ms;
        d.valid = true;
    }

    /// Zeroes running and global state. Normal operation never calls
    /// this; it exists for explicit re-initialization only.
    pub fn reset_running(&mut self) {
        self.data = AnalyticsData::default();
    }

    /// Point-in-time copy of the full analytics state.
    pub fn snapshot(&self) -> AnalyticsData {
        self.data
    }

    pub fn window_count(&self) -> u32 {
        self.data.window_count
    }
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn blend(current: f32, running: f32) -> f32 {
    EWMA_ALPHA * current + (1.0 - EWMA_ALPHA) * running
}
