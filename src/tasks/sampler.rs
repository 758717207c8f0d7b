//! Sampling task: one sensor reading per tick into the window buffer.
//!
//! The fixed-rate contract wins every conflict here. The task never
//! waits longer than its short lock deadline, never retries within a
//! tick, and never blocks on downstream consumers; whatever cannot be
//! stored in time is counted as missed and abandoned.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::hal::Accelerometer;
use crate::sync::lock_with_timeout;
use crate::time::Clock;

use super::{PipelineConfig, Shared};

pub(crate) fn run<S: Accelerometer, C: Clock>(
    mut sensor: S,
    shared: Arc<Shared>,
    clock: C,
    config: PipelineConfig,
) {
    shared.status.sampling_running.store(true, Ordering::Release);
    log::info!("sampler task started ({})", sensor.name());

    let scale_factor = sensor.scale_factor();
    let started = Instant::now();
    let mut next_tick = Instant::now();
    let mut samples_taken: u32 = 0;

    while shared.running.load(Ordering::Acquire) {
        shared.status.sampling_loops.fetch_add(1, Ordering::Relaxed);

        match lock_with_timeout(&shared.buffer, config.sampler_lock_timeout) {
            Some(mut buffer) => {
                if buffer.is_full() {
                    // Previous window not yet processed; this tick's
                    // sample is lost by design.
                    shared.status.missed_samples.fetch_add(1, Ordering::Relaxed);
                } else {
                    let reading = sensor.read();
                    if reading.valid {
                        let x = (reading.x * scale_factor) as i32;
                        let y = (reading.y * scale_factor) as i32;
                        let z = (reading.z * scale_factor) as i32;

                        if buffer.push(x, y, z, clock.now_micros()) {
                            samples_taken = samples_taken.wrapping_add(1);
                            shared
                                .status
                                .last_sample_ms
                                .store(clock.now_millis() as u32, Ordering::Relaxed);

                            if buffer.is_full() {
                                shared.window_ready.notify();
                            }
                        } else {
                            shared.status.sampling_errors.fetch_add(1, Ordering::Relaxed);
                        }
                    } else {
                        shared.status.sampling_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            None => {
                // Lock deadline missed; skip this tick entirely.
                shared.status.missed_samples.fetch_add(1, Ordering::Relaxed);
            }
        }

        if samples_taken > 0 && samples_taken % 1000 == 0 {
            let elapsed_ms = started.elapsed().as_millis() as u32;
            if elapsed_ms > 0 {
                shared
                    .status
                    .set_sample_rate(samples_taken as f32 * 1000.0 / elapsed_ms as f32);
            }
        }

        // Absolute-deadline pacing; a late tick shortens the next sleep
        // instead of shifting the whole schedule.
        next_tick += config.sample_interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    shared.status.sampling_running.store(false, Ordering::Release);
    log::info!("sampler task stopped");
}
