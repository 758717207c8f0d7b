//! Processing task: turns a full buffer into window statistics.
//!
//! Wakes on the buffer-ready signal, computes the statistics under the
//! buffer mutex, hands them off without blocking and resets the buffer.
//! The reset happens even when the handoff is dropped: losing a window
//! of analytics is preferable to stalling the sampler.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::lock_with_timeout;
use crate::time::Clock;

use super::{PipelineConfig, Shared};

/// Wait slice so the loop periodically observes the running flag.
const WAIT_SLICE: Duration = Duration::from_millis(100);

pub(crate) fn run<C: Clock>(shared: Arc<Shared>, clock: C, config: PipelineConfig) {
    shared.status.processing_running.store(true, Ordering::Release);
    log::info!("processor task started");

    while shared.running.load(Ordering::Acquire) {
        shared.status.processing_loops.fetch_add(1, Ordering::Relaxed);

        if !shared.window_ready.wait_timeout(WAIT_SLICE) {
            continue;
        }

        match lock_with_timeout(&shared.buffer, config.processor_lock_timeout) {
            Some(mut buffer) => {
                if buffer.is_full() {
                    let stats = buffer.stats();
                    let window_span_us =
                        clock.now_micros().saturating_sub(buffer.window_start_us());

                    if !shared.handoff.send(stats) {
                        shared
                            .status
                            .processing_errors
                            .fetch_add(1, Ordering::Relaxed);
                        log::warn!("window statistics dropped: analytics queue full");
                    }

                    buffer.reset(clock.now_micros());
                    shared
                        .status
                        .last_processing_ms
                        .store(clock.now_millis() as u32, Ordering::Relaxed);

                    log::debug!(
                        "window closed: {} samples over {} us (cycle {} us)",
                        stats.sample_count,
                        stats.duration_us,
                        window_span_us
                    );
                }
            }
            None => {
                shared
                    .status
                    .processing_errors
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!("processor missed the buffer lock deadline");
            }
        }
    }

    shared.status.processing_running.store(false, Ordering::Release);
    log::info!("processor task stopped");
}
