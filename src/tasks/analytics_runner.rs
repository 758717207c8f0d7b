//! Analytics task: folds handed-off window statistics into the engine
//! and publishes snapshots for the protocol side.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::AnalyticsEngine;
use crate::time::Clock;

use super::{PipelineConfig, Shared};

const WAIT_SLICE: Duration = Duration::from_millis(100);

pub(crate) fn run<C: Clock>(
    shared: Arc<Shared>,
    clock: C,
    config: PipelineConfig,
    scale_factor: f32,
) {
    shared.status.analytics_running.store(true, Ordering::Release);
    log::info!("analytics task started (scale factor {scale_factor})");

    let mut engine = AnalyticsEngine::new();

    while shared.running.load(Ordering::Acquire) {
        shared.status.analytics_loops.fetch_add(1, Ordering::Relaxed);

        let Some(stats) = shared.handoff.recv_timeout(WAIT_SLICE) else {
            continue;
        };

        engine.process_window(&stats, scale_factor, clock.now_millis());
        shared.snapshot.publish(engine.snapshot());
        shared
            .status
            .last_analytics_ms
            .store(clock.now_millis() as u32, Ordering::Relaxed);

        if engine.window_count() % config.report_every == 0 {
            let data = engine.snapshot();
            log::info!(
                "window {}: running avg [{:.4} {:.4} {:.4}] g, \
                 global max [{:.4} {:.4} {:.4}] g",
                data.window_count,
                data.running_avg[0],
                data.running_avg[1],
                data.running_avg[2],
                data.global_max[0],
                data.global_max[1],
                data.global_max[2],
            );
        }
    }

    shared.status.analytics_running.store(false, Ordering::Release);
    log::info!("analytics task stopped");
}
