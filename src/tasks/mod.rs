//! Pipeline orchestration: four cooperating tasks over shared context.
//!
//! | Task      | Cadence            | Blocks on           |
//! |-----------|--------------------|---------------------|
//! | sampler   | fixed 1 kHz tick   | nothing (timed)     |
//! | processor | event-triggered    | buffer-ready signal |
//! | analytics | event-triggered    | handoff channel     |
//! | protocol  | fixed ~100 Hz tick | nothing (timed)     |
//!
//! On the reference target these run as priority-preemptive RTOS tasks,
//! the sampler alone on one core (highest priority) and the other three
//! sharing the second core. This layer maps them onto named OS threads
//! and keeps the same blocking structure, so the lossy handoff behavior
//! is identical even though the host scheduler is fairer than the
//! target's.
//!
//! All shared state travels in one explicitly constructed [`Shared`]
//! context handed to each task at spawn; nothing is reachable through
//! globals.

mod analytics_runner;
mod processor;
mod protocol_runner;
mod sampler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use crate::analytics::AnalyticsData;
use crate::buffer::{SampleBuffer, WindowStats};
use crate::config::{HANDOFF_CAPACITY, REGISTER_REFRESH_MS, REPORT_EVERY_WINDOWS, WINDOW_SIZE};
use crate::errors::StartError;
use crate::hal::{Accelerometer, BusTransport};
use crate::modbus::LinkConfig;
use crate::status::{StatusSnapshot, TaskStatus};
use crate::sync::{HandoffChannel, SnapshotCell, WindowSignal};
use crate::time::Clock;

/// Thread stack sizes, generous compared to the RTOS originals since
/// host libc frames are fatter.
const STACK_SAMPLER: usize = 64 * 1024;
const STACK_PROCESSOR: usize = 64 * 1024;
const STACK_ANALYTICS: usize = 64 * 1024;
const STACK_PROTOCOL: usize = 64 * 1024;

/// Tuning knobs for the four task loops.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Sampler tick period (1 ms for the nominal 1 kHz stream).
    pub sample_interval: Duration,
    /// Buffer lock deadline inside the sampler tick. Short: sampling
    /// must never stall past its tick.
    pub sampler_lock_timeout: Duration,
    /// Buffer lock deadline in the processor. Long: the sampler holds
    /// the lock only briefly.
    pub processor_lock_timeout: Duration,
    /// Protocol task tick period.
    pub protocol_interval: Duration,
    /// Register refresh cadence.
    pub register_refresh: Duration,
    /// Running statistics are logged every this many windows.
    pub report_every: u32,
    /// Link-level protocol configuration.
    pub link: LinkConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(1),
            sampler_lock_timeout: Duration::from_millis(1),
            processor_lock_timeout: Duration::from_millis(100),
            protocol_interval: Duration::from_millis(10),
            register_refresh: Duration::from_millis(REGISTER_REFRESH_MS),
            report_every: REPORT_EVERY_WINDOWS,
            link: LinkConfig::default(),
        }
    }
}

/// Shared context handed to every task.
pub(crate) struct Shared {
    /// The window under construction. The only mutex in the system.
    pub buffer: Mutex<SampleBuffer<WINDOW_SIZE>>,
    /// Sampler -> processor buffer-full notification.
    pub window_ready: WindowSignal,
    /// Processor -> analytics statistics handoff, depth 3, lossy.
    pub handoff: HandoffChannel<WindowStats, HANDOFF_CAPACITY>,
    /// Latest analytics state, published by copy.
    pub snapshot: SnapshotCell<AnalyticsData>,
    /// Cross-task health counters.
    pub status: TaskStatus,
    /// Cleared once to stop every loop.
    pub running: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(SampleBuffer::new()),
            window_ready: WindowSignal::new(),
            handoff: HandoffChannel::new(),
            snapshot: SnapshotCell::new(),
            status: TaskStatus::new(),
            running: AtomicBool::new(true),
        }
    }
}

/// Handle to a started pipeline.
///
/// Owns the four task threads. [`shutdown`](Self::shutdown) is the only
/// way the tasks end; dropping the handle without it leaves them
/// running until process exit, which is the embedded behavior anyway.
pub struct Pipeline {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts all four tasks over the supplied collaborators.
    ///
    /// Fails only when a thread cannot be spawned; that is a bootstrap
    /// failure and the caller is expected to halt, not retry.
    pub fn start<S, T, C>(
        sensor: S,
        transport: T,
        clock: C,
        config: PipelineConfig,
    ) -> Result<Self, StartError>
    where
        S: Accelerometer + 'static,
        T: BusTransport + 'static,
        C: Clock + Clone + 'static,
    {
        let shared = Arc::new(Shared::new());
        let scale_factor = sensor.scale_factor();
        let mut handles = Vec::with_capacity(4);

        let spawn_result: Result<(), StartError> = (|| {
            let ctx = Arc::clone(&shared);
            let task_clock = clock.clone();
            handles.push(
                Builder::new()
                    .name("sampler".into())
                    .stack_size(STACK_SAMPLER)
                    .spawn(move || sampler::run(sensor, ctx, task_clock, config))
                    .map_err(|source| StartError::Spawn {
                        task: "sampler",
                        source,
                    })?,
            );

            let ctx = Arc::clone(&shared);
            let task_clock = clock.clone();
            handles.push(
                Builder::new()
                    .name("processor".into())
                    .stack_size(STACK_PROCESSOR)
                    .spawn(move || processor::run(ctx, task_clock, config))
                    .map_err(|source| StartError::Spawn {
                        task: "processor",
                        source,
                    })?,
            );

            let ctx = Arc::clone(&shared);
            let task_clock = clock.clone();
            handles.push(
                Builder::new()
                    .name("analytics".into())
                    .stack_size(STACK_ANALYTICS)
                    .spawn(move || analytics_runner::run(ctx, task_clock, config, scale_factor))
                    .map_err(|source| StartError::Spawn {
                        task: "analytics",
                        source,
                    })?,
            );

            let ctx = Arc::clone(&shared);
            handles.push(
                Builder::new()
                    .name("protocol".into())
                    .stack_size(STACK_PROTOCOL)
                    .spawn(move || protocol_runner::run(transport, ctx, clock, config))
                    .map_err(|source| StartError::Spawn {
                        task: "protocol",
                        source,
                    })?,
            );
            Ok(())
        })();

        if let Err(error) = spawn_result {
            // Partial start is a known-bad state: stop whatever came up
            // before reporting the failure.
            shared.running.store(false, Ordering::Release);
            for handle in handles {
                let _ = handle.join();
            }
            return Err(error);
        }

        log::info!("pipeline started: 4 tasks running");
        Ok(Self { shared, handles })
    }

    /// Current task health counters.
    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.snapshot()
    }

    /// Latest analytics snapshot, if any window completed yet.
    pub fn analytics(&self) -> Option<AnalyticsData> {
        self.shared.snapshot.load()
    }

    /// Windows dropped at the processor -> analytics handoff.
    pub fn dropped_windows(&self) -> u32 {
        self.shared.handoff.dropped()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stops every task and joins it.
    ///
    /// Whole-process, non-resumable: a new pipeline requires fresh
    /// construction of all shared state.
    pub fn shutdown(mut self) {
        self.shared.running.store(false, Ordering::Release);
        // Kick the event-blocked tasks so they observe the flag now
        // instead of at their next wait timeout.
        self.shared.window_ready.notify();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("pipeline task panicked before shutdown");
            }
        }
        log::info!("pipeline stopped");
    }
}
