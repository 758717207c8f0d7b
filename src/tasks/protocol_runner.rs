//! Protocol task: keeps the register map fresh and services the bus.
//!
//! Runs on a fixed short tick. Each register refresh takes whole-struct
//! copies of the analytics snapshot and the task counters, so the
//! engine never reaches into live pipeline state.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::hal::BusTransport;
use crate::modbus::ModbusSlave;
use crate::time::Clock;

use super::{PipelineConfig, Shared};

pub(crate) fn run<T: BusTransport, C: Clock + Clone>(
    transport: T,
    shared: Arc<Shared>,
    clock: C,
    config: PipelineConfig,
) {
    shared.status.protocol_running.store(true, Ordering::Release);
    log::info!(
        "protocol task started (slave id {}, T3.5 {} us)",
        config.link.slave_id,
        config.link.t35_us
    );

    let mut slave = ModbusSlave::new(transport, clock.clone(), config.link);
    let mut last_refresh: Option<Instant> = None;

    while shared.running.load(Ordering::Acquire) {
        shared.status.protocol_loops.fetch_add(1, Ordering::Relaxed);

        let refresh_due = match last_refresh {
            Some(at) => at.elapsed() >= config.register_refresh,
            None => true,
        };
        if refresh_due {
            let analytics = shared.snapshot.load();
            let status = shared.status.snapshot();
            slave.refresh_registers(analytics.as_ref(), &status);
            last_refresh = Some(Instant::now());
        }

        slave.poll();
        shared
            .status
            .last_protocol_ms
            .store(clock.now_millis() as u32, Ordering::Relaxed);

        thread::sleep(config.protocol_interval);
    }

    let stats = slave.stats();
    shared.status.protocol_running.store(false, Ordering::Release);
    log::info!("protocol task stopped ({stats})");
}
