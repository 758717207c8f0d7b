//! End-to-end pipeline runs over mock collaborators.
//!
//! Windows are shortened by raising the sample rate well above the
//! nominal 1 kHz so a full fill-process-analyze cycle completes in tens
//! of milliseconds of wall clock.

mod common;

use std::time::{Duration, Instant};

use common::{request, ConstantSensor, TestBus};
use vibrasense::modbus::crc;
use vibrasense::tasks::{Pipeline, PipelineConfig};
use vibrasense::time::SystemClock;

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        sample_interval: Duration::from_micros(50),
        ..PipelineConfig::default()
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let limit = Instant::now() + deadline;
    while Instant::now() < limit {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn pipeline_produces_analytics_from_sensor_data() {
    let sensor = ConstantSensor::new([0.1, 0.2, 1.0]);
    let bus = TestBus::new();
    let pipeline = Pipeline::start(sensor, bus, SystemClock::new(), fast_config())
        .expect("pipeline start");

    assert!(
        wait_until(Duration::from_secs(20), || pipeline.analytics().is_some()),
        "no analytics window within the deadline"
    );

    let data = pipeline.analytics().expect("snapshot");
    assert!(data.valid);
    assert!(data.window_count >= 1);

    // A constant signal: averages land on the configured values and the
    // per-axis spread collapses.
    assert!((data.current_avg[0] - 0.1).abs() < 1e-3);
    assert!((data.current_avg[1] - 0.2).abs() < 1e-3);
    assert!((data.current_avg[2] - 1.0).abs() < 1e-3);
    assert!(data.current_std[0] < 1e-3);
    assert!(data.current_min[2] <= data.current_avg[2]);
    assert!(data.current_avg[2] <= data.current_max[2]);

    let status = pipeline.status();
    assert!(status.sampling_running);
    assert!(status.processing_running);
    assert!(status.analytics_running);
    assert!(status.protocol_running);

    pipeline.shutdown();
}

#[test]
fn bus_requests_are_served_while_the_pipeline_runs() {
    let sensor = ConstantSensor::new([0.0, 0.0, 1.0]);
    let bus = TestBus::new();
    let pipeline = Pipeline::start(sensor, bus.clone(), SystemClock::new(), fast_config())
        .expect("pipeline start");

    // Read the three identity registers.
    bus.feed(&request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x03]));

    assert!(
        wait_until(Duration::from_secs(5), || !bus.sent().is_empty()),
        "no response from the protocol task"
    );

    let sent = bus.sent();
    assert_eq!(sent[0], 0x02);
    assert_eq!(sent[1], 0x03);
    assert_eq!(sent[2], 6);
    assert_eq!(u16::from_be_bytes([sent[3], sent[4]]), 0x1234);
    assert!(crc::frame_crc_ok(&sent));

    pipeline.shutdown();
}

#[test]
fn overdriven_sampler_counts_missed_samples_monotonically() {
    let sensor = ConstantSensor::new([0.0, 0.0, 1.0]);
    let bus = TestBus::new();
    // Free-running sampler: fills windows far faster than the processor
    // cycle, so full-buffer ticks are inevitable.
    let config = PipelineConfig {
        sample_interval: Duration::ZERO,
        ..PipelineConfig::default()
    };
    let pipeline =
        Pipeline::start(sensor, bus, SystemClock::new(), config).expect("pipeline start");

    assert!(
        wait_until(Duration::from_secs(20), || {
            pipeline.status().missed_samples > 0
        }),
        "sampler never observed a full buffer"
    );

    let first = pipeline.status().missed_samples;
    std::thread::sleep(Duration::from_millis(100));
    let second = pipeline.status().missed_samples;
    assert!(second >= first);

    pipeline.shutdown();
}
