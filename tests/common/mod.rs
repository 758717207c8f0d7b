//! Shared test doubles: a constant-output sensor and an inspectable
//! in-memory bus.
#![allow(dead_code)] // Not every test file uses every helper.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use vibrasense::errors::TransportError;
use vibrasense::hal::{Accelerometer, AxisReading, BusTransport, Direction};
use vibrasense::modbus::crc;

/// Calibration constant used by all test sensors (counts per g).
pub const TEST_SCALE_FACTOR: f32 = 256_000.0;

/// Sensor that always returns the same reading.
pub struct ConstantSensor {
    reading: [f32; 3],
}

impl ConstantSensor {
    pub fn new(reading: [f32; 3]) -> Self {
        Self { reading }
    }
}

impl Accelerometer for ConstantSensor {
    fn read(&mut self) -> AxisReading {
        AxisReading {
            x: self.reading[0],
            y: self.reading[1],
            z: self.reading[2],
            valid: true,
        }
    }

    fn scale_factor(&self) -> f32 {
        TEST_SCALE_FACTOR
    }

    fn name(&self) -> &'static str {
        "constant-test-sensor"
    }
}

#[derive(Default)]
struct BusInner {
    feed: VecDeque<u8>,
    sent: Vec<u8>,
    directions: Vec<Direction>,
}

/// Cloneable in-memory bus. One clone goes into the engine or pipeline;
/// the test keeps another to feed requests and inspect responses.
#[derive(Clone, Default)]
pub struct TestBus {
    inner: Arc<Mutex<BusInner>>,
}

impl TestBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue master bytes for the slave to receive.
    pub fn feed(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().feed.extend(bytes.iter().copied());
    }

    /// Everything the slave transmitted so far.
    pub fn sent(&self) -> Vec<u8> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.inner.lock().unwrap().sent.clear();
    }

    /// Direction transitions in the order they happened.
    pub fn directions(&self) -> Vec<Direction> {
        self.inner.lock().unwrap().directions.clone()
    }
}

impl BusTransport for TestBus {
    fn available(&mut self) -> usize {
        self.inner.lock().unwrap().feed.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.inner.lock().unwrap().feed.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inner.lock().unwrap().sent.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) {
        self.inner.lock().unwrap().directions.push(direction);
    }
}

/// Builds a valid request frame: payload + CRC, low byte first.
pub fn request(payload: &[u8]) -> Vec<u8> {
    let checksum = crc::crc16(payload);
    let mut frame = payload.to_vec();
    frame.push((checksum & 0xFF) as u8);
    frame.push((checksum >> 8) as u8);
    frame
}
