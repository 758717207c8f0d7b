//! Modbus RTU Slave Engine
//!
//! ## Overview
//!
//! A byte-oriented frame state machine implementing the slave side of a
//! half-duplex Modbus RTU link. Incoming bytes accumulate until the
//! inter-frame silence threshold (3.5 character times) declares the
//! frame complete; the frame is then validated (length, address, CRC)
//! and dispatched against the register map. Responses and exception
//! frames go out under explicit transmit-enable control.
//!
//! Only the function codes a telemetry master actually uses are
//! implemented:
//!
//! | Code | Function |
//! |------|----------|
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x06 | Write Single Register |
//! | 0x10 | Write Multiple Registers |
//!
//! Anything else earns an *illegal function* exception. Frames addressed
//! to another slave are dropped without a response, as the bus demands.
//!
//! ## State machine
//!
//! ```text
//! Idle --first byte--> Receiving --T3.5 silence--> Processing --> Idle
//!         ^                |  each byte restarts the silence timer
//!         +----------------+  (undersized frames are discarded)
//! ```
//!
//! The nominal "Responding" state is folded into Processing: the
//! transmit happens synchronously inside dispatch, and no received byte
//! is examined until it finishes.
//!
//! ## Concurrency
//!
//! The engine is single-threaded by design. It is owned by the protocol
//! task, which alternates between [`ModbusSlave::refresh_registers`] and
//! [`ModbusSlave::poll`]; nothing here is shared, so nothing here locks.

pub mod crc;
pub mod registers;

use crate::config::{DEFAULT_SETTLE_US, DEFAULT_SLAVE_ID, DEFAULT_T35_US};
use crate::analytics::AnalyticsData;
use crate::hal::{BusTransport, Direction};
use crate::status::StatusSnapshot;
use crate::time::Clock;

use registers::{RegisterBank, NUM_HOLDING_REGISTERS, NUM_INPUT_REGISTERS};

/// Largest frame the engine will accumulate or emit.
pub const MAX_FRAME_SIZE: usize = 256;
/// Smallest dispatchable frame: address + function + CRC.
pub const MIN_FRAME_SIZE: usize = 4;
/// Register quantity ceiling for the read functions.
pub const MAX_READ_QUANTITY: usize = 125;
/// Register quantity ceiling for Write Multiple Registers.
pub const MAX_WRITE_QUANTITY: usize = 123;

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Frame buffer sized for one maximal RTU frame.
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// Modbus exception codes used by this slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ExceptionCode {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "exception 0x{:02x}", *self as u8);
    }
}

/// Receive state of the frame assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    Receiving,
    Processing,
}

/// Link statistics. Monotonic counters, reset only on explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkStats {
    /// Complete frames seen after the silence gap.
    pub frames_received: u32,
    /// Frames that passed address and CRC validation.
    pub frames_processed: u32,
    /// Requests answered with a normal response.
    pub valid_requests: u32,
    /// Frames discarded before dispatch (bad length, address, CRC).
    pub invalid_requests: u32,
    /// Frames whose trailing checksum did not match.
    pub crc_errors: u32,
    /// Receive overruns (frame grew past the buffer without silence).
    pub timeout_errors: u32,
    /// Exception frames sent.
    pub exception_responses: u32,
    /// Frames put on the wire, exceptions included.
    pub successful_responses: u32,
    /// Responses the transport refused to send.
    pub write_errors: u32,
    /// Clock millis of the last validated request.
    pub last_request_ms: u64,
    /// Clock millis of the last transmitted response.
    pub last_response_ms: u64,
}

impl core::fmt::Display for LinkStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "rx {} ok {} valid {} invalid {} crc {} timeout {} exc {} tx {}",
            self.frames_received,
            self.frames_processed,
            self.valid_requests,
            self.invalid_requests,
            self.crc_errors,
            self.timeout_errors,
            self.exception_responses,
            self.successful_responses,
        )
    }
}

/// Link-level configuration.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Slave address this engine answers to.
    pub slave_id: u8,
    /// Inter-frame silence threshold in microseconds.
    pub t35_us: u64,
    /// Settling delay around transmit-enable transitions.
    pub settle_us: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            slave_id: DEFAULT_SLAVE_ID,
            t35_us: DEFAULT_T35_US,
            settle_us: DEFAULT_SETTLE_US,
        }
    }
}

/// The slave protocol engine.
///
/// Owns its transport, clock handle and register bank. The task driving
/// it calls [`poll`](Self::poll) at a fixed cadence and
/// [`refresh_registers`](Self::refresh_registers) whenever a fresh
/// analytics snapshot should become visible on the bus.
pub struct ModbusSlave<T: BusTransport, C: Clock> {
    transport: T,
    clock: C,
    config: LinkConfig,
    state: SlaveState,
    rx: FrameBuf,
    last_byte_us: u64,
    registers: RegisterBank,
    stats: LinkStats,
}

impl<T: BusTransport, C: Clock> ModbusSlave<T, C> {
    pub fn new(transport: T, clock: C, config: LinkConfig) -> Self {
        let mut slave = Self {
            transport,
            clock,
            config,
            state: SlaveState::Idle,
            rx: FrameBuf::new(),
            last_byte_us: 0,
            registers: RegisterBank::new(),
            stats: LinkStats::default(),
        };
        slave.transport.set_direction(Direction::Receive);
        slave
    }

    /// Drains the transport and advances the frame state machine.
    ///
    /// Call at a cadence comfortably shorter than T3.5 or silence gaps
    /// will be detected late.
    pub fn poll(&mut self) {
        let now_us = self.clock.now_micros();

        while self.transport.available() > 0 {
            let Some(byte) = self.transport.read_byte() else {
                break;
            };

            if self.rx.is_full() {
                // Overrun: no silence gap for longer than a maximal
                // frame. Drop everything and resynchronize.
                self.rx.clear();
                self.state = SlaveState::Idle;
                self.stats.timeout_errors += 1;
                continue;
            }

            let _ = self.rx.push(byte);
            self.last_byte_us = now_us;
            self.state = SlaveState::Receiving;
        }

        if self.state == SlaveState::Receiving
            && now_us.saturating_sub(self.last_byte_us) > self.config.t35_us
        {
            if self.rx.len() >= MIN_FRAME_SIZE {
                self.stats.frames_received += 1;
                self.state = SlaveState::Processing;
                self.process_frame();
            } else {
                // Runt frame between silence gaps; not even worth a CRC
                // check.
                self.stats.invalid_requests += 1;
            }
            self.rx.clear();
            self.state = SlaveState::Idle;
        }
    }

    /// Copies an analytics snapshot and task counters into the register
    /// map. The caller owns the cadence.
    pub fn refresh_registers(
        &mut self,
        analytics: Option<&AnalyticsData>,
        status: &StatusSnapshot,
    ) {
        let now_ms = self.clock.now_millis();
        self.registers.refresh(analytics, status, now_ms);
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Clears the link counters. Operator action, never automatic.
    pub fn reset_stats(&mut self) {
        self.stats = LinkStats::default();
    }

    pub fn holding_register(&self, address: usize) -> Option<u16> {
        self.registers.holding(address)
    }

    pub fn input_register(&self, address: usize) -> Option<u16> {
        self.registers.input(address)
    }

    pub fn set_holding_register(&mut self, address: usize, value: u16) -> bool {
        self.registers.set_holding(address, value)
    }

    /// Releases the transport, e.g. to hand the UART back at shutdown.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn process_frame(&mut self) {
        let frame = self.rx.clone();

        // Not our address: stay silent, the addressed slave will answer.
        if frame[0] != self.config.slave_id {
            self.stats.invalid_requests += 1;
            return;
        }

        if !crc::frame_crc_ok(&frame) {
            self.stats.crc_errors += 1;
            self.stats.invalid_requests += 1;
            log_debug!("modbus: CRC mismatch on {} byte frame", frame.len());
            return;
        }

        self.stats.frames_processed += 1;
        self.stats.last_request_ms = self.clock.now_millis();

        match frame[1] {
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => self.handle_read(&frame),
            FC_WRITE_SINGLE_REGISTER => self.handle_write_single(&frame),
            FC_WRITE_MULTIPLE_REGISTERS => self.handle_write_multiple(&frame),
            function => {
                log_debug!("modbus: unsupported function 0x{:02x}", function);
                self.send_exception(function, ExceptionCode::IllegalFunction);
            }
        }
    }

    /// 0x03 / 0x04: fixed 8-byte request, response carries the register
    /// values as big-endian pairs.
    fn handle_read(&mut self, frame: &[u8]) {
        let function = frame[1];
        if frame.len() != 8 {
            return self.send_exception(function, ExceptionCode::IllegalDataValue);
        }

        let start = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        let quantity = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        let bank_size = if function == FC_READ_HOLDING_REGISTERS {
            NUM_HOLDING_REGISTERS
        } else {
            NUM_INPUT_REGISTERS
        };

        if quantity == 0 || quantity > MAX_READ_QUANTITY || start + quantity > bank_size {
            return self.send_exception(function, ExceptionCode::IllegalDataAddress);
        }

        let mut body = [0u8; 3 + 2 * MAX_READ_QUANTITY];
        body[0] = self.config.slave_id;
        body[1] = function;
        body[2] = (quantity * 2) as u8;

        let values = if function == FC_READ_HOLDING_REGISTERS {
            self.registers.holding_slice(start, quantity)
        } else {
            self.registers.input_slice(start, quantity)
        };
        let Some(values) = values else {
            return self.send_exception(function, ExceptionCode::IllegalDataAddress);
        };

        let mut n = 3;
        for value in values {
            body[n..n + 2].copy_from_slice(&value.to_be_bytes());
            n += 2;
        }

        self.respond(&body[..n]);
        self.stats.valid_requests += 1;
    }

    /// 0x06: fixed 8-byte request; on success the request frame is
    /// echoed back verbatim, original CRC included (content unchanged,
    /// checksum still valid).
    fn handle_write_single(&mut self, frame: &[u8]) {
        let function = frame[1];
        if frame.len() != 8 {
            return self.send_exception(function, ExceptionCode::IllegalDataValue);
        }

        let address = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        let value = u16::from_be_bytes([frame[4], frame[5]]);

        if !self.registers.set_holding(address, value) {
            return self.send_exception(function, ExceptionCode::IllegalDataAddress);
        }

        self.transmit(frame);
        self.stats.valid_requests += 1;
    }

    /// 0x10: start + quantity + byte count + values; response echoes
    /// start and quantity only.
    fn handle_write_multiple(&mut self, frame: &[u8]) {
        let function = frame[1];
        if frame.len() < 9 {
            return self.send_exception(function, ExceptionCode::IllegalDataValue);
        }

        let start = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        let quantity = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        let byte_count = frame[6] as usize;

        if quantity == 0
            || quantity > MAX_WRITE_QUANTITY
            || byte_count != quantity * 2
            || start + quantity > NUM_HOLDING_REGISTERS
            || frame.len() != 9 + byte_count
        {
            return self.send_exception(function, ExceptionCode::IllegalDataAddress);
        }

        for i in 0..quantity {
            let value = u16::from_be_bytes([frame[7 + i * 2], frame[8 + i * 2]]);
            self.registers.set_holding(start + i, value);
        }

        let mut body = [0u8; 6];
        body[0] = self.config.slave_id;
        body[1] = function;
        body[2..4].copy_from_slice(&(start as u16).to_be_bytes());
        body[4..6].copy_from_slice(&(quantity as u16).to_be_bytes());

        self.respond(&body);
        self.stats.valid_requests += 1;
    }

    fn send_exception(&mut self, function: u8, code: ExceptionCode) {
        let body = [self.config.slave_id, function | 0x80, code as u8];
        self.respond(&body);
        self.stats.exception_responses += 1;
        log_debug!(
            "modbus: exception 0x{:02x} for function 0x{:02x}",
            code as u8,
            function
        );
    }

    /// Appends the checksum to `body` and transmits the frame.
    fn respond(&mut self, body: &[u8]) {
        let mut tx = FrameBuf::new();
        if tx.extend_from_slice(body).is_err() || !crc::append_crc(&mut tx) {
            // Unreachable with the quantity limits above; counted rather
            // than ignored.
            self.stats.write_errors += 1;
            return;
        }
        self.transmit(&tx);
    }

    /// Half-duplex transmission discipline: assert transmit-enable, let
    /// the transceiver settle, write and flush synchronously, release,
    /// settle again. No received byte is examined meanwhile.
    fn transmit(&mut self, bytes: &[u8]) {
        self.transport.set_direction(Direction::Transmit);
        self.settle();

        let sent = self
            .transport
            .write(bytes)
            .and_then(|_| self.transport.flush())
            .is_ok();

        self.transport.set_direction(Direction::Receive);
        self.settle();

        if sent {
            self.stats.successful_responses += 1;
            self.stats.last_response_ms = self.clock.now_millis();
        } else {
            self.stats.write_errors += 1;
            log_warn!("modbus: transport rejected {} byte response", bytes.len());
        }
    }

    fn settle(&self) {
        let start = self.clock.now_micros();
        while self.clock.now_micros().wrapping_sub(start) < self.config.settle_us {
            core::hint::spin_loop();
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    /// In-memory transport: `feed` queues master bytes, `sent` captures
    /// responses.
    struct TestTransport {
        feed: std::collections::VecDeque<u8>,
        sent: Vec<u8>,
        directions: Vec<Direction>,
    }

    impl TestTransport {
        fn new() -> Self {
            Self {
                feed: std::collections::VecDeque::new(),
                sent: Vec::new(),
                directions: Vec::new(),
            }
        }
    }

    impl BusTransport for TestTransport {
        fn available(&mut self) -> usize {
            self.feed.len()
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.feed.pop_front()
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), crate::errors::TransportError> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), crate::errors::TransportError> {
            Ok(())
        }

        fn set_direction(&mut self, direction: Direction) {
            self.directions.push(direction);
        }
    }

    type TestSlave = ModbusSlave<TestTransport, std::sync::Arc<ManualClock>>;

    fn slave() -> (TestSlave, std::sync::Arc<ManualClock>) {
        let clock = std::sync::Arc::new(ManualClock::with_autotick(1_000_000, 1));
        let slave = ModbusSlave::new(TestTransport::new(), clock.clone(), LinkConfig::default());
        (slave, clock)
    }

    fn deliver(slave: &mut TestSlave, clock: &ManualClock, frame: &[u8]) {
        slave.transport.feed.extend(frame.iter().copied());
        slave.poll();
        // Silence gap longer than T3.5, then poll again to close the frame.
        clock.advance_micros(2_000);
        slave.poll();
    }

    fn request(payload: &[u8]) -> Vec<u8> {
        let crc = crc::crc16(payload);
        let mut frame = payload.to_vec();
        frame.push((crc & 0xFF) as u8);
        frame.push((crc >> 8) as u8);
        frame
    }

    #[test]
    fn byte_reception_enters_receiving_state() {
        let (mut slave, _clock) = slave();
        slave.transport.feed.push_back(0x02);
        slave.poll();
        assert_eq!(slave.state(), SlaveState::Receiving);
    }

    #[test]
    fn runt_frame_is_discarded_before_validation() {
        let (mut slave, clock) = slave();
        deliver(&mut slave, &clock, &[0x02, 0x03, 0x00]);

        let stats = slave.stats();
        assert_eq!(stats.frames_received, 0);
        assert_eq!(stats.invalid_requests, 1);
        assert!(slave.transport.sent.is_empty());
    }

    #[test]
    fn wrong_address_is_silently_dropped() {
        let (mut slave, clock) = slave();
        let frame = request(&[0x07, 0x03, 0x00, 0x00, 0x00, 0x01]);
        deliver(&mut slave, &clock, &frame);

        let stats = slave.stats();
        assert_eq!(stats.invalid_requests, 1);
        assert_eq!(stats.crc_errors, 0);
        assert!(slave.transport.sent.is_empty());
    }

    #[test]
    fn corrupted_crc_is_counted_and_dropped() {
        let (mut slave, clock) = slave();
        let mut frame = request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);
        frame[3] ^= 0x01;
        deliver(&mut slave, &clock, &frame);

        let stats = slave.stats();
        assert_eq!(stats.crc_errors, 1);
        assert_eq!(stats.invalid_requests, 1);
        assert!(slave.transport.sent.is_empty());
    }

    #[test]
    fn read_holding_registers_returns_defaults() {
        let (mut slave, clock) = slave();
        let frame = request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x02]);
        deliver(&mut slave, &clock, &frame);

        let sent = &slave.transport.sent;
        assert_eq!(sent[0], 0x02);
        assert_eq!(sent[1], 0x03);
        assert_eq!(sent[2], 4); // byte count
        assert_eq!(u16::from_be_bytes([sent[3], sent[4]]), 0x1234);
        assert_eq!(u16::from_be_bytes([sent[5], sent[6]]), 100);
        assert!(crc::frame_crc_ok(sent));
        assert_eq!(slave.stats().valid_requests, 1);
    }

    #[test]
    fn transmit_toggles_direction_around_response() {
        let (mut slave, clock) = slave();
        let frame = request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);
        deliver(&mut slave, &clock, &frame);

        // Receive at construction, then Transmit before and Receive
        // after the response bytes.
        assert_eq!(
            slave.transport.directions,
            vec![Direction::Receive, Direction::Transmit, Direction::Receive]
        );
    }

    #[test]
    fn back_to_back_frames_are_both_served() {
        let (mut slave, clock) = slave();
        let frame = request(&[0x02, 0x04, 0x00, 0x00, 0x00, 0x01]);
        deliver(&mut slave, &clock, &frame);
        let first_len = slave.transport.sent.len();
        deliver(&mut slave, &clock, &frame);

        assert_eq!(slave.stats().frames_processed, 2);
        assert_eq!(slave.transport.sent.len(), first_len * 2);
    }

    #[test]
    fn receive_overrun_resynchronizes() {
        let (mut slave, clock) = slave();
        // 300 bytes with no silence gap: overruns the 256 byte buffer.
        slave.transport.feed.extend(core::iter::repeat(0xAA).take(300));
        slave.poll();

        assert_eq!(slave.stats().timeout_errors, 1);

        // Trailing garbage closes as a misaddressed frame, then the
        // engine accepts a clean request again.
        clock.advance_micros(5_000);
        slave.poll();
        let frame = request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);
        deliver(&mut slave, &clock, &frame);
        assert_eq!(slave.stats().valid_requests, 1);
    }

    #[test]
    fn reset_stats_clears_counters() {
        let (mut slave, clock) = slave();
        let frame = request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);
        deliver(&mut slave, &clock, &frame);
        assert!(slave.stats().frames_received > 0);

        slave.reset_stats();
        assert_eq!(slave.stats(), LinkStats::default());
    }

    #[test]
    fn stats_display_summarizes_counters() {
        let (mut slave, clock) = slave();
        let frame = request(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);
        deliver(&mut slave, &clock, &frame);

        let text = format!("{}", slave.stats());
        assert!(text.starts_with("rx 1 ok 1 valid 1"));
    }
}
