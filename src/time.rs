//! Monotonic clock abstraction.
//!
//! The pipeline needs two counters from its environment: microseconds for
//! sample timestamps and frame-silence detection, milliseconds for
//! coarser bookkeeping. Both are monotonic from an arbitrary origin
//! (typically boot).

use core::sync::atomic::{AtomicU64, Ordering};

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary origin.
    fn now_micros(&self) -> u64;

    /// Milliseconds since the same origin.
    fn now_millis(&self) -> u64 {
        self.now_micros() / 1000
    }
}

#[cfg(feature = "std")]
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }

    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// Process-lifetime monotonic clock backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Manually advanced clock for tests.
///
/// `tick_per_read` makes every `now_micros` call advance the clock by a
/// fixed amount, so code that spin-waits on the clock (settling delays)
/// terminates without a separate driver thread.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
    tick_per_read: u64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            micros: AtomicU64::new(start_us),
            tick_per_read: 0,
        }
    }

    /// Clock that advances by `tick_us` on every read.
    pub fn with_autotick(start_us: u64, tick_us: u64) -> Self {
        Self {
            micros: AtomicU64::new(start_us),
            tick_per_read: tick_us,
        }
    }

    pub fn set(&self, us: u64) {
        self.micros.store(us, Ordering::Release);
    }

    pub fn advance_micros(&self, us: u64) {
        self.micros.fetch_add(us, Ordering::AcqRel);
    }

    pub fn advance_millis(&self, ms: u64) {
        self.advance_micros(ms * 1000);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        if self.tick_per_read > 0 {
            self.micros.fetch_add(self.tick_per_read, Ordering::AcqRel) + self.tick_per_read
        } else {
            self.micros.load(Ordering::Acquire)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000_000);
        assert_eq!(clock.now_micros(), 1_000_000);
        assert_eq!(clock.now_millis(), 1000);

        clock.advance_millis(500);
        assert_eq!(clock.now_millis(), 1500);
    }

    #[test]
    fn autotick_moves_on_every_read() {
        let clock = ManualClock::with_autotick(0, 5);
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b > a);
    }

    #[cfg(feature = "std")]
    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b >= a);
    }
}
