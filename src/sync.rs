//! Synchronization primitives for the task layer.
//!
//! Thin, purpose-built pieces rather than general abstractions: a
//! one-shot signal that deliberately does not queue, a bounded-deadline
//! mutex acquisition, a copy-in/copy-out snapshot cell, and the
//! blocking wrapper around the lock-free handoff ring.
//!
//! Poisoning policy: pipeline tasks never panic while holding a lock,
//! so a poisoned mutex is treated as still-usable state rather than an
//! excuse to crash the pipeline.

use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::queue::HandoffQueue;

fn recover<T>(result: std::sync::LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One-shot, non-queueing wakeup signal.
///
/// `notify` sets a flag; multiple notifications before the waiter wakes
/// collapse into one. That is the contract the buffer-ready path wants:
/// if the processor cannot keep up, intermediate full-buffer events are
/// lost and surface only as missed samples on the sampler side.
#[derive(Default)]
pub struct WindowSignal {
    flag: Mutex<bool>,
    ready: Condvar,
}

impl WindowSignal {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            ready: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut pending = recover(self.flag.lock());
        *pending = true;
        self.ready.notify_one();
    }

    /// Waits up to `timeout` for a notification, consuming it.
    ///
    /// Returns `false` on timeout. Callers loop around this with a
    /// modest timeout so they also observe shutdown.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = recover(self.flag.lock());
        let result = self
            .ready
            .wait_timeout_while(guard, timeout, |pending| !*pending);
        match result {
            Ok((mut pending, timed_out)) => {
                if timed_out.timed_out() && !*pending {
                    false
                } else {
                    *pending = false;
                    true
                }
            }
            Err(poisoned) => {
                let (mut pending, _) = poisoned.into_inner();
                let was_set = *pending;
                *pending = false;
                was_set
            }
        }
    }
}

/// Acquires `mutex` with a deadline.
///
/// Spins on `try_lock` with short sleeps; returns `None` once the
/// deadline passes. The caller does not retry within the same cycle, it
/// counts the miss and proceeds to its next scheduled iteration.
pub fn lock_with_timeout<'a, T>(
    mutex: &'a Mutex<T>,
    timeout: Duration,
) -> Option<MutexGuard<'a, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return None;
                }
                std::thread::sleep(Duration::from_micros(100));
            }
        }
    }
}

/// Single-slot publish/subscribe cell for `Copy` state.
///
/// The writer replaces the whole value; readers take whole copies.
/// Readers can never observe a torn update.
pub struct SnapshotCell<T: Copy> {
    slot: Mutex<Option<T>>,
}

impl<T: Copy> SnapshotCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn publish(&self, value: T) {
        *recover(self.slot.lock()) = Some(value);
    }

    pub fn load(&self) -> Option<T> {
        *recover(self.slot.lock())
    }
}

impl<T: Copy> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking facade over the lock-free handoff ring.
///
/// Producer side stays non-blocking (drop-on-full); the consumer gets a
/// bounded wait instead of a spin.
pub struct HandoffChannel<T: Copy, const N: usize> {
    ring: HandoffQueue<T, N>,
    available: WindowSignal,
}

impl<T: Copy, const N: usize> HandoffChannel<T, N> {
    pub fn new() -> Self {
        Self {
            ring: HandoffQueue::new(),
            available: WindowSignal::new(),
        }
    }

    /// Non-blocking send. Returns `false` (and the item is lost) when
    /// the ring is full.
    pub fn send(&self, value: T) -> bool {
        if self.ring.push(value) {
            self.available.notify();
            true
        } else {
            false
        }
    }

    /// Receives one item, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(value) = self.ring.pop() {
            return Some(value);
        }
        if self.available.wait_timeout(timeout) {
            return self.ring.pop();
        }
        None
    }

    /// Items lost to a full ring since startup.
    pub fn dropped(&self) -> u32 {
        self.ring.dropped()
    }
}

impl<T: Copy, const N: usize> Default for HandoffChannel<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn signal_is_one_shot() {
        let signal = WindowSignal::new();

        // Multiple notifications collapse into one wakeup.
        signal.notify();
        signal.notify();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn signal_wakes_a_parked_waiter() {
        let signal = Arc::new(WindowSignal::new());
        let notifier = Arc::clone(&signal);

        let waiter = thread::spawn(move || signal.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        notifier.notify();
        assert!(matches!(waiter.join(), Ok(true)));
    }

    #[test]
    fn lock_timeout_expires_under_contention() {
        let mutex = Arc::new(Mutex::new(0u32));
        let held = Arc::clone(&mutex);

        let _holder = thread::spawn(move || {
            let _guard = held.lock();
            thread::sleep(Duration::from_millis(300));
        });
        thread::sleep(Duration::from_millis(50));

        assert!(lock_with_timeout(&mutex, Duration::from_millis(20)).is_none());
    }

    #[test]
    fn snapshot_cell_round_trips() {
        let cell: SnapshotCell<[f32; 3]> = SnapshotCell::new();
        assert_eq!(cell.load(), None);

        cell.publish([1.0, 2.0, 3.0]);
        assert_eq!(cell.load(), Some([1.0, 2.0, 3.0]));

        cell.publish([4.0, 5.0, 6.0]);
        assert_eq!(cell.load(), Some([4.0, 5.0, 6.0]));
    }

    #[test]
    fn channel_delivers_and_drops() {
        let channel: HandoffChannel<u32, 4> = HandoffChannel::new();

        assert!(channel.send(1));
        assert!(channel.send(2));
        assert!(channel.send(3));
        assert!(!channel.send(4)); // depth 3, fourth is dropped
        assert_eq!(channel.dropped(), 1);

        assert_eq!(channel.recv_timeout(Duration::from_millis(1)), Some(1));
        assert_eq!(channel.recv_timeout(Duration::from_millis(1)), Some(2));
        assert_eq!(channel.recv_timeout(Duration::from_millis(1)), Some(3));
        assert_eq!(channel.recv_timeout(Duration::from_millis(1)), None);
    }
}
