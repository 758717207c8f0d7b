//! Lock-free single-producer single-consumer handoff ring.
#![allow(unsafe_code)] // Required for the lock-free buffer slots
//!
//! Carries completed window statistics from the processing task to the
//! analytics task without blocking either side. The ring is bounded and
//! *lossy by policy*: when the consumer falls behind, `push` fails and
//! the producer drops the window after counting it. An unbounded channel
//! here would change the system's observable backpressure behavior, so
//! don't be tempted.
//!
//! ## Algorithm
//!
//! Classic ring buffer with atomic head (producer-owned) and tail
//! (consumer-owned) indices over a power-of-two capacity. One slot stays
//! empty to distinguish full from empty, so a ring of capacity 4 holds
//! up to 3 items in flight.
//!
//! Orderings: the producer publishes a slot with a Release store of
//! `head` after writing the data; the consumer's Acquire load of `head`
//! therefore sees the completed write. Symmetrically for `tail`. With a
//! single producer and a single consumer no compare-and-swap is needed.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Bounded SPSC ring. `N` must be a power of two; usable capacity is
/// `N - 1`.
pub struct HandoffQueue<T, const N: usize> {
    /// Slot storage; a slot is valid only between the matching head
    /// publish and tail consume.
    buffer: UnsafeCell<[MaybeUninit<T>; N]>,

    /// Next write position, advanced only by the producer.
    head: AtomicUsize,

    /// Next read position, advanced only by the consumer.
    tail: AtomicUsize,

    /// Items rejected because the ring was full.
    dropped: AtomicU32,
}

// The atomics serialize slot hand-over between the two threads.
unsafe impl<T: Send, const N: usize> Send for HandoffQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for HandoffQueue<T, N> {}

impl<T: Copy, const N: usize> HandoffQueue<T, N> {
    /// Creates an empty ring. Panics (at compile time in const contexts)
    /// if `N` is not a power of two.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        Self {
            buffer: UnsafeCell::new(unsafe { MaybeUninit::uninit().assume_init() }),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Non-blocking push; single producer only.
    ///
    /// Returns `false` and counts a drop when the ring is full.
    pub fn push(&self, value: T) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next_head = (head + 1) & (N - 1);

        if next_head == self.tail.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // Sole producer: nobody else writes this slot until head moves.
        unsafe {
            (*self.buffer.get())[head].write(value);
        }

        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Non-blocking pop; single consumer only.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // Slot was published by the Release store of head.
        let value = unsafe { (*self.buffer.get())[tail].assume_init_read() };

        self.tail.store((tail + 1) & (N - 1), Ordering::Release);
        Some(value)
    }

    /// Items currently in flight.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head.wrapping_sub(tail)) & (N - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N - 1
    }

    /// Total items rejected since creation.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Copy, const N: usize> Default for HandoffQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
