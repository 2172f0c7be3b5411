//! Signal History
//!
//! Fixed-capacity ring buffers holding the recent values of a signal for
//! oscilloscope-style display. The control thread is the single writer; UI
//! threads may read concurrently through a shared `Arc<HistoryBuffer>`.
//!
//! Samples are stored as `f64` bit patterns in atomics, so a concurrent reader
//! never sees a torn sample. It may see a copy that mixes samples from two
//! adjacent ticks, which is acceptable for display and must not be used for
//! control decisions.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Default number of samples kept per signal
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Lock-free ring buffer of scalar samples
///
/// Storage is allocated once in [`HistoryBuffer::new`] and never resized.
#[derive(Debug)]
pub struct HistoryBuffer {
    slots: Box<[AtomicU64]>,
    write_pos: AtomicUsize,
    pushed: AtomicUsize,
}

impl HistoryBuffer {
    /// Create a buffer holding `capacity` samples, all initialised to 0.0.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|_| AtomicU64::new(0.0_f64.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            write_pos: AtomicUsize::new(0),
            pushed: AtomicUsize::new(0),
        }
    }

    /// Number of samples the buffer holds
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid samples (saturates at capacity)
    pub fn len(&self) -> usize {
        self.pushed.load(Ordering::Acquire).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a sample, overwriting the oldest once full.
    ///
    /// Must only be called from one thread at a time.
    #[inline]
    pub fn push(&self, value: f64) {
        let pos = self.write_pos.load(Ordering::Relaxed);
        self.slots[pos].store(value.to_bits(), Ordering::Relaxed);
        let next = if pos + 1 == self.slots.len() { 0 } else { pos + 1 };
        self.write_pos.store(next, Ordering::Release);
        let pushed = self.pushed.load(Ordering::Relaxed);
        if pushed < self.slots.len() {
            self.pushed.store(pushed + 1, Ordering::Release);
        }
    }

    /// Most recently pushed sample, or 0.0 if nothing was pushed yet
    pub fn latest(&self) -> f64 {
        let pos = self.write_pos.load(Ordering::Acquire);
        let last = if pos == 0 { self.slots.len() - 1 } else { pos - 1 };
        f64::from_bits(self.slots[last].load(Ordering::Relaxed))
    }

    /// Copy the contents into `dest` in chronological order, oldest first.
    ///
    /// Does not allocate. With `dest.len() == capacity()` the whole ring is
    /// copied, unwritten slots reading as 0.0. A shorter destination receives
    /// the most recent `dest.len()` samples; a longer one is right-aligned and
    /// its leading surplus is zeroed.
    pub fn copy_into(&self, dest: &mut [f64]) {
        let cap = self.slots.len();
        let start = self.write_pos.load(Ordering::Acquire);

        let (pad, take) = if dest.len() > cap {
            (dest.len() - cap, cap)
        } else {
            (0, dest.len())
        };
        dest[..pad].fill(0.0);

        // Skip the oldest samples that do not fit
        let first = (start + cap - take) % cap;
        for (i, out) in dest[pad..].iter_mut().enumerate() {
            let idx = (first + i) % cap;
            *out = f64::from_bits(self.slots[idx].load(Ordering::Relaxed));
        }
    }

    /// Reset every slot to 0.0
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0.0_f64.to_bits(), Ordering::Relaxed);
        }
        self.write_pos.store(0, Ordering::Release);
        self.pushed.store(0, Ordering::Release);
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
