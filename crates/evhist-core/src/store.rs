//! Global bin store and its shared wrapper.
//!
//! The store is the only state shared between workers, and it is touched
//! only at event boundaries: a flush appends each bin's net event weight
//! and bumps the event counter. Internal summation is deliberately
//! uncompensated: the fill buffer has already collapsed per-event
//! cancellations, and the residual accumulation is a sum of same-sign
//! contributions for which classical summation is adequate.

use parking_lot::{Mutex, MutexGuard};

use evhist_error::{EvhistError, Result};
use evhist_types::{Bin, EventCount, IndexWord, Weight};

use crate::accum::Accumulator;
use crate::buffer::FillBuffer;

/// Receiver of one event's consolidated contributions.
///
/// `FillBuffer::flush` drives this instead of a concrete store so that
/// the buffer stays independent of the event-counter type and benchmarks
/// can flush into a null sink.
pub trait StoreSink<T: Weight> {
    /// Fold one bin's net event weight into the running totals.
    fn accumulate(&mut self, gid: usize, dw: T, dw_sq: T);

    /// Record that one event completed.
    fn increment_count(&mut self);
}

/// Dense array of bins plus the event counter.
#[derive(Debug, Clone, PartialEq)]
pub struct BinStore<T, U = u64> {
    bins: Vec<Bin<T>>,
    count: U,
}

impl<T: Weight, U: EventCount> BinStore<T, U> {
    /// An empty store of `n_total` bins with zero events.
    pub fn new(n_total: usize) -> Self {
        Self {
            bins: vec![Bin::empty(); n_total],
            count: U::ZERO,
        }
    }

    /// Rebuild a store from snapshot parts.
    pub fn from_parts(bins: Vec<Bin<T>>, count: U) -> Self {
        Self { bins, count }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True when the store owns no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Completed events merged into this store.
    pub fn count(&self) -> U {
        self.count
    }

    /// The bin at `gid`. Panics on an out-of-range index; callers go
    /// through a view that owns the range.
    pub fn bin(&self, gid: usize) -> &Bin<T> {
        &self.bins[gid]
    }

    /// All bins, in global-index order.
    pub fn bins(&self) -> &[Bin<T>] {
        &self.bins
    }

    /// Mean weight per event for `gid`; zero before the first event.
    pub fn mean(&self, gid: usize) -> T {
        let n = self.count.to_u64();
        if n == 0 {
            return T::ZERO;
        }
        self.bins[gid].weight / T::from_count(n)
    }

    /// Variance of the mean for `gid`; zero with fewer than two events.
    ///
    /// `(⟨w²⟩ − ⟨w⟩²) / (n − 1)`, with the negative residue that floating
    /// cancellation can leave clamped to zero.
    pub fn variance_of_mean(&self, gid: usize) -> T {
        let n = self.count.to_u64();
        if n <= 1 {
            return T::ZERO;
        }
        let inv_n = T::ONE / T::from_count(n);
        let mean = self.bins[gid].weight * inv_n;
        let raw = (self.bins[gid].weight_sq * inv_n - mean * mean) / T::from_count(n - 1);
        if raw < T::ZERO { T::ZERO } else { raw }
    }

    /// Statistical error (standard deviation of the mean) for `gid`.
    pub fn error(&self, gid: usize) -> T {
        self.variance_of_mean(gid).sqrt()
    }

    /// Rescale every bin: weights by `factor`, squared weights by
    /// `factor²`. The event count is untouched.
    pub fn scale(&mut self, factor: T) {
        for bin in &mut self.bins {
            bin.scale(factor);
        }
        tracing::trace!(target: "evhist.store", factor = factor.to_f64(), "store rescaled");
    }

    /// Add a disjoint run's totals bin-wise and sum the event counts.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if other.bins.len() != self.bins.len() {
            return Err(EvhistError::out_of_range(
                "merge partner bin count",
                other.bins.len(),
            ));
        }
        for (bin, theirs) in self.bins.iter_mut().zip(&other.bins) {
            bin.merge(theirs);
        }
        self.count += other.count;
        tracing::trace!(
            target: "evhist.store",
            merged_events = other.count.to_u64(),
            "store merged"
        );
        Ok(())
    }
}

impl<T: Weight, U: EventCount> StoreSink<T> for BinStore<T, U> {
    #[inline]
    fn accumulate(&mut self, gid: usize, dw: T, dw_sq: T) {
        self.bins[gid].accumulate(dw, dw_sq);
    }

    #[inline]
    fn increment_count(&mut self) {
        self.count += U::ONE;
    }
}

/// Sink that discards contributions; used to benchmark the buffer side
/// of a flush in isolation. Keeps a folded checksum so the work cannot
/// be optimized away.
#[derive(Debug, Default)]
pub struct NullSink<T> {
    /// Folded sum of everything offered to the sink.
    pub checksum: T,
    /// Events flushed.
    pub events: u64,
}

impl<T: Weight> StoreSink<T> for NullSink<T> {
    #[inline]
    fn accumulate(&mut self, _gid: usize, dw: T, dw_sq: T) {
        self.checksum += dw + dw_sq;
    }

    #[inline]
    fn increment_count(&mut self) {
        self.events += 1;
    }
}

/// Store shared between workers behind a flush-granularity mutex.
///
/// Holding the lock across the whole flush makes the event's bin
/// contributions and its `increment_count` a single observable step, so
/// derived statistics can never pair a new count with old totals.
#[derive(Debug)]
pub struct SharedStore<T, U = u64> {
    inner: Mutex<BinStore<T, U>>,
}

impl<T: Weight, U: EventCount> SharedStore<T, U> {
    /// A shared store of `n_total` empty bins.
    pub fn new(n_total: usize) -> Self {
        Self {
            inner: Mutex::new(BinStore::new(n_total)),
        }
    }

    /// Wrap an existing store.
    pub fn from_store(store: BinStore<T, U>) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Flush one worker's event under the store lock.
    pub fn flush_from<S, A>(&self, buffer: &mut FillBuffer<T, S, A>)
    where
        S: IndexWord,
        A: Accumulator<T>,
    {
        let mut guard = self.inner.lock();
        buffer.flush(&mut *guard);
    }

    /// Lock the store for direct reads.
    pub fn lock(&self) -> MutexGuard<'_, BinStore<T, U>> {
        self.inner.lock()
    }

    /// Owned copy of the current store state.
    pub fn snapshot(&self) -> BinStore<T, U> {
        self.inner.lock().clone()
    }

    /// Unwrap into the inner store.
    pub fn into_inner(self) -> BinStore<T, U> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_and_count_are_independent() {
        let mut store = BinStore::<f64>::new(4);
        store.accumulate(2, 1.5, 2.25);
        store.accumulate(2, 0.5, 0.25);
        assert_eq!(store.bin(2).weight, 2.0);
        assert_eq!(store.bin(2).weight_sq, 2.5);
        assert_eq!(store.count(), 0);
        store.increment_count();
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn statistics_follow_the_estimator() {
        let mut store = BinStore::<f64>::new(1);
        // 100 events of unit weight: variance of the mean is exactly 0.
        for _ in 0..100 {
            store.accumulate(0, 1.0, 1.0);
            store.increment_count();
        }
        assert_eq!(store.bin(0).weight, 100.0);
        assert_eq!(store.bin(0).weight_sq, 100.0);
        assert_eq!(store.mean(0), 1.0);
        assert_eq!(store.variance_of_mean(0), 0.0);
        assert_eq!(store.error(0), 0.0);
    }

    #[test]
    fn statistics_are_zero_before_two_events() {
        let mut store = BinStore::<f64>::new(1);
        assert_eq!(store.mean(0), 0.0);
        assert_eq!(store.variance_of_mean(0), 0.0);
        store.accumulate(0, 3.0, 9.0);
        store.increment_count();
        assert_eq!(store.mean(0), 3.0);
        assert_eq!(store.variance_of_mean(0), 0.0);
    }

    #[test]
    fn spread_weights_give_positive_error() {
        let mut store = BinStore::<f64>::new(1);
        for w in [1.0, 3.0] {
            store.accumulate(0, w, w * w);
            store.increment_count();
        }
        // mean 2, ⟨w²⟩ = 5, sample variance of mean = (5 − 4) / 1 = 1.
        assert_eq!(store.mean(0), 2.0);
        assert_eq!(store.variance_of_mean(0), 1.0);
        assert_eq!(store.error(0), 1.0);
    }

    #[test]
    fn scale_preserves_count() {
        let mut store = BinStore::<f64>::new(2);
        store.accumulate(0, 2.0, 4.0);
        store.increment_count();
        store.scale(10.0);
        assert_eq!(store.bin(0).weight, 20.0);
        assert_eq!(store.bin(0).weight_sq, 400.0);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn merge_requires_matching_layout() {
        let mut a = BinStore::<f64>::new(2);
        let b = BinStore::<f64>::new(3);
        assert!(a.merge(&b).is_err());

        let mut b = BinStore::<f64>::new(2);
        b.accumulate(1, 1.0, 1.0);
        b.increment_count();
        a.accumulate(1, 2.0, 4.0);
        a.increment_count();
        a.merge(&b).expect("layouts match");
        assert_eq!(a.bin(1).weight, 3.0);
        assert_eq!(a.bin(1).weight_sq, 5.0);
        assert_eq!(a.count(), 2);
    }
}
