//! Thread-local fill buffer.
//!
//! One buffer per worker. Between flushes the buffer stages every fill in
//! a sparse→dense pair: `sparse` holds one packed word per global bin,
//! `dense_ids`/`dense_acc` hold only the bins touched in the current
//! event. The packed word is `(generation << shift) | dense_index`; a
//! stale generation in the high bits means "not touched this event", so
//! event boundaries cost a single counter increment instead of an
//! O(n_total) wipe.
//!
//! Packed-word invariants, maintained by `fill` and `flush`:
//!
//! 1. `dense_ids[j] == gid` iff `sparse[gid] == (current_gen << shift) | j`.
//! 2. A stale generation word never aliases a live dense slot.
//! 3. `dense_ids.len() == dense_acc.len() <= index_mask`.
//! 4. `1 <= current_gen <= max_gen`; zero is the never-touched sentinel.

use std::marker::PhantomData;

use evhist_error::{EvhistError, Result};
use evhist_types::{IndexWord, Weight};

use crate::accum::{Accumulator, TwoSumAccumulator};
use crate::store::StoreSink;

/// Generation bits the index word must keep free. Guarantees at least 15
/// events between forced sparse-map resets, which keeps the rollover cost
/// amortized O(1) per fill.
pub const MIN_GENERATION_BITS: u32 = 4;

/// Construction-time tuning for a [`FillBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Capacity hint for the dense arrays (clamped to `n_total`).
    pub reserve: usize,
    /// Explicit generation/index split. `None` derives the index width
    /// from `n_total`; narrower values trade per-event bin capacity for
    /// time between forced rollovers.
    pub index_bits: Option<u32>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            reserve: 64,
            index_bits: None,
        }
    }
}

/// Sparse→dense staging buffer for one worker.
///
/// Single-threaded-of-execution from construction to drop; only `flush`
/// crosses to shared state, through a [`StoreSink`].
#[derive(Debug, Clone)]
pub struct FillBuffer<T, S, A = TwoSumAccumulator<T>> {
    /// One packed `(generation << shift) | dense_index` word per global
    /// bin. Zero means never touched: valid generations start at 1.
    sparse: Vec<S>,
    /// Global indices touched in the current event, in first-touch order.
    dense_ids: Vec<S>,
    /// One accumulator per touched bin, positionally aligned with
    /// `dense_ids`.
    dense_acc: Vec<A>,
    current_gen: S,
    max_gen: S,
    shift_amount: u32,
    index_mask: S,
    _weight: PhantomData<fn() -> T>,
}

impl<T, S, A> FillBuffer<T, S, A>
where
    T: Weight,
    S: IndexWord,
    A: Accumulator<T>,
{
    /// Create a buffer for a store of `n_total` bins with a dense-array
    /// capacity hint.
    pub fn new(n_total: usize, reserve: usize) -> Result<Self> {
        Self::with_config(
            n_total,
            BufferConfig {
                reserve,
                index_bits: None,
            },
        )
    }

    /// Create a buffer with an explicit [`BufferConfig`].
    pub fn with_config(n_total: usize, config: BufferConfig) -> Result<Self> {
        if n_total == 0 {
            return Ok(Self {
                sparse: Vec::new(),
                dense_ids: Vec::new(),
                dense_acc: Vec::new(),
                current_gen: S::ONE,
                max_gen: S::MAX,
                shift_amount: 0,
                index_mask: S::ZERO,
                _weight: PhantomData,
            });
        }

        let derived_bits = bit_width(n_total);
        let index_bits = config.index_bits.unwrap_or(derived_bits);
        if index_bits == 0 || index_bits > derived_bits {
            return Err(EvhistError::out_of_range(
                "index bits override",
                index_bits,
            ));
        }
        if S::BITS < index_bits + MIN_GENERATION_BITS || S::from_usize(n_total - 1).is_none() {
            return Err(EvhistError::IndexCapacity {
                n_total,
                required_bits: index_bits,
                word_bits: S::BITS,
                min_gen_bits: MIN_GENERATION_BITS,
            });
        }

        let index_mask = (S::ONE << index_bits) - S::ONE;
        let gen_bits = S::BITS - index_bits;
        let max_gen = if gen_bits >= S::BITS {
            S::MAX
        } else {
            (S::ONE << gen_bits) - S::ONE
        };
        let reserve = config.reserve.min(n_total);

        tracing::debug!(
            target: "evhist.buffer",
            n_total,
            index_bits,
            gen_bits,
            reserve,
            "fill buffer initialized"
        );

        Ok(Self {
            sparse: vec![S::ZERO; n_total],
            dense_ids: Vec::with_capacity(reserve),
            dense_acc: Vec::with_capacity(reserve),
            current_gen: S::ONE,
            max_gen,
            shift_amount: index_bits,
            index_mask,
            _weight: PhantomData,
        })
    }

    /// Stage one weighted sample for global bin `gid`.
    ///
    /// The hit path (bin already touched this event) is one random read,
    /// one accumulator update, and no allocation. The view layer is
    /// responsible for `gid < n_total`; out-of-range indices are a
    /// programming error and panic.
    #[inline]
    pub fn fill(&mut self, gid: S, w: T) -> Result<()> {
        let slot = gid.to_usize();
        debug_assert!(slot < self.sparse.len(), "global index {slot} out of range");

        let packed = self.sparse[slot];
        if packed >> self.shift_amount == self.current_gen {
            let j = (packed & self.index_mask).to_usize();
            self.dense_acc[j].add(w);
            return Ok(());
        }

        let j_new = self.dense_ids.len();
        if j_new >= self.index_mask.to_usize() {
            return Err(EvhistError::DenseIndexOverflow {
                capacity: self.index_mask.to_usize(),
            });
        }
        let Some(j_word) = S::from_usize(j_new) else {
            return Err(EvhistError::internal("dense index exceeds index word"));
        };
        self.sparse[slot] = (self.current_gen << self.shift_amount) | j_word;
        self.dense_ids.push(gid);
        self.dense_acc.push(A::from_weight(w));
        Ok(())
    }

    /// End the current event: merge every touched bin's net weight into
    /// `sink`, bump the event count, and advance the generation.
    ///
    /// Bins reach the sink in first-touch order. Dense capacity is kept;
    /// the sparse map is wiped only on forced generation rollover.
    pub fn flush<K: StoreSink<T>>(&mut self, sink: &mut K) {
        for (gid, acc) in self.dense_ids.iter().zip(&self.dense_acc) {
            let net = acc.result();
            sink.accumulate(gid.to_usize(), net, net * net);
        }
        sink.increment_count();

        self.dense_ids.clear();
        self.dense_acc.clear();

        if self.current_gen == self.max_gen {
            self.sparse.fill(S::ZERO);
            self.current_gen = S::ONE;
            tracing::trace!(target: "evhist.buffer", "forced generation rollover");
        } else {
            self.current_gen = self.current_gen + S::ONE;
        }
    }

    /// Discard the current event without touching any store.
    ///
    /// Externally equivalent to never having filled; the generation still
    /// advances so stale packed words cannot alias the next event.
    pub fn discard_event(&mut self) {
        self.dense_ids.clear();
        self.dense_acc.clear();
        if self.current_gen == self.max_gen {
            self.sparse.fill(S::ZERO);
            self.current_gen = S::ONE;
        } else {
            self.current_gen = self.current_gen + S::ONE;
        }
    }

    /// Number of distinct bins touched so far in the current event.
    pub fn touched(&self) -> usize {
        self.dense_ids.len()
    }

    /// Largest distinct-bin count one event can stage.
    pub fn dense_capacity(&self) -> usize {
        self.index_mask.to_usize()
    }

    /// The generation tag for the current event.
    pub fn generation(&self) -> S {
        self.current_gen
    }

    /// Largest generation value before a forced rollover.
    pub fn max_generation(&self) -> S {
        self.max_gen
    }

    /// Net weight currently staged for `gid`, if touched this event.
    pub fn staged(&self, gid: S) -> Option<T> {
        let packed = *self.sparse.get(gid.to_usize())?;
        if packed >> self.shift_amount == self.current_gen {
            let j = (packed & self.index_mask).to_usize();
            Some(self.dense_acc[j].result())
        } else {
            None
        }
    }

    /// True when every sparse word is the never-touched sentinel.
    pub fn sparse_is_zeroed(&self) -> bool {
        self.sparse.iter().all(|&word| word == S::ZERO)
    }
}

/// Bits needed to represent `n`, i.e. `⌈log₂(n + 1)⌉`.
fn bit_width(n: usize) -> u32 {
    usize::BITS - n.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BinStore;

    type Buf = FillBuffer<f64, u32>;

    #[test]
    fn bit_width_matches_definition() {
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(3), 2);
        assert_eq!(bit_width(4), 3);
        assert_eq!(bit_width(8), 4);
        assert_eq!(bit_width(255), 8);
        assert_eq!(bit_width(256), 9);
    }

    #[test]
    fn zero_bins_allocates_nothing() {
        let buf = Buf::new(0, 128).expect("empty buffer should construct");
        assert_eq!(buf.dense_capacity(), 0);
        assert!(buf.sparse_is_zeroed());
    }

    #[test]
    fn derived_split_for_eight_bins_in_u16() {
        let buf = FillBuffer::<f64, u16>::new(8, 0).expect("u16 split should fit");
        // bit_width(8) = 4 index bits, 12 generation bits.
        assert_eq!(buf.dense_capacity(), 15);
        assert_eq!(buf.max_generation(), 4095);
    }

    #[test]
    fn capacity_error_names_the_word_width() {
        let err = FillBuffer::<f64, u16>::new(1 << 13, 0).expect_err("14 index bits in u16");
        match err {
            EvhistError::IndexCapacity {
                required_bits,
                word_bits,
                ..
            } => {
                assert_eq!(required_bits, 14);
                assert_eq!(word_bits, 16);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hit_path_consolidates_into_one_dense_slot() {
        let mut buf = Buf::new(16, 4).expect("buffer");
        buf.fill(3, 10.0).expect("miss");
        buf.fill(3, -9.9).expect("hit");
        buf.fill(5, 1.0).expect("miss");
        assert_eq!(buf.touched(), 2);
        let net = buf.staged(3).expect("bin 3 staged");
        assert!((net - 0.1).abs() <= 2.0 * f64::EPSILON);
        assert_eq!(buf.staged(7), None);
    }

    #[test]
    fn flush_resets_dense_state_and_advances_generation() {
        let mut buf = Buf::new(16, 4).expect("buffer");
        let mut store = BinStore::<f64>::new(16);
        buf.fill(3, 2.5).expect("fill");
        let gen_before = buf.generation();
        buf.flush(&mut store);
        assert_eq!(buf.touched(), 0);
        assert_eq!(buf.generation(), gen_before + 1);
        assert_eq!(buf.staged(3), None);
        assert_eq!(store.bin(3).weight, 2.5);
    }

    #[test]
    fn stale_generation_reads_as_untouched() {
        let mut buf = Buf::new(8, 4).expect("buffer");
        let mut store = BinStore::<f64>::new(8);
        buf.fill(2, 1.0).expect("fill");
        buf.flush(&mut store);
        // Same bin next event: packed word holds the old generation, so
        // this must be a miss that starts a fresh accumulator.
        buf.fill(2, 5.0).expect("fill");
        assert_eq!(buf.staged(2), Some(5.0));
        assert_eq!(buf.touched(), 1);
    }

    #[test]
    fn discard_event_leaves_no_trace() {
        let mut buf = Buf::new(8, 4).expect("buffer");
        let mut store = BinStore::<f64>::new(8);
        buf.fill(1, 42.0).expect("fill");
        buf.discard_event();
        assert_eq!(buf.touched(), 0);
        buf.fill(1, 2.0).expect("fill");
        buf.flush(&mut store);
        assert_eq!(store.bin(1).weight, 2.0);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn narrow_override_limits_distinct_bins() {
        let config = BufferConfig {
            reserve: 4,
            index_bits: Some(2),
        };
        let mut buf = FillBuffer::<f64, u32>::with_config(4, config).expect("override");
        buf.fill(0, 1.0).expect("first distinct bin");
        buf.fill(1, 1.0).expect("second distinct bin");
        buf.fill(2, 1.0).expect("third distinct bin");
        let err = buf.fill(3, 1.0).expect_err("fourth distinct bin must overflow");
        assert!(matches!(
            err,
            EvhistError::DenseIndexOverflow { capacity: 3 }
        ));
        // The first three stay coherent.
        assert_eq!(buf.touched(), 3);
        assert_eq!(buf.staged(2), Some(1.0));
    }

    #[test]
    fn override_wider_than_needed_is_rejected() {
        let config = BufferConfig {
            reserve: 0,
            index_bits: Some(9),
        };
        let err = FillBuffer::<f64, u32>::with_config(4, config).expect_err("too wide");
        assert!(matches!(err, EvhistError::OutOfRange { .. }));
    }
}
