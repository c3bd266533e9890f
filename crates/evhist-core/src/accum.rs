//! Per-bin event accumulators.
//!
//! One accumulator collects all weights filled into a single bin during a
//! single event. At flush the accumulator's result is the *net* event
//! weight, and only that net value gets squared, which is why a `+10.0`
//! and a `-9.9` contribution produce `weight_sq = 0.01` and not `199.01`.

use std::fmt::Debug;

use evhist_types::Weight;

/// Capability contract for a per-bin running sum.
///
/// The fill buffer assumes nothing beyond these three operations, so
/// alternative accumulators (naive, higher-order compensation) drop in
/// without touching the buffer.
pub trait Accumulator<T: Weight>: Debug + Clone + Send + 'static {
    /// Accumulator holding a single weight, equivalent to folding `w`
    /// into an empty sum.
    fn from_weight(w: T) -> Self;

    /// Fold one more weight into the running sum.
    fn add(&mut self, w: T);

    /// Best estimate of the true sum of everything folded so far.
    fn result(&self) -> T;
}

/// Knuth two-sum compensated accumulator.
///
/// State `(s, c)` represents the sum `s + c` where `c` carries the
/// rounding error of the last combination step. The error bound is
/// `O(n·ε²·|total|)` instead of naive summation's `O(n·ε·Σ|wᵢ|)`, so sums
/// that cancel to near zero keep their accuracy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoSumAccumulator<T> {
    s: T,
    c: T,
}

impl<T: Weight> Accumulator<T> for TwoSumAccumulator<T> {
    #[inline]
    fn from_weight(w: T) -> Self {
        Self { s: w, c: T::ZERO }
    }

    #[inline]
    fn add(&mut self, w: T) {
        let y = w + self.c;
        let t = self.s + y;
        self.c = y - (t - self.s);
        self.s = t;
    }

    #[inline]
    fn result(&self) -> T {
        self.s + self.c
    }
}

/// Uncompensated running sum, drop-in for benchmark comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaiveAccumulator<T> {
    s: T,
}

impl<T: Weight> Accumulator<T> for NaiveAccumulator<T> {
    #[inline]
    fn from_weight(w: T) -> Self {
        Self { s: w }
    }

    #[inline]
    fn add(&mut self, w: T) {
        self.s += w;
    }

    #[inline]
    fn result(&self) -> T {
        self.s
    }
}
