//! A single histogram bin.

use serde::{Deserialize, Serialize};

use crate::num::Weight;

/// One cell of the global bin store.
///
/// `weight` is the running sum of net-per-event weights; `weight_sq` is
/// the running sum of those net weights squared. `weight_sq` never sums
/// squares of individual samples; the fill buffer consolidates each
/// event's contributions to a single net weight first, which is what
/// keeps the variance estimate honest under cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bin<T> {
    /// Sum of net event weights.
    pub weight: T,
    /// Sum of squared net event weights; non-negative by construction.
    pub weight_sq: T,
}

impl<T: Weight> Bin<T> {
    /// An empty bin.
    pub fn empty() -> Self {
        Self {
            weight: T::ZERO,
            weight_sq: T::ZERO,
        }
    }

    /// Fold one event's net contribution into the bin.
    #[inline]
    pub fn accumulate(&mut self, dw: T, dw_sq: T) {
        self.weight += dw;
        self.weight_sq += dw_sq;
    }

    /// Rescale by a constant factor: `weight` by `f`, `weight_sq` by `f²`.
    #[inline]
    pub fn scale(&mut self, factor: T) {
        self.weight = self.weight * factor;
        self.weight_sq = self.weight_sq * factor * factor;
    }

    /// Add another bin's totals (combining disjoint runs).
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.weight += other.weight;
        self.weight_sq += other.weight_sq;
    }
}
