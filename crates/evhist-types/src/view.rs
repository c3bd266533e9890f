//! Histogram identifiers and logical views into the global bin store.

use serde::{Deserialize, Serialize};

use crate::num::IndexWord;

/// Opaque handle to a booked histogram.
///
/// Ids are dense registry indices, stable for the lifetime of the
/// registry that issued them. They are not meaningful across registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistogramId(u32);

impl HistogramId {
    /// Wrap a raw registry index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw registry index.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The raw index as a `usize`, for table lookups.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A logical window into the global bin store.
///
/// A view owns the half-open global index range
/// `[base, base + n_bins · stride)`. Views hold indices, never
/// references; the registry owns both store and views and enforces
/// lifetime ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramView<S> {
    /// First global index owned by this view.
    pub base: S,
    /// Number of local bins.
    pub n_bins: S,
    /// Values per bin (≥ 1).
    pub stride: S,
}

impl<S: IndexWord> HistogramView<S> {
    /// Build a view covering `[base, base + n_bins · stride)`.
    pub fn new(base: S, n_bins: S, stride: S) -> Self {
        Self {
            base,
            n_bins,
            stride,
        }
    }

    /// Map local `(bin, value)` coordinates to a global store index.
    ///
    /// Callers must keep `bin < n_bins` and `value < stride`; the view
    /// performs no range check of its own.
    #[inline]
    pub fn global_index(&self, bin: S, value: S) -> S {
        // base + bin·stride + value
        let offset = S::from_usize(bin.to_usize() * self.stride.to_usize() + value.to_usize());
        debug_assert!(offset.is_some(), "local coordinates overflow index word");
        self.base + offset.unwrap_or(S::ZERO)
    }

    /// Total number of global indices owned by the view.
    pub fn span(&self) -> usize {
        self.n_bins.to_usize() * self.stride.to_usize()
    }

    /// One past the last global index owned by the view.
    pub fn end(&self) -> usize {
        self.base.to_usize() + self.span()
    }

    /// Whether `(bin, value)` is a valid local coordinate pair.
    pub fn in_range(&self, bin: usize, value: usize) -> bool {
        bin < self.n_bins.to_usize() && value < self.stride.to_usize()
    }
}
