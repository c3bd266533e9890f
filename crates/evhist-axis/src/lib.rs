//! Coordinate-to-bin mapping.
//!
//! An axis turns a physical coordinate into a local bin index inside one
//! histogram's view. Axis kinds are an open-ended tagged sum dispatched
//! at fill time; the accumulation core below this layer never sees a
//! coordinate, only resolved bin indices.

use evhist_error::{EvhistError, Result};
use evhist_types::Weight;
use serde::{Deserialize, Serialize};

/// What to do with a coordinate outside `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suppress the fill. The registry counts suppressed fills.
    Drop,
    /// Map to the nearest in-range bin.
    Clamp,
    /// Route to dedicated underflow/overflow bins flanking the in-range
    /// ones.
    Flow,
}

/// Where a coordinate landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinLocation {
    /// Local bin index within the axis's total bin span.
    Bin(usize),
    /// The coordinate maps to no bin under the axis policy.
    Discard,
}

/// One histogram axis.
///
/// `None` is the degenerate axis of a histogram booked by bin count
/// alone: it has a span but cannot locate coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis<T> {
    /// No coordinate mapping; fills address bins directly.
    None {
        /// Number of bins booked.
        n_bins: usize,
    },
    /// Equal-width bins over `[lo, hi)`.
    Uniform {
        /// In-range bin count (excludes flow bins).
        n_bins: usize,
        /// Inclusive lower edge.
        lo: T,
        /// Exclusive upper edge.
        hi: T,
        /// Out-of-range handling.
        policy: OverflowPolicy,
    },
    /// Arbitrary strictly-increasing bin edges; bin `i` spans
    /// `[edges[i], edges[i+1])`.
    Variable {
        /// `n_bins + 1` strictly increasing edges.
        edges: Vec<T>,
        /// Out-of-range handling.
        policy: OverflowPolicy,
    },
}

impl<T: Weight> Axis<T> {
    /// A uniform axis, validated.
    pub fn uniform(n_bins: usize, lo: T, hi: T, policy: OverflowPolicy) -> Result<Self> {
        if n_bins == 0 {
            return Err(EvhistError::out_of_range("uniform axis bin count", 0));
        }
        if !(lo < hi) || !lo.is_finite() || !hi.is_finite() {
            return Err(EvhistError::out_of_range(
                "uniform axis range",
                format!("[{:?}, {:?})", lo, hi),
            ));
        }
        Ok(Self::Uniform {
            n_bins,
            lo,
            hi,
            policy,
        })
    }

    /// A variable-width axis, validated.
    pub fn variable(edges: Vec<T>, policy: OverflowPolicy) -> Result<Self> {
        if edges.len() < 2 {
            return Err(EvhistError::out_of_range("variable axis edge count", edges.len()));
        }
        let monotone = edges.windows(2).all(|pair| pair[0] < pair[1]);
        if !monotone || edges.iter().any(|edge| !edge.is_finite()) {
            return Err(EvhistError::out_of_range(
                "variable axis edges",
                "must be finite and strictly increasing",
            ));
        }
        Ok(Self::Variable { edges, policy })
    }

    /// In-range bin count, excluding flow bins.
    pub fn n_bins(&self) -> usize {
        match self {
            Self::None { n_bins } | Self::Uniform { n_bins, .. } => *n_bins,
            Self::Variable { edges, .. } => edges.len() - 1,
        }
    }

    /// Bins the registry must book for this axis: the in-range span plus
    /// two flow bins under [`OverflowPolicy::Flow`].
    pub fn total_bins(&self) -> usize {
        self.n_bins() + if self.policy() == Some(OverflowPolicy::Flow) { 2 } else { 0 }
    }

    /// The axis policy; `None` for the degenerate axis.
    pub fn policy(&self) -> Option<OverflowPolicy> {
        match self {
            Self::None { .. } => None,
            Self::Uniform { policy, .. } | Self::Variable { policy, .. } => Some(*policy),
        }
    }

    /// Map a coordinate to a location within `0..total_bins()`.
    ///
    /// NaN coordinates are always discarded, whatever the policy.
    pub fn locate(&self, x: T) -> BinLocation {
        match self {
            Self::None { .. } => BinLocation::Discard,
            Self::Uniform {
                n_bins,
                lo,
                hi,
                policy,
            } => {
                if x.is_nan() {
                    return BinLocation::Discard;
                }
                if x < *lo {
                    return out_of_range_low(*policy);
                }
                if !(x < *hi) {
                    return out_of_range_high(*policy, *n_bins);
                }
                // In-range: linear interpolation, then a guard against
                // the roundoff landing exactly on n_bins.
                let frac = (x - *lo).to_f64() / (*hi - *lo).to_f64();
                let raw = ((frac * *n_bins as f64) as usize).min(n_bins - 1);
                BinLocation::Bin(flow_offset(*policy) + raw)
            }
            Self::Variable { edges, policy } => {
                if x.is_nan() {
                    return BinLocation::Discard;
                }
                let n_bins = edges.len() - 1;
                if x < edges[0] {
                    return out_of_range_low(*policy);
                }
                if !(x < edges[n_bins]) {
                    return out_of_range_high(*policy, n_bins);
                }
                // partition_point gives the count of edges <= x; the bin
                // index is one less.
                let upper = edges.partition_point(|edge| *edge <= x);
                BinLocation::Bin(flow_offset(*policy) + (upper - 1).min(n_bins - 1))
            }
        }
    }
}

/// In-range bins start after the underflow bin under `Flow`.
fn flow_offset(policy: OverflowPolicy) -> usize {
    usize::from(policy == OverflowPolicy::Flow)
}

fn out_of_range_low(policy: OverflowPolicy) -> BinLocation {
    match policy {
        OverflowPolicy::Drop => BinLocation::Discard,
        OverflowPolicy::Clamp => BinLocation::Bin(0),
        OverflowPolicy::Flow => BinLocation::Bin(0),
    }
}

fn out_of_range_high(policy: OverflowPolicy, n_bins: usize) -> BinLocation {
    match policy {
        OverflowPolicy::Drop => BinLocation::Discard,
        OverflowPolicy::Clamp => BinLocation::Bin(n_bins - 1),
        // Flow layout is [under, 0..n_bins, over].
        OverflowPolicy::Flow => BinLocation::Bin(n_bins + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_axis_maps_half_open_ranges() {
        let axis = Axis::uniform(4, 0.0_f64, 4.0, OverflowPolicy::Drop).expect("axis");
        assert_eq!(axis.locate(0.0), BinLocation::Bin(0));
        assert_eq!(axis.locate(0.999), BinLocation::Bin(0));
        assert_eq!(axis.locate(1.0), BinLocation::Bin(1));
        assert_eq!(axis.locate(3.999), BinLocation::Bin(3));
        assert_eq!(axis.locate(4.0), BinLocation::Discard);
        assert_eq!(axis.locate(-0.001), BinLocation::Discard);
    }

    #[test]
    fn clamp_policy_pins_to_edge_bins() {
        let axis = Axis::uniform(4, 0.0_f64, 4.0, OverflowPolicy::Clamp).expect("axis");
        assert_eq!(axis.locate(-100.0), BinLocation::Bin(0));
        assert_eq!(axis.locate(100.0), BinLocation::Bin(3));
        assert_eq!(axis.total_bins(), 4);
    }

    #[test]
    fn flow_policy_reserves_flanking_bins() {
        let axis = Axis::uniform(4, 0.0_f64, 4.0, OverflowPolicy::Flow).expect("axis");
        assert_eq!(axis.total_bins(), 6);
        assert_eq!(axis.locate(-1.0), BinLocation::Bin(0));
        assert_eq!(axis.locate(0.5), BinLocation::Bin(1));
        assert_eq!(axis.locate(3.5), BinLocation::Bin(4));
        assert_eq!(axis.locate(4.0), BinLocation::Bin(5));
    }

    #[test]
    fn variable_axis_respects_edges() {
        let axis =
            Axis::variable(vec![0.0_f64, 1.0, 10.0, 100.0], OverflowPolicy::Drop).expect("axis");
        assert_eq!(axis.n_bins(), 3);
        assert_eq!(axis.locate(0.5), BinLocation::Bin(0));
        assert_eq!(axis.locate(1.0), BinLocation::Bin(1));
        assert_eq!(axis.locate(9.999), BinLocation::Bin(1));
        assert_eq!(axis.locate(99.0), BinLocation::Bin(2));
        assert_eq!(axis.locate(100.0), BinLocation::Discard);
    }

    #[test]
    fn nan_is_always_discarded() {
        for policy in [OverflowPolicy::Drop, OverflowPolicy::Clamp, OverflowPolicy::Flow] {
            let axis = Axis::uniform(2, 0.0_f64, 1.0, policy).expect("axis");
            assert_eq!(axis.locate(f64::NAN), BinLocation::Discard);
        }
    }

    #[test]
    fn degenerate_axis_locates_nothing() {
        let axis = Axis::<f64>::None { n_bins: 8 };
        assert_eq!(axis.total_bins(), 8);
        assert_eq!(axis.locate(0.5), BinLocation::Discard);
    }

    #[test]
    fn validation_rejects_malformed_axes() {
        assert!(Axis::uniform(0, 0.0_f64, 1.0, OverflowPolicy::Drop).is_err());
        assert!(Axis::uniform(4, 1.0_f64, 1.0, OverflowPolicy::Drop).is_err());
        assert!(Axis::uniform(4, 0.0_f64, f64::INFINITY, OverflowPolicy::Drop).is_err());
        assert!(Axis::variable(vec![0.0_f64], OverflowPolicy::Drop).is_err());
        assert!(Axis::variable(vec![0.0_f64, 0.0], OverflowPolicy::Drop).is_err());
        assert!(Axis::variable(vec![1.0_f64, 0.0], OverflowPolicy::Drop).is_err());
    }
}
