//! Accumulation core of the evhist histogram engine.
//!
//! Three tightly coupled pieces live here:
//!
//! - [`accum`]: per-bin event accumulators. The default
//!   [`TwoSumAccumulator`] survives catastrophic cancellation between
//!   interfering contributions; [`NaiveAccumulator`] is a drop-in for
//!   benchmarking the compensation cost.
//! - [`buffer`]: the thread-local [`FillBuffer`], a sparse-to-dense staging
//!   area with a packed generation index, giving O(1) "was this bin
//!   touched this event?" without wiping memory between events.
//! - [`store`]: the global [`BinStore`] of (weight, weight²) pairs plus
//!   the event counter, and the [`SharedStore`] wrapper that makes a
//!   whole flush atomic with respect to its own count increment.
//!
//! The hot path is `buffer.fill(gid, w)`; the store is touched only at
//! event boundaries via `flush`.

pub mod accum;
pub mod buffer;
pub mod store;

pub use accum::{Accumulator, NaiveAccumulator, TwoSumAccumulator};
pub use buffer::{BufferConfig, FillBuffer};
pub use store::{BinStore, NullSink, SharedStore, StoreSink};
