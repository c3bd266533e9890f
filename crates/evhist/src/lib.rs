//! High-throughput weighted histogram accumulation for Monte Carlo
//! event generators.
//!
//! Within one event, contributions to the same bin are consolidated to
//! their net weight with compensated arithmetic before the squared
//! weight enters the variance estimate; each worker stages fills in its
//! own buffer and merges into the shared store only at event boundaries.
//!
//! ```
//! use evhist::{Registry, Axis, OverflowPolicy};
//!
//! # fn main() -> evhist::Result<()> {
//! let mut reg = Registry::<f64, u32, u64>::new();
//! let pt = reg.book_with_axis(
//!     "pt",
//!     Axis::uniform(10, 0.0, 100.0, OverflowPolicy::Flow)?,
//!     1,
//! )?;
//!
//! let mut buf = reg.create_buffer(16)?;
//! // One event with two interfering contributions to the same bin.
//! reg.fill_coord(&mut buf, pt, 12.5, 10.0)?;
//! reg.fill_coord(&mut buf, pt, 12.5, -9.9)?;
//! reg.flush(&mut buf);
//!
//! let net = reg.bin_value(pt, 2, 0)?; // bin 1, shifted past the underflow bin
//! assert!((net - 0.1).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

pub use evhist_axis::{Axis, BinLocation, OverflowPolicy};
pub use evhist_core::{
    Accumulator, BinStore, BufferConfig, FillBuffer, NaiveAccumulator, SharedStore, StoreSink,
    TwoSumAccumulator,
};
pub use evhist_error::{EvhistError, Result};
pub use evhist_registry::{JsonPrinter, Printer, Registry, TablePrinter, codec, render};
pub use evhist_types::{Bin, EventCount, HistogramId, HistogramView, IndexWord, Weight};
