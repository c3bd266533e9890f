//! Core type definitions for the evhist histogram engine.
//!
//! Everything here is a plain value type or a capability trait; no state,
//! no locking. The three numeric parameters of the engine are expressed as
//! traits so the accumulation core stays generic over scalar precision,
//! index word width, and event counter width:
//!
//! - [`Weight`]: the weight/coordinate scalar (`f64` in production).
//! - [`IndexWord`]: the unsigned word holding packed generation/index
//!   values and all bin indices.
//! - [`EventCount`]: the unsigned event counter.

mod bin;
mod num;
mod view;

pub use bin::Bin;
pub use num::{EventCount, IndexWord, Weight};
pub use view::{HistogramId, HistogramView};
