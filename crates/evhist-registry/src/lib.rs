//! Booking facade over the accumulation core.
//!
//! The registry owns names, axes, and views, allocates non-overlapping
//! global-index ranges in the shared bin store, and translates
//! `(histogram, coordinates)` into the global indices the fill buffer
//! accepts. Alongside it live the binary snapshot [`codec`] and the
//! pluggable output [`printer`] protocol.

pub mod codec;
pub mod printer;
mod registry;

pub use printer::{JsonPrinter, Printer, TablePrinter, render};
pub use registry::Registry;
