//! Pluggable output formatters.
//!
//! A [`Printer`] receives the registry through a fixed visiting order:
//! reset, global header, then per histogram a header, one call per bin,
//! and a footer, then the global footer. It renders into whatever
//! representation it likes. [`render`] drives that protocol.

use std::fmt::Write as _;

use serde::Serialize;

use evhist_axis::{Axis, OverflowPolicy};
use evhist_types::{EventCount, HistogramId, IndexWord, Weight};

use crate::registry::Registry;

/// JSON schema version for [`JsonPrinter`] output.
pub const REPORT_SCHEMA_V1: &str = "evhist.report.v1";

/// Output formatter protocol.
pub trait Printer<T: Weight, S: IndexWord, U: EventCount> {
    /// Drop any state from a previous rendering.
    fn reset(&mut self);
    /// Called once before any histogram.
    fn global_header(&mut self, registry: &Registry<T, S, U>);
    /// Called before the rows of one histogram.
    fn histogram_header(&mut self, registry: &Registry<T, S, U>, id: HistogramId);
    /// Called once per local bin, in bin order.
    fn histogram_row(&mut self, registry: &Registry<T, S, U>, id: HistogramId, bin: usize);
    /// Called after the rows of one histogram.
    fn histogram_footer(&mut self, registry: &Registry<T, S, U>, id: HistogramId);
    /// Called once after every histogram.
    fn global_footer(&mut self, registry: &Registry<T, S, U>);
    /// The rendered document.
    fn finish(&mut self) -> String;
}

/// Drive the full printer protocol over `registry`.
pub fn render<T, S, U, P>(registry: &Registry<T, S, U>, printer: &mut P) -> String
where
    T: Weight,
    S: IndexWord,
    U: EventCount,
    P: Printer<T, S, U>,
{
    printer.reset();
    printer.global_header(registry);
    for id in registry.ids() {
        printer.histogram_header(registry, id);
        let n_bins = registry
            .view(id)
            .map_or(0, |view| view.n_bins.to_usize());
        for bin in 0..n_bins {
            printer.histogram_row(registry, id, bin);
        }
        printer.histogram_footer(registry, id);
    }
    printer.global_footer(registry);
    printer.finish()
}

/// Human-readable label for one local bin of an axis.
fn bin_label<T: Weight>(axis: &Axis<T>, bin: usize) -> String {
    let flow = axis.policy() == Some(OverflowPolicy::Flow);
    let in_range = axis.n_bins();
    if flow {
        if bin == 0 {
            return "underflow".to_owned();
        }
        if bin == in_range + 1 {
            return "overflow".to_owned();
        }
    }
    let index = if flow { bin - 1 } else { bin };
    match axis {
        Axis::None { .. } => format!("{index}"),
        Axis::Uniform { n_bins, lo, hi, .. } => {
            let width = (hi.to_f64() - lo.to_f64()) / *n_bins as f64;
            let left = lo.to_f64() + width * index as f64;
            format!("[{:.6}, {:.6})", left, left + width)
        }
        Axis::Variable { edges, .. } => format!(
            "[{:.6}, {:.6})",
            edges[index].to_f64(),
            edges[index + 1].to_f64()
        ),
    }
}

/// Short description of an axis for headers.
fn axis_summary<T: Weight>(axis: &Axis<T>) -> String {
    match axis {
        Axis::None { n_bins } => format!("{n_bins} bins"),
        Axis::Uniform {
            n_bins,
            lo,
            hi,
            policy,
        } => format!(
            "uniform [{:.6}, {:.6}), {n_bins} bins, {policy:?}",
            lo.to_f64(),
            hi.to_f64()
        ),
        Axis::Variable { edges, policy } => format!(
            "variable [{:.6}, {:.6}), {} bins, {policy:?}",
            edges[0].to_f64(),
            edges[edges.len() - 1].to_f64(),
            edges.len() - 1
        ),
    }
}

/// Column-aligned plain-text table.
#[derive(Debug, Default)]
pub struct TablePrinter {
    out: String,
}

impl TablePrinter {
    /// A fresh table printer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Weight, S: IndexWord, U: EventCount> Printer<T, S, U> for TablePrinter {
    fn reset(&mut self) {
        self.out.clear();
    }

    fn global_header(&mut self, registry: &Registry<T, S, U>) {
        let _ = writeln!(
            self.out,
            "evhist report: {} histograms, {} events, {} dropped fills",
            registry.len(),
            registry.event_count().to_u64(),
            registry.dropped_fills()
        );
    }

    fn histogram_header(&mut self, registry: &Registry<T, S, U>, id: HistogramId) {
        let name = registry.name(id).unwrap_or("?");
        let axis = registry
            .axis(id)
            .map_or_else(|_| String::new(), axis_summary);
        let _ = writeln!(self.out, "\n-- {name} ({axis}) --");
        let _ = writeln!(self.out, "{:>12}  {:<26}  value +- error", "bin", "range");
    }

    fn histogram_row(&mut self, registry: &Registry<T, S, U>, id: HistogramId, bin: usize) {
        let Ok(axis) = registry.axis(id) else { return };
        let Ok(view) = registry.view(id) else { return };
        let label = bin_label(axis, bin);
        let _ = write!(self.out, "{:>12}  {:<26}", bin, label);
        for value in 0..view.stride.to_usize() {
            let mean = registry
                .bin_value(id, bin, value)
                .map_or(f64::NAN, Weight::to_f64);
            let error = registry
                .bin_error(id, bin, value)
                .map_or(f64::NAN, Weight::to_f64);
            let _ = write!(self.out, "  {mean:>14.6e} +- {error:>12.6e}");
        }
        let _ = writeln!(self.out);
    }

    fn histogram_footer(&mut self, registry: &Registry<T, S, U>, id: HistogramId) {
        let name = registry.name(id).unwrap_or("?");
        let _ = writeln!(self.out, "-- end {name} --");
    }

    fn global_footer(&mut self, _registry: &Registry<T, S, U>) {}

    fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ValueReport {
    mean: f64,
    error: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BinReport {
    bin: usize,
    label: String,
    values: Vec<ValueReport>,
}

#[derive(Debug, Clone, Serialize)]
struct HistogramReport {
    name: String,
    axis: String,
    bins: Vec<BinReport>,
}

#[derive(Debug, Clone, Serialize)]
struct Report {
    schema_version: String,
    events: u64,
    dropped_fills: u64,
    histograms: Vec<HistogramReport>,
}

/// Machine-readable JSON document in the `evhist.report.v1` schema.
#[derive(Debug, Default)]
pub struct JsonPrinter {
    events: u64,
    dropped_fills: u64,
    histograms: Vec<HistogramReport>,
}

impl JsonPrinter {
    /// A fresh JSON printer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Weight, S: IndexWord, U: EventCount> Printer<T, S, U> for JsonPrinter {
    fn reset(&mut self) {
        self.events = 0;
        self.dropped_fills = 0;
        self.histograms.clear();
    }

    fn global_header(&mut self, registry: &Registry<T, S, U>) {
        self.events = registry.event_count().to_u64();
        self.dropped_fills = registry.dropped_fills();
    }

    fn histogram_header(&mut self, registry: &Registry<T, S, U>, id: HistogramId) {
        self.histograms.push(HistogramReport {
            name: registry.name(id).unwrap_or("?").to_owned(),
            axis: registry
                .axis(id)
                .map_or_else(|_| String::new(), axis_summary),
            bins: Vec::new(),
        });
    }

    fn histogram_row(&mut self, registry: &Registry<T, S, U>, id: HistogramId, bin: usize) {
        let Ok(axis) = registry.axis(id) else { return };
        let Ok(view) = registry.view(id) else { return };
        let values = (0..view.stride.to_usize())
            .map(|value| ValueReport {
                mean: registry
                    .bin_value(id, bin, value)
                    .map_or(f64::NAN, Weight::to_f64),
                error: registry
                    .bin_error(id, bin, value)
                    .map_or(f64::NAN, Weight::to_f64),
            })
            .collect();
        if let Some(report) = self.histograms.last_mut() {
            report.bins.push(BinReport {
                bin,
                label: bin_label(axis, bin),
                values,
            });
        }
    }

    fn histogram_footer(&mut self, _registry: &Registry<T, S, U>, _id: HistogramId) {}

    fn global_footer(&mut self, _registry: &Registry<T, S, U>) {}

    fn finish(&mut self) -> String {
        let report = Report {
            schema_version: REPORT_SCHEMA_V1.to_owned(),
            events: self.events,
            dropped_fills: self.dropped_fills,
            histograms: std::mem::take(&mut self.histograms),
        };
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_owned())
    }
}
