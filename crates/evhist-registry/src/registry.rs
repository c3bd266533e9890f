//! The histogram registry.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use evhist_axis::{Axis, BinLocation};
use evhist_core::accum::Accumulator;
use evhist_core::{BinStore, BufferConfig, FillBuffer, SharedStore};
use evhist_error::{EvhistError, Result};
use evhist_types::{EventCount, HistogramId, HistogramView, IndexWord, Weight};

/// One booked histogram: its name, its window into the store, and the
/// axis that resolves coordinates for it.
#[derive(Debug, Clone)]
pub(crate) struct Entry<T, S> {
    pub(crate) name: String,
    pub(crate) view: HistogramView<S>,
    pub(crate) axis: Axis<T>,
}

/// Owns views, names, and axes; allocates global-store ranges.
///
/// Booking happens up front; the first buffer created against the
/// registry seals the layout, after which the bin count is fixed for the
/// registry's lifetime. Workers then share the registry immutably:
/// `fill_*` and `flush` take `&self`.
#[derive(Debug)]
pub struct Registry<T, S = u32, U = u64> {
    pub(crate) entries: Vec<Entry<T, S>>,
    pub(crate) n_total: usize,
    pub(crate) store: OnceLock<SharedStore<T, U>>,
    pub(crate) dropped_fills: AtomicU64,
}

impl<T: Weight, S: IndexWord, U: EventCount> Default for Registry<T, S, U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Weight, S: IndexWord, U: EventCount> Registry<T, S, U> {
    /// An empty, unsealed registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            n_total: 0,
            store: OnceLock::new(),
            dropped_fills: AtomicU64::new(0),
        }
    }

    pub(crate) fn from_parts(
        entries: Vec<Entry<T, S>>,
        n_total: usize,
        store: BinStore<T, U>,
        dropped_fills: u64,
    ) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(SharedStore::from_store(store));
        Self {
            entries,
            n_total,
            store: cell,
            dropped_fills: AtomicU64::new(dropped_fills),
        }
    }

    // ------------------------------------------------------------------
    // Booking
    // ------------------------------------------------------------------

    /// Book a histogram by bin count alone (no coordinate axis).
    pub fn book(
        &mut self,
        name: impl Into<String>,
        n_bins: usize,
        values_per_bin: usize,
    ) -> Result<HistogramId> {
        self.book_with_axis(name, Axis::None { n_bins }, values_per_bin)
    }

    /// Book a histogram behind an axis; the axis decides the bin span
    /// (including flow bins where its policy demands them).
    pub fn book_with_axis(
        &mut self,
        name: impl Into<String>,
        axis: Axis<T>,
        values_per_bin: usize,
    ) -> Result<HistogramId> {
        let name = name.into();
        if self.store.get().is_some() {
            return Err(EvhistError::RegistrySealed {
                reason: "a fill buffer has fixed the store layout".to_owned(),
            });
        }
        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(EvhistError::DuplicateName { name });
        }
        let n_bins = axis.total_bins();
        if n_bins == 0 {
            return Err(EvhistError::out_of_range("histogram bin count", 0));
        }
        if values_per_bin == 0 {
            return Err(EvhistError::out_of_range("values per bin", 0));
        }

        let span = n_bins * values_per_bin;
        let end = self.n_total + span;
        let (Some(base), Some(bins), Some(stride), Some(_end)) = (
            S::from_usize(self.n_total),
            S::from_usize(n_bins),
            S::from_usize(values_per_bin),
            S::from_usize(end),
        ) else {
            return Err(EvhistError::out_of_range("global index span", end));
        };
        let raw_id = u32::try_from(self.entries.len())
            .map_err(|_| EvhistError::out_of_range("histogram id", self.entries.len()))?;

        tracing::debug!(
            target: "evhist.registry",
            name = %name,
            base = self.n_total,
            n_bins,
            values_per_bin,
            "histogram booked"
        );

        self.entries.push(Entry {
            name,
            view: HistogramView::new(base, bins, stride),
            axis,
        });
        self.n_total = end;
        Ok(HistogramId::new(raw_id))
    }

    // ------------------------------------------------------------------
    // Buffers and filling
    // ------------------------------------------------------------------

    fn shared_store(&self) -> &SharedStore<T, U> {
        self.store.get_or_init(|| {
            tracing::debug!(
                target: "evhist.registry",
                n_total = self.n_total,
                "store layout sealed"
            );
            SharedStore::new(self.n_total)
        })
    }

    /// Create a worker buffer. The first call seals the registry.
    pub fn create_buffer(&self, reserve: usize) -> Result<FillBuffer<T, S>> {
        self.create_buffer_with(BufferConfig {
            reserve,
            ..BufferConfig::default()
        })
    }

    /// Create a worker buffer with an explicit configuration and
    /// accumulator choice.
    pub fn create_buffer_with<A>(&self, config: BufferConfig) -> Result<FillBuffer<T, S, A>>
    where
        A: Accumulator<T>,
    {
        let _ = self.shared_store();
        FillBuffer::with_config(self.n_total, config)
    }

    fn entry(&self, id: HistogramId) -> Result<&Entry<T, S>> {
        self.entries
            .get(id.index())
            .ok_or_else(|| EvhistError::out_of_range("histogram id", id.get()))
    }

    fn resolve(&self, id: HistogramId, bin: usize, value: usize) -> Result<S> {
        let entry = self.entry(id)?;
        if !entry.view.in_range(bin, value) {
            return Err(EvhistError::out_of_range(
                "local bin/value index",
                format!("({bin}, {value})"),
            ));
        }
        let (Some(bin), Some(value)) = (S::from_usize(bin), S::from_usize(value)) else {
            return Err(EvhistError::out_of_range("local index", bin));
        };
        Ok(entry.view.global_index(bin, value))
    }

    /// Stage a weight for `(id, local_bin)`, value column 0.
    pub fn fill<A: Accumulator<T>>(
        &self,
        buffer: &mut FillBuffer<T, S, A>,
        id: HistogramId,
        bin: usize,
        w: T,
    ) -> Result<()> {
        self.fill_value(buffer, id, bin, 0, w)
    }

    /// Stage a weight for `(id, local_bin, value_column)`.
    pub fn fill_value<A: Accumulator<T>>(
        &self,
        buffer: &mut FillBuffer<T, S, A>,
        id: HistogramId,
        bin: usize,
        value: usize,
        w: T,
    ) -> Result<()> {
        let gid = self.resolve(id, bin, value)?;
        buffer.fill(gid, w)
    }

    /// Stage several value columns of one bin in a single call.
    pub fn fill_values<A: Accumulator<T>>(
        &self,
        buffer: &mut FillBuffer<T, S, A>,
        id: HistogramId,
        bin: usize,
        weights: &[T],
    ) -> Result<()> {
        // Resolve every column before the first fill so a bad index
        // cannot leave the event half-staged.
        let mut resolved: SmallVec<[S; 8]> = SmallVec::new();
        for value in 0..weights.len() {
            resolved.push(self.resolve(id, bin, value)?);
        }
        for (gid, &w) in resolved.into_iter().zip(weights) {
            buffer.fill(gid, w)?;
        }
        Ok(())
    }

    /// Axis-driven fill: locate `x` on the histogram's axis, then stage
    /// `w` in the resulting bin. Coordinates the axis discards count as
    /// dropped fills instead of erroring.
    pub fn fill_coord<A: Accumulator<T>>(
        &self,
        buffer: &mut FillBuffer<T, S, A>,
        id: HistogramId,
        x: T,
        w: T,
    ) -> Result<()> {
        self.fill_coord_value(buffer, id, x, 0, w)
    }

    /// Axis-driven fill into a specific value column.
    pub fn fill_coord_value<A: Accumulator<T>>(
        &self,
        buffer: &mut FillBuffer<T, S, A>,
        id: HistogramId,
        x: T,
        value: usize,
        w: T,
    ) -> Result<()> {
        let entry = self.entry(id)?;
        match entry.axis.locate(x) {
            BinLocation::Bin(bin) => self.fill_value(buffer, id, bin, value, w),
            BinLocation::Discard => {
                self.dropped_fills.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// End-of-event merge of a worker buffer into the shared store.
    pub fn flush<A: Accumulator<T>>(&self, buffer: &mut FillBuffer<T, S, A>) {
        self.shared_store().flush_from(buffer);
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Find a histogram by name. Names are unique; the search is the
    /// specified linear scan.
    pub fn id(&self, name: &str) -> Result<HistogramId> {
        self.entries
            .iter()
            .position(|entry| entry.name == name)
            .map(|index| HistogramId::new(index as u32))
            .ok_or_else(|| EvhistError::NotFound {
                name: name.to_owned(),
            })
    }

    /// The name a histogram was booked under.
    pub fn name(&self, id: HistogramId) -> Result<&str> {
        Ok(self.entry(id)?.name.as_str())
    }

    /// The view (base, bin count, stride) of a histogram.
    pub fn view(&self, id: HistogramId) -> Result<HistogramView<S>> {
        Ok(self.entry(id)?.view)
    }

    /// The axis a histogram was booked with.
    pub fn axis(&self, id: HistogramId) -> Result<&Axis<T>> {
        Ok(&self.entry(id)?.axis)
    }

    /// Ids of all booked histograms, in booking order.
    pub fn ids(&self) -> impl Iterator<Item = HistogramId> + '_ {
        (0..self.entries.len()).map(|index| HistogramId::new(index as u32))
    }

    /// Number of booked histograms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is booked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total global bins across all views.
    pub fn n_total(&self) -> usize {
        self.n_total
    }

    /// Axis-driven fills suppressed by a `Drop` policy so far.
    pub fn dropped_fills(&self) -> u64 {
        self.dropped_fills.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Derived statistics and store-wide operations
    // ------------------------------------------------------------------

    /// Events flushed into the store.
    pub fn event_count(&self) -> U {
        self.store
            .get()
            .map_or(U::ZERO, |store| store.lock().count())
    }

    /// Mean weight per event for `(id, bin, value)`.
    pub fn bin_value(&self, id: HistogramId, bin: usize, value: usize) -> Result<T> {
        let gid = self.resolve(id, bin, value)?.to_usize();
        Ok(self
            .store
            .get()
            .map_or(T::ZERO, |store| store.lock().mean(gid)))
    }

    /// Variance of the mean for `(id, bin, value)`.
    pub fn bin_variance(&self, id: HistogramId, bin: usize, value: usize) -> Result<T> {
        let gid = self.resolve(id, bin, value)?.to_usize();
        Ok(self
            .store
            .get()
            .map_or(T::ZERO, |store| store.lock().variance_of_mean(gid)))
    }

    /// Statistical error for `(id, bin, value)`.
    pub fn bin_error(&self, id: HistogramId, bin: usize, value: usize) -> Result<T> {
        let gid = self.resolve(id, bin, value)?.to_usize();
        Ok(self
            .store
            .get()
            .map_or(T::ZERO, |store| store.lock().error(gid)))
    }

    /// Owned copy of the store state (empty bins if nothing flushed yet).
    pub fn snapshot(&self) -> BinStore<T, U> {
        self.store
            .get()
            .map_or_else(|| BinStore::new(self.n_total), SharedStore::snapshot)
    }

    /// Rescale every bin in the store (weights by `factor`, squared
    /// weights by `factor²`).
    pub fn scale(&self, factor: T) {
        self.shared_store().lock().scale(factor);
    }

    /// Merge a disjoint run's store (e.g. a deserialized snapshot from
    /// another job) into this registry's store.
    pub fn merge_store(&self, other: &BinStore<T, U>) -> Result<()> {
        self.shared_store().lock().merge(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evhist_axis::OverflowPolicy;

    type Reg = Registry<f64, u32, u64>;

    #[test]
    fn booking_allocates_contiguous_views() {
        let mut reg = Reg::new();
        let a = reg.book("a", 4, 1).expect("book a");
        let b = reg.book("b", 3, 2).expect("book b");
        let va = reg.view(a).expect("view a");
        let vb = reg.view(b).expect("view b");
        assert_eq!(va.base, 0);
        assert_eq!(va.end(), 4);
        assert_eq!(vb.base, 4);
        assert_eq!(vb.end(), 10);
        assert_eq!(reg.n_total(), 10);
    }

    #[test]
    fn duplicate_names_fail_before_allocating() {
        let mut reg = Reg::new();
        reg.book("h", 4, 1).expect("first booking");
        let err = reg.book("h", 8, 1).expect_err("duplicate");
        assert!(matches!(err, EvhistError::DuplicateName { .. }));
        assert_eq!(reg.n_total(), 4);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn booking_after_seal_is_rejected() {
        let mut reg = Reg::new();
        reg.book("h", 4, 1).expect("book");
        let _buf = reg.create_buffer(8).expect("buffer");
        let err = reg.book("late", 2, 1).expect_err("sealed");
        assert!(matches!(err, EvhistError::RegistrySealed { .. }));
    }

    #[test]
    fn lookup_is_by_exact_name() {
        let mut reg = Reg::new();
        let id = reg.book("pt_spectrum", 4, 1).expect("book");
        assert_eq!(reg.id("pt_spectrum").expect("found"), id);
        assert_eq!(reg.name(id).expect("named"), "pt_spectrum");
        assert!(matches!(
            reg.id("eta_spectrum"),
            Err(EvhistError::NotFound { .. })
        ));
    }

    #[test]
    fn fill_and_flush_reach_the_right_global_bins() {
        let mut reg = Reg::new();
        let a = reg.book("a", 4, 1).expect("book a");
        let b = reg.book("b", 4, 1).expect("book b");
        let mut buf = reg.create_buffer(8).expect("buffer");

        reg.fill(&mut buf, a, 2, 1.0).expect("fill a");
        reg.fill(&mut buf, b, 2, 10.0).expect("fill b");
        reg.flush(&mut buf);

        let store = reg.snapshot();
        assert_eq!(store.bin(2).weight, 1.0);
        assert_eq!(store.bin(6).weight, 10.0);
        assert_eq!(store.count(), 1);
        assert_eq!(reg.bin_value(b, 2, 0).expect("mean"), 10.0);
    }

    #[test]
    fn out_of_range_indices_are_rejected_not_misrouted() {
        let mut reg = Reg::new();
        let a = reg.book("a", 4, 2).expect("book");
        let mut buf = reg.create_buffer(8).expect("buffer");
        assert!(reg.fill(&mut buf, a, 4, 1.0).is_err());
        assert!(reg.fill_value(&mut buf, a, 0, 2, 1.0).is_err());
        assert!(
            reg.fill(&mut buf, HistogramId::new(7), 0, 1.0)
                .is_err()
        );
    }

    #[test]
    fn coordinate_fills_honor_the_drop_policy() {
        let mut reg = Reg::new();
        let axis = Axis::uniform(4, 0.0, 4.0, OverflowPolicy::Drop).expect("axis");
        let id = reg.book_with_axis("h", axis, 1).expect("book");
        let mut buf = reg.create_buffer(8).expect("buffer");

        reg.fill_coord(&mut buf, id, 2.5, 1.0).expect("in range");
        reg.fill_coord(&mut buf, id, 99.0, 1.0).expect("dropped");
        reg.flush(&mut buf);

        assert_eq!(reg.dropped_fills(), 1);
        let store = reg.snapshot();
        assert_eq!(store.bin(2).weight, 1.0);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn flow_axis_routes_overflow_to_flanking_bins() {
        let mut reg = Reg::new();
        let axis = Axis::uniform(4, 0.0, 4.0, OverflowPolicy::Flow).expect("axis");
        let id = reg.book_with_axis("h", axis, 1).expect("book");
        assert_eq!(reg.view(id).expect("view").n_bins, 6);
        let mut buf = reg.create_buffer(8).expect("buffer");

        reg.fill_coord(&mut buf, id, -5.0, 1.0).expect("underflow");
        reg.fill_coord(&mut buf, id, 0.5, 2.0).expect("first bin");
        reg.fill_coord(&mut buf, id, 9.0, 3.0).expect("overflow");
        reg.flush(&mut buf);

        let store = reg.snapshot();
        assert_eq!(store.bin(0).weight, 1.0);
        assert_eq!(store.bin(1).weight, 2.0);
        assert_eq!(store.bin(5).weight, 3.0);
        assert_eq!(reg.dropped_fills(), 0);
    }

    #[test]
    fn multi_value_fill_stages_all_columns() {
        let mut reg = Reg::new();
        let id = reg.book("h", 2, 3).expect("book");
        let mut buf = reg.create_buffer(8).expect("buffer");
        reg.fill_values(&mut buf, id, 1, &[1.0, 2.0, 3.0])
            .expect("fill");
        reg.flush(&mut buf);
        let store = reg.snapshot();
        assert_eq!(store.bin(3).weight, 1.0);
        assert_eq!(store.bin(4).weight, 2.0);
        assert_eq!(store.bin(5).weight, 3.0);
    }

    #[test]
    fn scale_and_merge_compose() {
        let mut reg = Reg::new();
        let id = reg.book("h", 2, 1).expect("book");
        let mut buf = reg.create_buffer(4).expect("buffer");
        reg.fill(&mut buf, id, 0, 2.0).expect("fill");
        reg.flush(&mut buf);

        reg.scale(0.5);
        let other = reg.snapshot();
        reg.merge_store(&other).expect("merge");

        let store = reg.snapshot();
        assert_eq!(store.bin(0).weight, 2.0);
        assert_eq!(store.count(), 2);
    }
}
