//! Self-describing binary snapshots.
//!
//! Stream layout, all integers little-endian:
//!
//! ```text
//! magic "EVHS" | version u32 | tag(T) u32 | tag(S) u32 | tag(U) u32
//! n_total u64 | count u64 | n_total × (weight bits u64, weight_sq bits u64)
//! dropped_fills u64
//! n_entries u64 | per entry:
//!     name len u64 + utf8 bytes
//!     base u64 | n_bins u64 | stride u64
//!     axis kind u8 (0 none, 1 uniform, 2 variable) + parameters
//! xxh3-64 checksum of every preceding byte, u64
//! ```
//!
//! The three type-signature words come first so a reader instantiated
//! with the wrong scalar/index/count types can refuse the stream before
//! touching any payload. Scalars travel as raw IEEE bit patterns, so a
//! round trip is bit-exact, not just approximately equal.

use std::io::{Read, Write};

use xxhash_rust::xxh3::Xxh3;

use evhist_axis::{Axis, OverflowPolicy};
use evhist_core::BinStore;
use evhist_error::{EvhistError, Result};
use evhist_types::{Bin, EventCount, HistogramView, IndexWord, Weight};

use crate::registry::{Entry, Registry};

const MAGIC: [u8; 4] = *b"EVHS";
const FORMAT_VERSION: u32 = 1;

const AXIS_NONE: u8 = 0;
const AXIS_UNIFORM: u8 = 1;
const AXIS_VARIABLE: u8 = 2;

const POLICY_DROP: u8 = 0;
const POLICY_CLAMP: u8 = 1;
const POLICY_FLOW: u8 = 2;

/// Serialize a registry snapshot into `out`.
pub fn write_snapshot<T, S, U, W>(registry: &Registry<T, S, U>, out: W) -> Result<()>
where
    T: Weight,
    S: IndexWord,
    U: EventCount,
    W: Write,
{
    let mut sink = HashingWriter::new(out);
    sink.put_bytes(&MAGIC)?;
    sink.put_u32(FORMAT_VERSION)?;
    sink.put_u32(T::TYPE_TAG)?;
    sink.put_u32(S::TYPE_TAG)?;
    sink.put_u32(U::TYPE_TAG)?;

    let store = registry.snapshot();
    sink.put_u64(store.len() as u64)?;
    sink.put_u64(store.count().to_u64())?;
    for bin in store.bins() {
        sink.put_u64(bin.weight.to_bits_u64())?;
        sink.put_u64(bin.weight_sq.to_bits_u64())?;
    }
    sink.put_u64(registry.dropped_fills())?;

    sink.put_u64(registry.entries.len() as u64)?;
    for entry in &registry.entries {
        sink.put_u64(entry.name.len() as u64)?;
        sink.put_bytes(entry.name.as_bytes())?;
        sink.put_u64(entry.view.base.to_u64())?;
        sink.put_u64(entry.view.n_bins.to_u64())?;
        sink.put_u64(entry.view.stride.to_u64())?;
        write_axis(&mut sink, &entry.axis)?;
    }

    let digest = sink.digest();
    sink.put_u64_unhashed(digest)?;
    tracing::debug!(
        target: "evhist.codec",
        entries = registry.entries.len(),
        n_total = registry.n_total(),
        "snapshot written"
    );
    Ok(())
}

/// Deserialize a registry snapshot from `input`.
///
/// The reader's `T`/`S`/`U` instantiation must match the writer's; a
/// mismatch reports the exact signature field that disagreed.
pub fn read_snapshot<T, S, U, R>(input: R) -> Result<Registry<T, S, U>>
where
    T: Weight,
    S: IndexWord,
    U: EventCount,
    R: Read,
{
    let mut source = HashingReader::new(input);

    let mut magic = [0_u8; 4];
    source.get_bytes(&mut magic)?;
    if magic != MAGIC {
        return Err(EvhistError::corrupt("bad magic"));
    }
    let version = source.get_u32()?;
    if version != FORMAT_VERSION {
        return Err(EvhistError::corrupt(format!(
            "unsupported format version {version}"
        )));
    }
    check_tag("weight scalar", source.get_u32()?, T::TYPE_TAG)?;
    check_tag("index word", source.get_u32()?, S::TYPE_TAG)?;
    check_tag("event count", source.get_u32()?, U::TYPE_TAG)?;

    let n_total_raw = source.get_u64()?;
    let Some(n_total_s) = S::from_u64(n_total_raw) else {
        return Err(EvhistError::corrupt("total bin count exceeds index word"));
    };
    let n_total = n_total_s.to_usize();
    let count = U::from_u64(source.get_u64()?)
        .ok_or_else(|| EvhistError::corrupt("event count exceeds counter type"))?;
    let mut bins = Vec::with_capacity(n_total);
    for _ in 0..n_total {
        let weight = T::from_bits_u64(source.get_u64()?);
        let weight_sq = T::from_bits_u64(source.get_u64()?);
        bins.push(Bin { weight, weight_sq });
    }
    let dropped_fills = source.get_u64()?;

    let n_entries = source.get_u64()?;
    let mut entries = Vec::new();
    let mut cursor = 0_usize;
    for _ in 0..n_entries {
        let name_len = source.get_u64()? as usize;
        let mut raw_name = vec![0_u8; name_len];
        source.get_bytes(&mut raw_name)?;
        let name = String::from_utf8(raw_name)
            .map_err(|_| EvhistError::corrupt("histogram name is not UTF-8"))?;

        let base = source.get_u64()?;
        let n_bins = source.get_u64()?;
        let stride = source.get_u64()?;
        let (Some(base), Some(n_bins), Some(stride)) =
            (S::from_u64(base), S::from_u64(n_bins), S::from_u64(stride))
        else {
            return Err(EvhistError::corrupt("view field exceeds index word"));
        };
        let view = HistogramView::new(base, n_bins, stride);
        if view.base.to_usize() != cursor || view.end() > n_total {
            return Err(EvhistError::corrupt("views do not tile the store"));
        }
        cursor = view.end();

        let axis = read_axis::<T, _>(&mut source)?;
        if axis.total_bins() != view.n_bins.to_usize() {
            return Err(EvhistError::corrupt("axis span disagrees with view"));
        }
        entries.push(Entry { name, view, axis });
    }
    if cursor != n_total {
        return Err(EvhistError::corrupt("views do not cover the store"));
    }

    let expected = source.digest();
    let stored = source.get_u64_unhashed()?;
    if stored != expected {
        return Err(EvhistError::corrupt(format!(
            "checksum mismatch: stored {stored:#018x}, computed {expected:#018x}"
        )));
    }

    // Re-check name uniqueness rather than trusting the stream.
    for (index, entry) in entries.iter().enumerate() {
        if entries[..index].iter().any(|prior| prior.name == entry.name) {
            return Err(EvhistError::DuplicateName {
                name: entry.name.clone(),
            });
        }
    }

    tracing::debug!(
        target: "evhist.codec",
        entries = entries.len(),
        n_total,
        "snapshot read"
    );
    Ok(Registry::from_parts(
        entries,
        n_total,
        BinStore::from_parts(bins, count),
        dropped_fills,
    ))
}

fn check_tag(field: &'static str, found: u32, expected: u32) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(EvhistError::TypeMismatch {
            field,
            found,
            expected,
        })
    }
}

fn write_axis<T: Weight, W: Write>(sink: &mut HashingWriter<W>, axis: &Axis<T>) -> Result<()> {
    match axis {
        Axis::None { n_bins } => {
            sink.put_u8(AXIS_NONE)?;
            sink.put_u64(*n_bins as u64)?;
        }
        Axis::Uniform {
            n_bins,
            lo,
            hi,
            policy,
        } => {
            sink.put_u8(AXIS_UNIFORM)?;
            sink.put_u64(*n_bins as u64)?;
            sink.put_u64(lo.to_bits_u64())?;
            sink.put_u64(hi.to_bits_u64())?;
            sink.put_u8(encode_policy(*policy))?;
        }
        Axis::Variable { edges, policy } => {
            sink.put_u8(AXIS_VARIABLE)?;
            sink.put_u64(edges.len() as u64)?;
            for edge in edges {
                sink.put_u64(edge.to_bits_u64())?;
            }
            sink.put_u8(encode_policy(*policy))?;
        }
    }
    Ok(())
}

fn read_axis<T: Weight, R: Read>(source: &mut HashingReader<R>) -> Result<Axis<T>> {
    match source.get_u8()? {
        AXIS_NONE => Ok(Axis::None {
            n_bins: source.get_u64()? as usize,
        }),
        AXIS_UNIFORM => {
            let n_bins = source.get_u64()? as usize;
            let lo = T::from_bits_u64(source.get_u64()?);
            let hi = T::from_bits_u64(source.get_u64()?);
            let policy = decode_policy(source.get_u8()?)?;
            Axis::uniform(n_bins, lo, hi, policy)
        }
        AXIS_VARIABLE => {
            let n_edges = source.get_u64()? as usize;
            let mut edges = Vec::with_capacity(n_edges.min(1 << 20));
            for _ in 0..n_edges {
                edges.push(T::from_bits_u64(source.get_u64()?));
            }
            let policy = decode_policy(source.get_u8()?)?;
            Axis::variable(edges, policy)
        }
        kind => Err(EvhistError::corrupt(format!("unknown axis kind {kind}"))),
    }
}

fn encode_policy(policy: OverflowPolicy) -> u8 {
    match policy {
        OverflowPolicy::Drop => POLICY_DROP,
        OverflowPolicy::Clamp => POLICY_CLAMP,
        OverflowPolicy::Flow => POLICY_FLOW,
    }
}

fn decode_policy(raw: u8) -> Result<OverflowPolicy> {
    match raw {
        POLICY_DROP => Ok(OverflowPolicy::Drop),
        POLICY_CLAMP => Ok(OverflowPolicy::Clamp),
        POLICY_FLOW => Ok(OverflowPolicy::Flow),
        other => Err(EvhistError::corrupt(format!(
            "unknown overflow policy {other}"
        ))),
    }
}

/// Writer that folds every hashed byte into a rolling xxh3 digest.
struct HashingWriter<W> {
    out: W,
    hasher: Xxh3,
}

impl<W: Write> HashingWriter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            hasher: Xxh3::new(),
        }
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.hasher.update(bytes);
        self.out.write_all(bytes)?;
        Ok(())
    }

    fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_bytes(&[value])
    }

    fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    fn put_u64(&mut self, value: u64) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    /// The trailing checksum itself must not contribute to the digest.
    fn put_u64_unhashed(&mut self, value: u64) -> Result<()> {
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn digest(&self) -> u64 {
        self.hasher.digest()
    }
}

/// Reader mirroring [`HashingWriter`]'s digest discipline.
struct HashingReader<R> {
    input: R,
    hasher: Xxh3,
}

impl<R: Read> HashingReader<R> {
    fn new(input: R) -> Self {
        Self {
            input,
            hasher: Xxh3::new(),
        }
    }

    fn get_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf)?;
        self.hasher.update(buf);
        Ok(())
    }

    fn get_u8(&mut self) -> Result<u8> {
        let mut buf = [0_u8; 1];
        self.get_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn get_u32(&mut self) -> Result<u32> {
        let mut buf = [0_u8; 4];
        self.get_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn get_u64(&mut self) -> Result<u64> {
        let mut buf = [0_u8; 8];
        self.get_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn get_u64_unhashed(&mut self) -> Result<u64> {
        let mut buf = [0_u8; 8];
        self.input.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn digest(&self) -> u64 {
        self.hasher.digest()
    }
}
