//! Error types shared across the evhist workspace.
//!
//! A single enum covers every failure surface: buffer construction,
//! per-event fill capacity, registry booking and lookup, snapshot codec
//! mismatches, and I/O. Hot-path operations that are specified to be
//! infallible (`flush`, store accumulation) take no error path at all.

use thiserror::Error;

/// Convenience alias used by every fallible evhist operation.
pub type Result<T> = std::result::Result<T, EvhistError>;

/// All errors produced by the evhist engine.
#[derive(Debug, Error)]
pub enum EvhistError {
    /// The requested bin count cannot be packed into the index word with
    /// the minimum number of generation bits to spare.
    #[error(
        "index capacity exceeded: {n_total} bins need {required_bits} index bits \
         but the {word_bits}-bit index word must keep at least {min_gen_bits} generation bits"
    )]
    IndexCapacity {
        /// Total bins requested at buffer construction.
        n_total: usize,
        /// Index bits needed to address the dense arrays.
        required_bits: u32,
        /// Width of the configured index word type.
        word_bits: u32,
        /// Generation-bit floor that was violated.
        min_gen_bits: u32,
    },

    /// One event touched more distinct bins than the dense index can
    /// represent. Fatal for the event; the buffer should be flushed or
    /// discarded.
    #[error("dense index overflow: event touched more than {capacity} distinct bins")]
    DenseIndexOverflow {
        /// Largest representable distinct-bin count for this buffer.
        capacity: usize,
    },

    /// A histogram with this name is already booked.
    #[error("duplicate histogram name: {name:?}")]
    DuplicateName {
        /// The offending name.
        name: String,
    },

    /// No histogram with this name is booked.
    #[error("no histogram named {name:?}")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A snapshot stream was written with different scalar/index/count
    /// types than the reader expects.
    #[error("type signature mismatch for {field}: stream has {found:#06x}, expected {expected:#06x}")]
    TypeMismatch {
        /// Which of the three signature words disagreed.
        field: &'static str,
        /// Tag found in the stream.
        found: u32,
        /// Tag the reader was instantiated with.
        expected: u32,
    },

    /// An id, bin, or value index fell outside its valid range.
    #[error("{what} out of range: {value}")]
    OutOfRange {
        /// Description of the offending quantity.
        what: String,
        /// The rejected value, stringified.
        value: String,
    },

    /// Booking was attempted after a fill buffer fixed the store layout.
    #[error("registry is sealed: {reason}")]
    RegistrySealed {
        /// What sealed it.
        reason: String,
    },

    /// A snapshot stream is structurally damaged.
    #[error("corrupt snapshot stream: {reason}")]
    CorruptStream {
        /// What failed to validate.
        reason: String,
    },

    /// Underlying I/O failure while reading or writing a snapshot.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An internal invariant was violated. Always a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EvhistError {
    /// Construct an [`EvhistError::Internal`] from anything displayable.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Construct an [`EvhistError::OutOfRange`] for the named quantity.
    pub fn out_of_range(what: impl Into<String>, value: impl ToString) -> Self {
        Self::OutOfRange {
            what: what.into(),
            value: value.to_string(),
        }
    }

    /// Construct an [`EvhistError::CorruptStream`].
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptStream {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_diagnostic_fields() {
        let err = EvhistError::IndexCapacity {
            n_total: 1 << 29,
            required_bits: 30,
            word_bits: 32,
            min_gen_bits: 4,
        };
        let text = err.to_string();
        assert!(text.contains("30 index bits"));
        assert!(text.contains("32-bit"));

        let err = EvhistError::TypeMismatch {
            field: "scalar",
            found: 0x0120,
            expected: 0x0140,
        };
        assert!(err.to_string().contains("scalar"));
    }

    #[test]
    fn helpers_round_trip_their_inputs() {
        let err = EvhistError::out_of_range("bin index", 17);
        assert!(matches!(err, EvhistError::OutOfRange { .. }));
        assert!(err.to_string().contains("17"));

        let err = EvhistError::internal("unreachable merge state");
        assert!(err.to_string().contains("unreachable merge state"));
    }
}
