//! Numeric capability traits fixed at engine construction.
//!
//! Type tags follow a `(class << 8) | bit_width` scheme: class 1 is an
//! IEEE float, class 2 an unsigned integer. The tags are written into
//! snapshot streams as the self-describing type signature, so changing a
//! tag is a wire-format break.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, BitAnd, BitOr, Div, Mul, Neg, Shl, Shr, Sub, SubAssign};

use serde::Serialize;
use serde::de::DeserializeOwned;

const TAG_CLASS_FLOAT: u32 = 1;
const TAG_CLASS_UNSIGNED: u32 = 2;

/// Weight/coordinate scalar: an IEEE float wide enough for the workload.
///
/// The engine only assumes field arithmetic, comparison, and a handful of
/// conversions; everything else (compensation, statistics) is built from
/// these.
pub trait Weight:
    Copy
    + Debug
    + Default
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + 'static
{
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;
    /// Snapshot type signature for this scalar.
    const TYPE_TAG: u32;

    /// Lossy conversion from an event count, used as a statistics divisor.
    fn from_count(n: u64) -> Self;
    /// Square root (error = sqrt of variance).
    fn sqrt(self) -> Self;
    /// Absolute value.
    fn abs(self) -> Self;
    /// True for anything that is neither infinite nor NaN.
    fn is_finite(self) -> bool;
    /// True for NaN payloads.
    fn is_nan(self) -> bool;
    /// Widening conversion for printers and axis interpolation.
    fn to_f64(self) -> f64;
    /// Narrowing conversion from `f64` (codec, printers).
    fn from_f64(v: f64) -> Self;
    /// Raw bit pattern, zero-extended to 64 bits, for exact snapshots.
    fn to_bits_u64(self) -> u64;
    /// Inverse of [`Weight::to_bits_u64`].
    fn from_bits_u64(bits: u64) -> Self;
}

impl Weight for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TYPE_TAG: u32 = (TAG_CLASS_FLOAT << 8) | 64;

    #[inline]
    fn from_count(n: u64) -> Self {
        n as f64
    }
    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }
    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
    #[inline]
    fn to_bits_u64(self) -> u64 {
        self.to_bits()
    }
    #[inline]
    fn from_bits_u64(bits: u64) -> Self {
        Self::from_bits(bits)
    }
}

impl Weight for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TYPE_TAG: u32 = (TAG_CLASS_FLOAT << 8) | 32;

    #[inline]
    fn from_count(n: u64) -> Self {
        n as f32
    }
    #[inline]
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
    #[inline]
    fn abs(self) -> Self {
        f32::abs(self)
    }
    #[inline]
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
    #[inline]
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    #[inline]
    fn to_bits_u64(self) -> u64 {
        u64::from(self.to_bits())
    }
    #[inline]
    fn from_bits_u64(bits: u64) -> Self {
        Self::from_bits(bits as u32)
    }
}

/// Unsigned word used for all bin indices and the packed generation word.
///
/// The packed layout is `(generation << shift) | dense_index`; the buffer
/// derives the split at construction, so the trait only exposes width,
/// shifts, masks, and conversions.
pub trait IndexWord:
    Copy
    + Debug
    + Default
    + Eq
    + Ord
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + 'static
{
    /// Word width in bits.
    const BITS: u32;
    /// Zero word; also the never-touched sentinel in the sparse map.
    const ZERO: Self;
    /// The value one.
    const ONE: Self;
    /// All-ones word.
    const MAX: Self;
    /// Snapshot type signature for this word.
    const TYPE_TAG: u32;

    /// Checked conversion from `usize`; `None` if the value does not fit.
    fn from_usize(n: usize) -> Option<Self>;
    /// Conversion to `usize`. Values stored by the engine always fit,
    /// because they index in-memory arrays.
    fn to_usize(self) -> usize;
    /// Widening conversion for the snapshot codec.
    fn to_u64(self) -> u64;
    /// Checked conversion from `u64`; `None` if the value does not fit.
    fn from_u64(v: u64) -> Option<Self>;
}

macro_rules! impl_index_word {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IndexWord for $ty {
                const BITS: u32 = <$ty>::BITS;
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const MAX: Self = <$ty>::MAX;
                const TYPE_TAG: u32 = (TAG_CLASS_UNSIGNED << 8) | <$ty>::BITS;

                #[inline]
                fn from_usize(n: usize) -> Option<Self> {
                    Self::try_from(n).ok()
                }
                #[inline]
                fn to_usize(self) -> usize {
                    self as usize
                }
                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }
                #[inline]
                fn from_u64(v: u64) -> Option<Self> {
                    Self::try_from(v).ok()
                }
            }
        )*
    };
}

impl_index_word!(u16, u32, u64, usize);

/// Unsigned event counter.
pub trait EventCount:
    Copy
    + Debug
    + Default
    + Eq
    + Ord
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + AddAssign
    + 'static
{
    /// Zero events.
    const ZERO: Self;
    /// One event.
    const ONE: Self;
    /// Snapshot type signature for this counter.
    const TYPE_TAG: u32;

    /// Widening conversion for the codec and statistics.
    fn to_u64(self) -> u64;
    /// Checked conversion from `u64`; `None` if the value does not fit.
    fn from_u64(v: u64) -> Option<Self>;
}

macro_rules! impl_event_count {
    ($($ty:ty),* $(,)?) => {
        $(
            impl EventCount for $ty {
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const TYPE_TAG: u32 = (TAG_CLASS_UNSIGNED << 8) | <$ty>::BITS;

                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }
                #[inline]
                fn from_u64(v: u64) -> Option<Self> {
                    Self::try_from(v).ok()
                }
            }
        )*
    };
}

impl_event_count!(u32, u64);
