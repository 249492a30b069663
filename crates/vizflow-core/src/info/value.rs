//! Information values and the types that can be stored under a key

use crate::extent::Extent;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Closed time interval advertised by a producer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// First available time
    pub start: f64,
    /// Last available time
    pub end: f64,
}

impl TimeRange {
    /// Create a range; the bounds are reordered if needed
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Whether `t` lies inside the closed interval
    #[inline]
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Clamp `t` into the interval
    #[inline]
    #[must_use]
    pub fn clamp(&self, t: f64) -> f64 {
        t.clamp(self.start, self.end)
    }

    /// Overlap of both ranges
    #[must_use]
    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeRange { start, end })
    }
}

/// Shared opaque payload stored by reference
///
/// Equality is pointer identity.
#[derive(Clone)]
pub struct Opaque(pub Arc<dyn Any + Send + Sync>);

impl Opaque {
    /// Wrap a value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the payload as `T`
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Arc::as_ptr(&self.0))
    }
}

/// Dynamically typed value held by an information object
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point scalar
    Double(f64),
    /// Vector of floats
    DoubleVector(Vec<f64>),
    /// Vector of integers
    IntegerVector(Vec<i64>),
    /// Ordered set of indices
    Indices(BTreeSet<usize>),
    /// Structured extent
    Extent(Extent),
    /// Time interval
    Range(TimeRange),
    /// UTF-8 string
    String(String),
    /// Opaque shared pointer
    Opaque(Opaque),
}

impl InfoValue {
    /// Short type tag, used in diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            InfoValue::Bool(_) => "bool",
            InfoValue::Integer(_) => "integer",
            InfoValue::Double(_) => "double",
            InfoValue::DoubleVector(_) => "double-vector",
            InfoValue::IntegerVector(_) => "integer-vector",
            InfoValue::Indices(_) => "indices",
            InfoValue::Extent(_) => "extent",
            InfoValue::Range(_) => "range",
            InfoValue::String(_) => "string",
            InfoValue::Opaque(_) => "opaque",
        }
    }

    /// Intersect two values of the same shape
    ///
    /// Returns `None` when the values do not overlap. Values without a
    /// meaningful intersection keep `self`.
    #[must_use]
    pub fn intersect(&self, other: &InfoValue) -> Option<InfoValue> {
        match (self, other) {
            (InfoValue::Extent(a), InfoValue::Extent(b)) => a.intersection(b).map(InfoValue::Extent),
            (InfoValue::Range(a), InfoValue::Range(b)) => a.intersection(b).map(InfoValue::Range),
            (InfoValue::DoubleVector(a), InfoValue::DoubleVector(b)) => Some(InfoValue::DoubleVector(
                a.iter().copied().filter(|x| b.contains(x)).collect(),
            )),
            (InfoValue::IntegerVector(a), InfoValue::IntegerVector(b)) => Some(
                InfoValue::IntegerVector(a.iter().copied().filter(|x| b.contains(x)).collect()),
            ),
            (InfoValue::Indices(a), InfoValue::Indices(b)) => {
                Some(InfoValue::Indices(a.intersection(b).copied().collect()))
            }
            _ => Some(self.clone()),
        }
    }
}

/// Rust types that can be stored under an [`InfoKey`](super::InfoKey)
pub trait InfoType: Sized {
    /// Wrap into the dynamic representation
    fn into_value(self) -> InfoValue;

    /// Extract from the dynamic representation
    fn from_value(value: &InfoValue) -> Option<Self>;
}

macro_rules! info_type {
    ($ty:ty, $variant:ident) => {
        impl InfoType for $ty {
            fn into_value(self) -> InfoValue {
                InfoValue::$variant(self)
            }

            fn from_value(value: &InfoValue) -> Option<Self> {
                match value {
                    InfoValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

info_type!(bool, Bool);
info_type!(i64, Integer);
info_type!(f64, Double);
info_type!(Vec<f64>, DoubleVector);
info_type!(Vec<i64>, IntegerVector);
info_type!(BTreeSet<usize>, Indices);
info_type!(Extent, Extent);
info_type!(TimeRange, Range);
info_type!(String, String);
info_type!(Opaque, Opaque);
