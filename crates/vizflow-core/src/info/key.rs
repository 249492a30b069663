//! Typed information keys
//!
//! Keys are compared by identity, never by name. Each key instance draws a
//! process-unique [`KeyId`] the first time it is used, so two unrelated
//! concepts that happen to share a name never collide.

use super::value::InfoType;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique key identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(u64);

impl KeyId {
    fn allocate() -> Self {
        Self(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// How values from several upstream branches combine into one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeRule {
    /// Keep the value from the first input that provides the key
    #[default]
    FirstWins,
    /// Keep only what every input agrees on (ranges, extents, id lists)
    Intersect,
}

/// Whether default metadata exchange copies the key downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Copied from inputs to outputs by default
    #[default]
    Downstream,
    /// Describes the producing stage only
    Local,
}

/// Static attributes of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTraits {
    /// Merge rule applied when several inputs provide the key
    pub merge: MergeRule,
    /// Default propagation behaviour
    pub propagation: Propagation,
}

impl KeyTraits {
    /// First-writer-wins, propagated downstream
    pub const DEFAULT: KeyTraits = KeyTraits {
        merge: MergeRule::FirstWins,
        propagation: Propagation::Downstream,
    };

    /// Intersected across inputs, propagated downstream
    pub const INTERSECT: KeyTraits = KeyTraits {
        merge: MergeRule::Intersect,
        propagation: Propagation::Downstream,
    };

    /// Never copied downstream
    pub const LOCAL: KeyTraits = KeyTraits {
        merge: MergeRule::FirstWins,
        propagation: Propagation::Local,
    };
}

impl Default for KeyTraits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A typed key into an [`Information`](super::Information) object
///
/// Declare keys as `static` items so that every user shares one identity:
///
/// ```
/// use vizflow_core::info::{InfoKey, KeyTraits};
///
/// static ISO_VALUE: InfoKey<f64> = InfoKey::new("ISO_VALUE", "my_stage");
/// static SEEDS: InfoKey<Vec<f64>> =
///     InfoKey::with_traits("SEEDS", "my_stage", KeyTraits::LOCAL);
/// ```
///
/// Keys are intentionally neither `Clone` nor `Copy`: a copy would carry its
/// own identity cell and silently become a different key.
pub struct InfoKey<T> {
    name: &'static str,
    location: &'static str,
    traits: KeyTraits,
    id: OnceLock<KeyId>,
    _value: PhantomData<fn() -> T>,
}

impl<T: InfoType> InfoKey<T> {
    /// Create a key with default traits
    #[must_use]
    pub const fn new(name: &'static str, location: &'static str) -> Self {
        Self::with_traits(name, location, KeyTraits::DEFAULT)
    }

    /// Create a key with explicit traits
    #[must_use]
    pub const fn with_traits(
        name: &'static str,
        location: &'static str,
        traits: KeyTraits,
    ) -> Self {
        Self {
            name,
            location,
            traits,
            id: OnceLock::new(),
            _value: PhantomData,
        }
    }

    /// Identity of this key
    #[inline]
    pub fn id(&self) -> KeyId {
        *self.id.get_or_init(KeyId::allocate)
    }

    /// Human-readable name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Where the key was declared (module or stage family)
    #[inline]
    #[must_use]
    pub fn location(&self) -> &'static str {
        self.location
    }

    /// Static key attributes
    #[inline]
    #[must_use]
    pub fn traits(&self) -> KeyTraits {
        self.traits
    }
}

impl<T> fmt::Debug for InfoKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.location, self.name)
    }
}
