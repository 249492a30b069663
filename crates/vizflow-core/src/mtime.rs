//! Modification timestamps
//!
//! Every mutable entity (stage parameters, information objects, data objects,
//! composite structure) stamps itself from a single process-wide counter.
//! Comparing two stamps therefore tells which change happened later, no
//! matter which entities they came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(0);

/// Monotonic modification timestamp
///
/// `MTime::ZERO` means "never modified". Fresh stamps are always strictly
/// greater than every stamp handed out before them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MTime(u64);

impl MTime {
    /// The stamp of an entity that was never modified
    pub const ZERO: MTime = MTime(0);

    /// Draw a fresh stamp from the process-wide clock
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(CLOCK.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Latest stamp handed out so far
    #[inline]
    #[must_use]
    pub fn current() -> Self {
        Self(CLOCK.load(Ordering::SeqCst))
    }

    /// Raw counter value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this stamp was ever assigned
    #[inline]
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }

    /// Bump `self` to a fresh stamp and return it
    #[inline]
    pub fn touch(&mut self) -> MTime {
        *self = MTime::next();
        *self
    }
}

impl fmt::Display for MTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
