//! Information objects
//!
//! An [`Information`] is a versioned map from typed [`InfoKey`]s to values,
//! attached to a port. Producers fill it during the metadata pass; consumers
//! read it to plan their requests.

mod catalog;
mod key;
mod value;

pub use catalog::*;
pub use key::{InfoKey, KeyId, KeyTraits, MergeRule, Propagation};
pub use value::{InfoType, InfoValue, Opaque, TimeRange};

use crate::mtime::MTime;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone)]
struct Entry {
    name: &'static str,
    location: &'static str,
    traits: KeyTraits,
    value: InfoValue,
}

/// Versioned key/value metadata container
///
/// Every mutation that actually changes a value stamps the object with a
/// fresh [`MTime`]. Setting a key to the value it already holds is a no-op.
#[derive(Clone, Default)]
pub struct Information {
    entries: BTreeMap<KeyId, Entry>,
    mtime: MTime,
}

impl Information {
    /// Create an empty information object
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`
    pub fn set<T: InfoType>(&mut self, key: &InfoKey<T>, value: T) {
        let value = value.into_value();
        if let Some(existing) = self.entries.get(&key.id()) {
            if existing.value == value {
                return;
            }
        }
        self.entries.insert(
            key.id(),
            Entry {
                name: key.name(),
                location: key.location(),
                traits: key.traits(),
                value,
            },
        );
        self.mtime.touch();
    }

    /// Read the value under `key`
    #[must_use]
    pub fn get<T: InfoType>(&self, key: &InfoKey<T>) -> Option<T> {
        self.entries
            .get(&key.id())
            .and_then(|entry| T::from_value(&entry.value))
    }

    /// Borrow the dynamic value under `key`
    #[must_use]
    pub fn value<T: InfoType>(&self, key: &InfoKey<T>) -> Option<&InfoValue> {
        self.entries.get(&key.id()).map(|entry| &entry.value)
    }

    /// Whether `key` is present
    #[inline]
    #[must_use]
    pub fn has<T: InfoType>(&self, key: &InfoKey<T>) -> bool {
        self.entries.contains_key(&key.id())
    }

    /// Remove `key`; returns whether it was present
    pub fn remove<T: InfoType>(&mut self, key: &InfoKey<T>) -> bool {
        let removed = self.entries.remove(&key.id()).is_some();
        if removed {
            self.mtime.touch();
        }
        removed
    }

    /// Copy one entry from `other`, removing it here if `other` lacks it
    pub fn copy_entry<T: InfoType>(&mut self, other: &Information, key: &InfoKey<T>) {
        match other.entries.get(&key.id()) {
            Some(entry) => {
                if self.entries.get(&key.id()).map(|e| &e.value) != Some(&entry.value) {
                    self.entries.insert(key.id(), entry.clone());
                    self.mtime.touch();
                }
            }
            None => {
                self.remove(key);
            }
        }
    }

    /// Merge the downstream-propagated entries of `other` into `self`
    ///
    /// Keys absent here are copied. Keys present in both follow their
    /// [`MergeRule`]: `FirstWins` keeps the existing value, `Intersect`
    /// narrows it. A disjoint extent intersection yields [`Extent::EMPTY`];
    /// a disjoint time range removes the key.
    ///
    /// [`Extent::EMPTY`]: crate::extent::Extent::EMPTY
    pub fn merge_from(&mut self, other: &Information) {
        let mut changed = false;
        for (id, incoming) in &other.entries {
            if incoming.traits.propagation == Propagation::Local {
                continue;
            }
            match self.entries.get_mut(id) {
                None => {
                    self.entries.insert(*id, incoming.clone());
                    changed = true;
                }
                Some(existing) => {
                    if existing.traits.merge != MergeRule::Intersect {
                        continue;
                    }
                    match existing.value.intersect(&incoming.value) {
                        Some(narrowed) => {
                            if narrowed != existing.value {
                                existing.value = narrowed;
                                changed = true;
                            }
                        }
                        None => {
                            if let InfoValue::Extent(_) = existing.value {
                                existing.value = InfoValue::Extent(crate::extent::Extent::EMPTY);
                            } else {
                                self.entries.remove(id);
                            }
                            changed = true;
                        }
                    }
                }
            }
        }
        if changed {
            self.mtime.touch();
        }
    }

    /// Copy of the entries that default metadata exchange forwards
    #[must_use]
    pub fn propagated(&self) -> Information {
        let entries = self
            .entries
            .iter()
            .filter(|(_, e)| e.traits.propagation == Propagation::Downstream)
            .map(|(id, e)| (*id, e.clone()))
            .collect();
        Information {
            entries,
            mtime: self.mtime,
        }
    }

    /// Replace the whole content, bumping the stamp only on a real change
    pub fn replace_with(&mut self, other: Information) {
        if *self != other {
            self.entries = other.entries;
            self.mtime.touch();
        }
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.mtime.touch();
        }
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stamp of the last effective mutation
    #[inline]
    #[must_use]
    pub fn mtime(&self) -> MTime {
        self.mtime
    }

    /// Names of the stored keys, in key-identity order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.values().map(|e| e.name)
    }
}

impl PartialEq for Information {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(id, e)| other.entries.get(id).is_some_and(|o| o.value == e.value))
    }
}

impl fmt::Debug for Information {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.entries.values() {
            map.entry(&format_args!("{}::{}", entry.location, entry.name), &entry.value);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::Extent;
    use pretty_assertions::assert_eq;

    static SCALAR: InfoKey<i64> = InfoKey::new("SCALAR", "tests");
    static LOCAL_FLAG: InfoKey<bool> = InfoKey::with_traits("FLAG", "tests", KeyTraits::LOCAL);

    #[test]
    fn set_and_get_roundtrip_typed() {
        let mut info = Information::new();
        info.set(&SCALAR, 7);
        info.set(&WHOLE_EXTENT, Extent::new(0, 9, 0, 9, 0, 0));
        assert_eq!(info.get(&SCALAR), Some(7));
        assert_eq!(info.get(&WHOLE_EXTENT), Some(Extent::new(0, 9, 0, 9, 0, 0)));
        assert!(info.get(&TIME_RANGE).is_none());
    }

    #[test]
    fn unchanged_set_does_not_bump() {
        let mut info = Information::new();
        info.set(&SCALAR, 1);
        let stamp = info.mtime();
        info.set(&SCALAR, 1);
        assert_eq!(info.mtime(), stamp);
        info.set(&SCALAR, 2);
        assert!(info.mtime() > stamp);
    }

    #[test]
    fn merge_intersects_ranges_and_keeps_first_scalar() {
        let mut a = Information::new();
        a.set(&TIME_RANGE, TimeRange::new(0.0, 10.0));
        a.set(&SCALAR, 1);
        let mut b = Information::new();
        b.set(&TIME_RANGE, TimeRange::new(4.0, 20.0));
        b.set(&SCALAR, 2);

        a.merge_from(&b);
        assert_eq!(a.get(&TIME_RANGE), Some(TimeRange::new(4.0, 10.0)));
        assert_eq!(a.get(&SCALAR), Some(1));
    }

    #[test]
    fn merge_skips_local_keys() {
        let mut src = Information::new();
        src.set(&LOCAL_FLAG, true);
        let mut dst = Information::new();
        dst.merge_from(&src);
        assert!(!dst.has(&LOCAL_FLAG));
        assert!(src.propagated().is_empty());
    }

    #[test]
    fn disjoint_extents_merge_to_empty() {
        let mut a = Information::new();
        a.set(&WHOLE_EXTENT, Extent::new(0, 4, 0, 0, 0, 0));
        let mut b = Information::new();
        b.set(&WHOLE_EXTENT, Extent::new(6, 9, 0, 0, 0, 0));
        a.merge_from(&b);
        assert_eq!(a.get(&WHOLE_EXTENT), Some(Extent::EMPTY));
    }

    #[test]
    fn replace_with_equal_content_keeps_stamp() {
        let mut a = Information::new();
        a.set(&SCALAR, 3);
        let stamp = a.mtime();
        let copy = a.clone();
        a.replace_with(copy);
        assert_eq!(a.mtime(), stamp);
    }
}
