//! Structured extents
//!
//! An [`Extent`] is an inclusive range of point indices along three axes,
//! stored as `[xmin, xmax, ymin, ymax, zmin, zmax]`. Any axis with
//! `max < min` makes the extent empty.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive structured index range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent(pub [i32; 6]);

impl Extent {
    /// Canonical empty extent
    pub const EMPTY: Extent = Extent([0, -1, 0, -1, 0, -1]);

    /// Create an extent from per-axis bounds
    #[inline]
    #[must_use]
    pub const fn new(x0: i32, x1: i32, y0: i32, y1: i32, z0: i32, z1: i32) -> Self {
        Self([x0, x1, y0, y1, z0, z1])
    }

    /// Raw bounds
    #[inline]
    #[must_use]
    pub const fn as_array(&self) -> [i32; 6] {
        self.0
    }

    /// Lower bound on `axis`
    #[inline]
    #[must_use]
    pub fn min(&self, axis: usize) -> i32 {
        self.0[axis * 2]
    }

    /// Upper bound on `axis`
    #[inline]
    #[must_use]
    pub fn max(&self, axis: usize) -> i32 {
        self.0[axis * 2 + 1]
    }

    /// True when no point lies inside
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.max(axis) < self.min(axis))
    }

    /// Point counts per axis
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        if self.is_empty() {
            return [0; 3];
        }
        let mut dims = [0usize; 3];
        for (axis, dim) in dims.iter_mut().enumerate() {
            *dim = usize::try_from(i64::from(self.max(axis)) - i64::from(self.min(axis)) + 1)
                .unwrap_or(0);
        }
        dims
    }

    /// Number of points covered
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.dims().iter().product()
    }

    /// Whether `other` lies entirely inside `self`
    ///
    /// The empty extent is contained in everything.
    #[must_use]
    pub fn contains(&self, other: &Extent) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        (0..3).all(|axis| self.min(axis) <= other.min(axis) && other.max(axis) <= self.max(axis))
    }

    /// Whether the point `(i, j, k)` lies inside
    #[must_use]
    pub fn contains_point(&self, ijk: [i32; 3]) -> bool {
        (0..3).all(|axis| self.min(axis) <= ijk[axis] && ijk[axis] <= self.max(axis))
    }

    /// Bounding extent of both; empty operands are ignored
    #[must_use]
    pub fn union(&self, other: &Extent) -> Extent {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = [0i32; 6];
        for axis in 0..3 {
            out[axis * 2] = self.min(axis).min(other.min(axis));
            out[axis * 2 + 1] = self.max(axis).max(other.max(axis));
        }
        Extent(out)
    }

    /// Overlap of both, `None` when disjoint
    #[must_use]
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let mut out = [0i32; 6];
        for axis in 0..3 {
            out[axis * 2] = self.min(axis).max(other.min(axis));
            out[axis * 2 + 1] = self.max(axis).min(other.max(axis));
        }
        let ext = Extent(out);
        if ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    /// Grow every axis by `cells` on both sides
    ///
    /// Axes that are flat (a single point) stay flat, so a 2-D slab does not
    /// grow into the third dimension.
    #[must_use]
    pub fn grow(&self, cells: u32) -> Extent {
        if self.is_empty() {
            return *self;
        }
        let delta = i32::try_from(cells).unwrap_or(i32::MAX);
        let mut out = self.0;
        for axis in 0..3 {
            if self.max(axis) > self.min(axis) {
                out[axis * 2] = self.min(axis).saturating_sub(delta);
                out[axis * 2 + 1] = self.max(axis).saturating_add(delta);
            }
        }
        Extent(out)
    }

    /// Intersection with `whole`, or [`Extent::EMPTY`]
    #[must_use]
    pub fn clamp_to(&self, whole: &Extent) -> Extent {
        self.intersection(whole).unwrap_or(Extent::EMPTY)
    }

    /// Linear offset of `(i, j, k)` inside this extent, x fastest
    #[must_use]
    pub fn point_offset(&self, ijk: [i32; 3]) -> Option<usize> {
        if !self.contains_point(ijk) {
            return None;
        }
        let dims = self.dims();
        let rel = |axis: usize| usize::try_from(i64::from(ijk[axis]) - i64::from(self.min(axis))).ok();
        let plane = dims[1].checked_mul(rel(2)?)?.checked_add(rel(1)?)?;
        dims[0].checked_mul(plane)?.checked_add(rel(0)?)
    }

    /// Extent of `piece` when `self` is divided into `count` pieces
    ///
    /// Splits recursively along the largest axis that can still be halved.
    /// Neighbouring pieces share their boundary points. Returns `None` for
    /// pieces that receive nothing because the extent ran out of points.
    #[must_use]
    pub fn split(&self, piece: u32, count: u32) -> Option<Extent> {
        if count == 0 || piece >= count || self.is_empty() {
            return None;
        }
        let mut ext = self.0;
        let mut piece = piece;
        let mut count = count;
        while count > 1 {
            let size = [0, 1, 2].map(|axis| i64::from(ext[axis * 2 + 1]) - i64::from(ext[axis * 2]));
            let axis = if size[2] >= size[1] && size[2] >= size[0] && size[2] / 2 >= 1 {
                Some(2)
            } else if size[1] >= size[0] && size[1] / 2 >= 1 {
                Some(1)
            } else if size[0] / 2 >= 1 {
                Some(0)
            } else {
                None
            };

            let Some(axis) = axis else {
                if piece == 0 {
                    break;
                }
                return None;
            };

            let first_half = count / 2;
            let mid = i128::from(size[axis]) * i128::from(first_half) / i128::from(count) + i128::from(ext[axis * 2]);
            let mid = i32::try_from(mid).ok()?;
            if piece < first_half {
                ext[axis * 2 + 1] = mid;
                count = first_half;
            } else {
                ext[axis * 2] = mid;
                count -= first_half;
                piece -= first_half;
            }
        }
        Some(Extent(ext))
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = self.0;
        write!(
            f,
            "[{}..{}, {}..{}, {}..{}]",
            e[0], e[1], e[2], e[3], e[4], e[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_extent_has_no_points() {
        assert!(Extent::EMPTY.is_empty());
        assert_eq!(Extent::EMPTY.num_points(), 0);
        assert_eq!(Extent::new(0, 9, 0, 4, 0, 0).num_points(), 50);
    }

    #[test]
    fn split_shares_boundary_points() {
        let whole = Extent::new(0, 10, 0, 0, 0, 0);
        assert_eq!(whole.split(0, 2), Some(Extent::new(0, 5, 0, 0, 0, 0)));
        assert_eq!(whole.split(1, 2), Some(Extent::new(5, 10, 0, 0, 0, 0)));
    }

    #[test]
    fn split_picks_largest_axis() {
        let whole = Extent::new(0, 3, 0, 15, 0, 0);
        let p0 = whole.split(0, 2).unwrap();
        assert_eq!(p0, Extent::new(0, 3, 0, 7, 0, 0));
    }

    #[test]
    fn split_runs_out_of_points() {
        let whole = Extent::new(0, 1, 0, 0, 0, 0);
        assert!(whole.split(0, 4).is_some());
        assert!(whole.split(3, 4).is_none());
    }

    #[test]
    fn grow_keeps_flat_axes_flat() {
        let slab = Extent::new(2, 5, 2, 5, 0, 0);
        assert_eq!(slab.grow(1), Extent::new(1, 6, 1, 6, 0, 0));
    }

    #[test]
    fn point_offset_is_x_fastest() {
        let ext = Extent::new(1, 3, 1, 2, 0, 0);
        assert_eq!(ext.point_offset([1, 1, 0]), Some(0));
        assert_eq!(ext.point_offset([2, 1, 0]), Some(1));
        assert_eq!(ext.point_offset([1, 2, 0]), Some(3));
        assert_eq!(ext.point_offset([0, 1, 0]), None);
    }

    #[test]
    fn full_range_extent_does_not_overflow() {
        let wide = Extent::new(i32::MIN, i32::MAX, 0, 0, 0, 0);
        assert_eq!(wide.split(0, 2), Some(Extent::new(i32::MIN, -1, 0, 0, 0, 0)));
        assert_eq!(wide.split(1, 2), Some(Extent::new(-1, i32::MAX, 0, 0, 0, 0)));
        assert_eq!(wide.point_offset([i32::MIN, 0, 0]), Some(0));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(wide.point_offset([i32::MAX, 0, 0]), usize::try_from(u32::MAX).ok());
    }

    fn arb_extent() -> impl Strategy<Value = Extent> {
        (0..20i32, 0..20i32, 0..20i32, 0..20i32, 0..4i32, 0..4i32).prop_map(
            |(x0, dx, y0, dy, z0, dz)| Extent::new(x0, x0 + dx, y0, y0 + dy, z0, z0 + dz),
        )
    }

    proptest! {
        #[test]
        fn prop_pieces_cover_whole(whole in arb_extent(), count in 1..9u32) {
            let mut covered = Extent::EMPTY;
            for piece in 0..count {
                if let Some(ext) = whole.split(piece, count) {
                    prop_assert!(whole.contains(&ext));
                    covered = covered.union(&ext);
                }
            }
            prop_assert_eq!(covered, whole);
        }

        #[test]
        fn prop_union_contains_operands(a in arb_extent(), b in arb_extent()) {
            let u = a.union(&b);
            prop_assert!(u.contains(&a));
            prop_assert!(u.contains(&b));
        }

        #[test]
        fn prop_intersection_is_contained(a in arb_extent(), b in arb_extent()) {
            if let Some(i) = a.intersection(&b) {
                prop_assert!(a.contains(&i));
                prop_assert!(b.contains(&i));
            }
        }
    }
}
