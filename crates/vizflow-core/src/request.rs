//! Requests and the subset parameters they carry
//!
//! An [`UpdateRequest`] describes which part of an output a consumer needs:
//! a sub-extent or a set of pieces, a ghost level count, a time value and a
//! subset of composite blocks. `None` in any field means "everything".
//! Requests from several consumers of one port are combined with
//! [`UpdateRequest::union`] so the producer executes once per pull.

use crate::error::NegotiationError;
use crate::extent::Extent;
use crate::info::{Information, COMPOSITE_BLOCK_IDS, TIME_RANGE, TIME_STEPS, WHOLE_EXTENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Pieces `pieces` out of a partition into `count`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRequest {
    /// Requested piece indices
    pub pieces: BTreeSet<u32>,
    /// Total number of pieces
    pub count: u32,
}

/// Subset of an output requested for one pull
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Requested structured sub-extent
    pub extent: Option<Extent>,
    /// Requested pieces
    pub pieces: Option<PieceRequest>,
    /// Layers of ghost cells around the requested subset
    pub ghost_levels: u32,
    /// Requested time value
    pub time: Option<f64>,
    /// Flat indices of requested composite blocks
    pub blocks: Option<BTreeSet<usize>>,
}

impl UpdateRequest {
    /// Everything, at whatever time the producer chooses
    #[inline]
    #[must_use]
    pub fn whole() -> Self {
        Self::default()
    }

    /// Piece `piece` of `count`
    #[must_use]
    pub fn piece(piece: u32, count: u32) -> Self {
        Self {
            pieces: Some(PieceRequest {
                pieces: BTreeSet::from([piece]),
                count,
            }),
            ..Self::default()
        }
    }

    /// Replace the spatial selection with `extent`
    #[must_use]
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self.pieces = None;
        self
    }

    /// Request time value `t`
    #[must_use]
    pub fn with_time(mut self, t: f64) -> Self {
        self.time = Some(t);
        self
    }

    /// Request only the listed composite blocks
    #[must_use]
    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = usize>) -> Self {
        self.blocks = Some(blocks.into_iter().collect());
        self
    }

    /// Request `levels` layers of ghost cells
    #[must_use]
    pub fn with_ghost_levels(mut self, levels: u32) -> Self {
        self.ghost_levels = levels;
        self
    }

    /// Whether the spatial selection covers everything
    #[inline]
    #[must_use]
    pub fn is_whole_extent(&self) -> bool {
        self.extent.is_none() && self.pieces.is_none()
    }

    /// Whether nothing at all is restricted, time aside
    #[must_use]
    pub fn is_whole(&self) -> bool {
        self.is_whole_extent() && self.blocks.is_none() && self.ghost_levels == 0
    }

    /// The same request without its spatial selection
    #[must_use]
    pub fn without_subset(&self) -> Self {
        Self {
            extent: None,
            pieces: None,
            ghost_levels: 0,
            ..self.clone()
        }
    }

    /// Smallest request satisfying both `self` and `other`
    ///
    /// Spatial selections combine to their bounding extent, pieces with the
    /// same count to their set union. Anything else degrades to the whole
    /// extent. Block subsets union, and a missing subset wins. Two distinct
    /// time values cannot be produced by one execution.
    ///
    /// # Errors
    /// [`NegotiationError::ConflictingTime`] when both carry different times.
    pub fn union(&self, other: &UpdateRequest) -> Result<UpdateRequest, NegotiationError> {
        let time = match (self.time, other.time) {
            (Some(a), Some(b)) if (a - b).abs() > f64::EPSILON => {
                return Err(NegotiationError::ConflictingTime { first: a, second: b });
            }
            (Some(a), _) => Some(a),
            (None, b) => b,
        };

        let (extent, pieces) = match (self, other) {
            (
                UpdateRequest { extent: Some(a), .. },
                UpdateRequest { extent: Some(b), .. },
            ) => (Some(a.union(b)), None),
            (
                UpdateRequest { pieces: Some(a), extent: None, .. },
                UpdateRequest { pieces: Some(b), extent: None, .. },
            ) if a.count == b.count => (
                None,
                Some(PieceRequest {
                    pieces: a.pieces.union(&b.pieces).copied().collect(),
                    count: a.count,
                }),
            ),
            _ => (None, None),
        };

        let blocks = match (&self.blocks, &other.blocks) {
            (Some(a), Some(b)) => Some(a.union(b).copied().collect()),
            _ => None,
        };

        Ok(UpdateRequest {
            extent,
            pieces,
            ghost_levels: self.ghost_levels.max(other.ghost_levels),
            time,
            blocks,
        })
    }

    /// Spatial selection as an extent inside `whole`
    ///
    /// Pieces resolve to the bounding extent of their splits. Returns
    /// [`Extent::EMPTY`] when the selection holds no points.
    #[must_use]
    pub fn resolve_extent(&self, whole: &Extent) -> Extent {
        if let Some(extent) = self.extent {
            return extent;
        }
        match &self.pieces {
            Some(req) => req
                .pieces
                .iter()
                .filter_map(|p| whole.split(*p, req.count))
                .fold(Extent::EMPTY, |acc, e| acc.union(&e)),
            None => *whole,
        }
    }

    /// Check the request against what a producer advertises in `info`
    ///
    /// Keys missing from `info` impose no constraint.
    ///
    /// # Errors
    /// The first [`NegotiationError`] found: piece, extent, time, then block.
    pub fn validate(&self, info: &Information) -> Result<(), NegotiationError> {
        if let Some(req) = &self.pieces {
            if let Some(bad) = req.pieces.iter().find(|p| **p >= req.count) {
                return Err(NegotiationError::InvalidPiece {
                    piece: *bad,
                    count: req.count,
                });
            }
            if req.count == 0 || req.pieces.is_empty() {
                return Err(NegotiationError::InvalidPiece { piece: 0, count: req.count });
            }
        }

        if let (Some(requested), Some(whole)) = (self.extent, info.get(&WHOLE_EXTENT)) {
            if !whole.contains(&requested) {
                return Err(NegotiationError::ExtentOutOfBounds { requested, whole });
            }
        }

        if let Some(t) = self.time {
            let bounds = info.get(&TIME_RANGE).map(|r| (r.start, r.end)).or_else(|| {
                info.get(&TIME_STEPS)
                    .and_then(|steps| Some((*steps.first()?, *steps.last()?)))
            });
            if let Some((start, end)) = bounds {
                if t < start || t > end {
                    return Err(NegotiationError::TimeOutOfRange { requested: t, start, end });
                }
            }
        }

        if let (Some(wanted), Some(available)) = (&self.blocks, info.get(&COMPOSITE_BLOCK_IDS)) {
            if let Some(missing) = wanted.iter().find(|b| !available.contains(b)) {
                return Err(NegotiationError::UnknownBlock(*missing));
            }
        }

        Ok(())
    }
}

impl fmt::Display for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.extent, &self.pieces) {
            (Some(e), _) => write!(f, "extent {e}")?,
            (None, Some(p)) => write!(f, "pieces {:?}/{}", p.pieces, p.count)?,
            (None, None) => f.write_str("whole")?,
        }
        if self.ghost_levels > 0 {
            write!(f, " +{} ghost", self.ghost_levels)?;
        }
        if let Some(t) = self.time {
            write!(f, " @t={t}")?;
        }
        if let Some(blocks) = &self.blocks {
            write!(f, " blocks {blocks:?}")?;
        }
        Ok(())
    }
}

/// The pass a [`Request`] drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassKind {
    /// Allocate output containers
    CreateOutput,
    /// Exchange information objects
    ExchangeMetadata,
    /// Negotiate spatial and block subsets
    NegotiateExtent,
    /// Negotiate time values
    NegotiateTime,
    /// Run the stage
    Execute,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassKind::CreateOutput => "create-output",
            PassKind::ExchangeMetadata => "exchange-metadata",
            PassKind::NegotiateExtent => "negotiate-extent",
            PassKind::NegotiateTime => "negotiate-time",
            PassKind::Execute => "execute",
        })
    }
}

/// A pass in flight
///
/// Built fresh for every pass of every pull and dropped when the pass ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Pass being driven
    pub kind: PassKind,
    /// Identifier of the pull this pass belongs to
    pub pull: u64,
    /// Subset parameters for negotiation and execution passes
    pub params: Option<UpdateRequest>,
}

impl Request {
    /// Request for `kind` without subset parameters
    #[must_use]
    pub fn new(kind: PassKind, pull: u64) -> Self {
        Self { kind, pull, params: None }
    }

    /// Attach subset parameters
    #[must_use]
    pub fn with_params(mut self, params: UpdateRequest) -> Self {
        self.params = Some(params);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::TimeRange;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn union_of_extents_is_bounding_box() {
        let a = UpdateRequest::whole().with_extent(Extent::new(0, 4, 0, 4, 0, 0));
        let b = UpdateRequest::whole().with_extent(Extent::new(3, 9, 2, 6, 0, 0));
        let u = a.union(&b).unwrap();
        assert_eq!(u.extent, Some(Extent::new(0, 9, 0, 6, 0, 0)));
    }

    #[test]
    fn whole_dominates() {
        let a = UpdateRequest::piece(1, 4);
        let u = a.union(&UpdateRequest::whole()).unwrap();
        assert!(u.is_whole_extent());
    }

    #[test]
    fn pieces_union_when_counts_match() {
        let u = UpdateRequest::piece(1, 4).union(&UpdateRequest::piece(3, 4)).unwrap();
        assert_eq!(u.pieces.map(|p| p.pieces), Some(BTreeSet::from([1, 3])));
        let mixed = UpdateRequest::piece(1, 4).union(&UpdateRequest::piece(1, 2)).unwrap();
        assert!(mixed.is_whole_extent());
    }

    #[test]
    fn time_conflict_and_adoption() {
        let a = UpdateRequest::whole().with_time(1.0);
        let b = UpdateRequest::whole().with_time(2.0);
        assert!(matches!(a.union(&b), Err(NegotiationError::ConflictingTime { .. })));
        assert_eq!(UpdateRequest::whole().union(&a).unwrap().time, Some(1.0));
    }

    #[test]
    fn blocks_none_dominates() {
        let a = UpdateRequest::whole().with_blocks([1, 2]);
        let b = UpdateRequest::whole().with_blocks([4]);
        assert_eq!(a.union(&b).unwrap().blocks, Some(BTreeSet::from([1, 2, 4])));
        assert_eq!(a.union(&UpdateRequest::whole()).unwrap().blocks, None);
    }

    #[test]
    fn pieces_resolve_to_split_extent() {
        let whole = Extent::new(0, 15, 0, 15, 0, 0);
        let req = UpdateRequest::piece(2, 4);
        assert_eq!(req.resolve_extent(&whole), whole.split(2, 4).unwrap());
        assert_eq!(UpdateRequest::whole().resolve_extent(&whole), whole);
    }

    #[test]
    fn validate_checks_advertised_availability() {
        let mut info = Information::new();
        info.set(&WHOLE_EXTENT, Extent::new(0, 9, 0, 9, 0, 0));
        info.set(&TIME_RANGE, TimeRange::new(0.0, 10.0));
        info.set(&COMPOSITE_BLOCK_IDS, BTreeSet::from([1, 2]));

        assert!(UpdateRequest::whole().with_time(5.0).validate(&info).is_ok());
        assert!(matches!(
            UpdateRequest::whole().with_time(12.0).validate(&info),
            Err(NegotiationError::TimeOutOfRange { .. })
        ));
        assert!(matches!(
            UpdateRequest::whole().with_extent(Extent::new(5, 12, 0, 0, 0, 0)).validate(&info),
            Err(NegotiationError::ExtentOutOfBounds { .. })
        ));
        assert!(matches!(
            UpdateRequest::piece(4, 4).validate(&info),
            Err(NegotiationError::InvalidPiece { piece: 4, count: 4 })
        ));
        assert!(matches!(
            UpdateRequest::whole().with_blocks([3]).validate(&info),
            Err(NegotiationError::UnknownBlock(3))
        ));
    }

    #[test]
    fn validate_uses_steps_without_range() {
        let mut info = Information::new();
        info.set(&TIME_STEPS, vec![1.0, 2.0, 3.0]);
        assert!(UpdateRequest::whole().with_time(2.5).validate(&info).is_ok());
        assert!(UpdateRequest::whole().with_time(0.5).validate(&info).is_err());
    }

    fn arb_request() -> impl Strategy<Value = UpdateRequest> {
        (
            prop::option::of((0i32..8, 0i32..8, 0i32..8, 0i32..8)),
            prop::option::of(prop::collection::btree_set(0usize..6, 0..4)),
            0u32..3,
        )
            .prop_map(|(ext, blocks, ghost)| UpdateRequest {
                extent: ext.map(|(a, b, c, d)| Extent::new(a.min(b), a.max(b), c.min(d), c.max(d), 0, 0)),
                pieces: None,
                ghost_levels: ghost,
                time: None,
                blocks,
            })
    }

    proptest! {
        #[test]
        fn union_is_commutative(a in arb_request(), b in arb_request()) {
            prop_assert_eq!(a.union(&b).unwrap(), b.union(&a).unwrap());
        }

        #[test]
        fn union_covers_both(a in arb_request(), b in arb_request()) {
            let u = a.union(&b).unwrap();
            let whole = Extent::new(0, 7, 0, 7, 0, 0);
            let ue = u.resolve_extent(&whole);
            prop_assert!(ue.contains(&a.resolve_extent(&whole)));
            prop_assert!(ue.contains(&b.resolve_extent(&whole)));
            prop_assert!(u.ghost_levels >= a.ghost_levels.max(b.ghost_levels));
        }

        #[test]
        fn union_is_idempotent(a in arb_request()) {
            prop_assert_eq!(a.union(&a).unwrap(), a);
        }
    }
}
