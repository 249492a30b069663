//! Error types for vizflow-core

use crate::data::DataKind;
use crate::extent::Extent;

/// Errors raised while manipulating data objects
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    /// Array length disagrees with the point count of the extent
    #[error("array `{name}` has {actual} values, extent holds {expected} points")]
    ArrayLength {
        /// Array name
        name: String,
        /// Points in the extent
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// Crop target is not inside the held extent
    #[error("extent {requested} is not inside the held extent {available}")]
    ExtentNotContained {
        /// Requested sub-extent
        requested: Extent,
        /// Extent currently held
        available: Extent,
    },

    /// Operation needs structured (extent-addressed) data
    #[error("data is not structured")]
    NotStructured,

    /// No composite leaf with this flat index
    #[error("no composite block with flat index {0}")]
    NoSuchBlock(usize),

    /// Operation applied to the wrong kind of data object
    #[error("expected {expected} data, found {actual}")]
    WrongKind {
        /// Required kind
        expected: DataKind,
        /// Kind found
        actual: DataKind,
    },
}

/// A requested subset cannot be satisfied
///
/// Raised during extent/time negotiation. The executive offers consumers a
/// chance to substitute a fallback request before failing the pull.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NegotiationError {
    /// Requested time lies outside what the producer advertises
    #[error("time {requested} is outside the available range [{start}, {end}]")]
    TimeOutOfRange {
        /// Requested time value
        requested: f64,
        /// First available time
        start: f64,
        /// Last available time
        end: f64,
    },

    /// Requested extent is not inside the whole extent
    #[error("extent {requested} is outside the whole extent {whole}")]
    ExtentOutOfBounds {
        /// Requested extent
        requested: Extent,
        /// Advertised whole extent
        whole: Extent,
    },

    /// Piece index or count is malformed
    #[error("invalid piece request: piece {piece} of {count}")]
    InvalidPiece {
        /// Offending piece index
        piece: u32,
        /// Piece count
        count: u32,
    },

    /// A requested composite block does not exist upstream
    #[error("composite block {0} is not available")]
    UnknownBlock(usize),

    /// Two consumers asked one producer for different times in one pull
    #[error("conflicting time requests {first} and {second} in a single pull")]
    ConflictingTime {
        /// Time requested by one consumer
        first: f64,
        /// Time requested by another consumer
        second: f64,
    },

    /// Stage-specific refusal
    #[error("{0}")]
    Unsatisfiable(String),
}

impl NegotiationError {
    /// Whether a clamped or reduced request could succeed
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TimeOutOfRange { .. } | Self::ExtentOutOfBounds { .. } | Self::UnknownBlock(_)
        )
    }
}
