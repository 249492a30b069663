//! Well-known information keys
//!
//! Any stage may read or write these. Custom stages declare their own keys
//! the same way; identity keeps them apart even when names collide.

use super::key::{InfoKey, KeyTraits};
use super::value::TimeRange;
use crate::extent::Extent;
use std::collections::BTreeSet;

const PIPELINE: &str = "pipeline";
const DATA: &str = "data";

/// Name of the data kind produced on a port; written by the executive
pub static DATA_TYPE_NAME: InfoKey<String> =
    InfoKey::with_traits("DATA_TYPE_NAME", PIPELINE, KeyTraits::LOCAL);

/// Largest extent the producer can generate
pub static WHOLE_EXTENT: InfoKey<Extent> =
    InfoKey::with_traits("WHOLE_EXTENT", PIPELINE, KeyTraits::INTERSECT);

/// Discrete time values the producer can generate, ascending
pub static TIME_STEPS: InfoKey<Vec<f64>> =
    InfoKey::with_traits("TIME_STEPS", PIPELINE, KeyTraits::INTERSECT);

/// Continuous time interval the producer can generate
pub static TIME_RANGE: InfoKey<TimeRange> =
    InfoKey::with_traits("TIME_RANGE", PIPELINE, KeyTraits::INTERSECT);

/// The producer can restrict execution to a sub-extent
pub static CAN_PRODUCE_SUB_EXTENT: InfoKey<bool> =
    InfoKey::with_traits("CAN_PRODUCE_SUB_EXTENT", PIPELINE, KeyTraits::LOCAL);

/// The producer can restrict execution to a subset of pieces
pub static CAN_HANDLE_PIECE_REQUEST: InfoKey<bool> =
    InfoKey::with_traits("CAN_HANDLE_PIECE_REQUEST", PIPELINE, KeyTraits::LOCAL);

/// Flat indices of the leaves a composite producer can deliver
pub static COMPOSITE_BLOCK_IDS: InfoKey<BTreeSet<usize>> =
    InfoKey::with_traits("COMPOSITE_BLOCK_IDS", PIPELINE, KeyTraits::INTERSECT);

/// Spatial bounds `[xmin, xmax, ymin, ymax, zmin, zmax]`
pub static BOUNDS: InfoKey<Vec<f64>> = InfoKey::new("BOUNDS", PIPELINE);

/// Time value a data object was generated for
pub static DATA_TIME_STEP: InfoKey<f64> = InfoKey::new("DATA_TIME_STEP", DATA);

/// Extent a data object actually holds
pub static DATA_EXTENT: InfoKey<Extent> = InfoKey::new("DATA_EXTENT", DATA);

/// Piece index a data object holds
pub static DATA_PIECE_NUMBER: InfoKey<i64> = InfoKey::new("DATA_PIECE_NUMBER", DATA);

/// Piece count the data object's piece index refers to
pub static DATA_NUMBER_OF_PIECES: InfoKey<i64> = InfoKey::new("DATA_NUMBER_OF_PIECES", DATA);

/// Ghost levels a data object carries
pub static DATA_NUMBER_OF_GHOST_LEVELS: InfoKey<i64> =
    InfoKey::new("DATA_NUMBER_OF_GHOST_LEVELS", DATA);
