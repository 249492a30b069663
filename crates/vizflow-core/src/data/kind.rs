//! Data object kinds and their is-a hierarchy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a data object
///
/// Kinds form a tree rooted at [`DataKind::DataObject`]. Wiring checks use
/// [`DataKind::is_a`]: a producer may feed a port whose required kind is the
/// produced kind or any of its ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Root of the hierarchy
    DataObject,
    /// Any dataset with points
    DataSet,
    /// Structured grid addressed by extent
    ImageData,
    /// Unstructured point-based dataset, split by pieces
    PointSet,
    /// Column table
    Table,
    /// Any hierarchical container
    Composite,
    /// Tree of named blocks
    MultiBlock,
    /// Flat collection of pieces of one dataset
    Partitioned,
    /// Multi-resolution levels of structured blocks
    Amr,
}

impl DataKind {
    /// Every kind, root first
    pub const ALL: [DataKind; 9] = [
        DataKind::DataObject,
        DataKind::DataSet,
        DataKind::ImageData,
        DataKind::PointSet,
        DataKind::Table,
        DataKind::Composite,
        DataKind::MultiBlock,
        DataKind::Partitioned,
        DataKind::Amr,
    ];

    /// Direct parent in the hierarchy
    #[must_use]
    pub fn parent(self) -> Option<DataKind> {
        match self {
            DataKind::DataObject => None,
            DataKind::DataSet | DataKind::Table | DataKind::Composite => Some(DataKind::DataObject),
            DataKind::ImageData | DataKind::PointSet => Some(DataKind::DataSet),
            DataKind::MultiBlock | DataKind::Partitioned | DataKind::Amr => Some(DataKind::Composite),
        }
    }

    /// Whether `self` is `other` or derives from it
    #[must_use]
    pub fn is_a(self, other: DataKind) -> bool {
        let mut cursor = Some(self);
        while let Some(kind) = cursor {
            if kind == other {
                return true;
            }
            cursor = kind.parent();
        }
        false
    }

    /// Whether data of this kind is a composite container
    #[inline]
    #[must_use]
    pub fn is_composite(self) -> bool {
        self.is_a(DataKind::Composite)
    }

    /// Stable name, as written to `DATA_TYPE_NAME`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DataKind::DataObject => "DataObject",
            DataKind::DataSet => "DataSet",
            DataKind::ImageData => "ImageData",
            DataKind::PointSet => "PointSet",
            DataKind::Table => "Table",
            DataKind::Composite => "Composite",
            DataKind::MultiBlock => "MultiBlock",
            DataKind::Partitioned => "Partitioned",
            DataKind::Amr => "Amr",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for DataKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
