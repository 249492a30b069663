//! Data objects produced on output ports

mod composite;
mod fields;
mod kind;

pub use composite::{BlockNode, CompositeData, LeafRef};
pub use fields::FieldData;
pub use kind::{DataKind, UnknownKind};

use crate::error::DataError;
use crate::extent::Extent;
use crate::info::{Information, DATA_EXTENT};
use crate::mtime::MTime;

/// Payload of a data object
#[derive(Debug, Clone)]
pub enum DataBody {
    /// No payload
    Empty,
    /// Named arrays, optionally structured
    Fields(FieldData),
    /// Tree of sub-blocks
    Composite(CompositeData),
}

impl DataBody {
    fn for_kind(kind: DataKind) -> Self {
        if kind.is_composite() {
            DataBody::Composite(CompositeData::new())
        } else if kind == DataKind::DataObject {
            DataBody::Empty
        } else {
            DataBody::Fields(FieldData::new())
        }
    }
}

/// Payload of an output port
///
/// Carries its own data information (`DATA_EXTENT`, `DATA_TIME_STEP`, ...)
/// alongside the body. The stamp returned by [`DataObject::mtime`] covers
/// the body, the information and, for composites, every sub-block.
#[derive(Debug, Clone)]
pub struct DataObject {
    kind: DataKind,
    info: Information,
    body: DataBody,
    mtime: MTime,
}

impl DataObject {
    /// Fresh, empty object of `kind`
    #[must_use]
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            info: Information::new(),
            body: DataBody::for_kind(kind),
            mtime: MTime::next(),
        }
    }

    /// Structured object over `extent` holding `fields`
    #[must_use]
    pub fn with_fields(kind: DataKind, fields: FieldData) -> Self {
        let mut obj = Self::new(kind);
        obj.set_fields(fields);
        obj
    }

    /// Kind this object was allocated as
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Data information
    #[inline]
    #[must_use]
    pub fn info(&self) -> &Information {
        &self.info
    }

    /// Mutable data information
    pub fn info_mut(&mut self) -> &mut Information {
        self.mtime.touch();
        &mut self.info
    }

    /// Body
    #[inline]
    #[must_use]
    pub fn body(&self) -> &DataBody {
        &self.body
    }

    /// Field payload, if any
    #[must_use]
    pub fn fields(&self) -> Option<&FieldData> {
        match &self.body {
            DataBody::Fields(f) => Some(f),
            _ => None,
        }
    }

    /// Mutable field payload; stamps the object
    pub fn fields_mut(&mut self) -> Option<&mut FieldData> {
        match &mut self.body {
            DataBody::Fields(f) => {
                self.mtime.touch();
                Some(f)
            }
            _ => None,
        }
    }

    /// Replace the field payload
    ///
    /// Records `DATA_EXTENT` when the fields are structured.
    pub fn set_fields(&mut self, fields: FieldData) {
        match fields.extent() {
            Some(extent) => self.info.set(&DATA_EXTENT, extent),
            None => {
                self.info.remove(&DATA_EXTENT);
            }
        }
        self.body = DataBody::Fields(fields);
        self.mtime.touch();
    }

    /// Composite payload, if any
    #[must_use]
    pub fn composite(&self) -> Option<&CompositeData> {
        match &self.body {
            DataBody::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Mutable composite payload
    ///
    /// The container stamps its own structure and leaves, so this does not
    /// stamp the object.
    pub fn composite_mut(&mut self) -> Option<&mut CompositeData> {
        match &mut self.body {
            DataBody::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Structured extent held, if any
    #[must_use]
    pub fn extent(&self) -> Option<Extent> {
        self.fields().and_then(FieldData::extent)
    }

    /// Latest stamp of the object and its sub-blocks
    #[must_use]
    pub fn mtime(&self) -> MTime {
        match &self.body {
            DataBody::Composite(c) => self.mtime.max(c.mtime()),
            _ => self.mtime,
        }
    }

    /// Mark the object as changed
    pub fn modified(&mut self) -> MTime {
        self.mtime.touch()
    }

    /// Discard everything outside `sub`
    ///
    /// # Errors
    /// Propagates [`FieldData::crop`] failures; fails with
    /// [`DataError::NotStructured`] for non-field bodies.
    pub fn crop(&mut self, sub: &Extent) -> Result<(), DataError> {
        match &mut self.body {
            DataBody::Fields(f) => f.crop(sub)?,
            _ => return Err(DataError::NotStructured),
        }
        self.info.set(&DATA_EXTENT, *sub);
        self.mtime.touch();
        Ok(())
    }

    /// Copy body and data information from `other`
    ///
    /// Composite leaves are shared, not duplicated.
    ///
    /// # Errors
    /// [`DataError::WrongKind`] unless `other` is of this object's kind or
    /// derives from it.
    pub fn copy_from(&mut self, other: &DataObject) -> Result<(), DataError> {
        if !other.kind.is_a(self.kind) {
            return Err(DataError::WrongKind {
                expected: self.kind,
                actual: other.kind,
            });
        }
        self.body = other.body.clone();
        self.info = other.info.clone();
        self.mtime.touch();
        Ok(())
    }

    /// Drop the payload and data information
    pub fn reset(&mut self) {
        self.body = DataBody::for_kind(self.kind);
        self.info.clear();
        self.mtime.touch();
    }
}
