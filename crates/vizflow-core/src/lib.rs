//! # vizflow-core
//!
//! Building blocks shared by every part of the pipeline:
//!
//! - [`mtime`]: the process-wide modification clock
//! - [`extent`]: structured index ranges and piece splitting
//! - [`info`]: typed information keys, information objects and the key catalog
//! - [`data`]: data objects, field payloads and composite trees
//! - [`request`]: subset requests and pass descriptors
//! - [`error`]: data and negotiation errors

pub mod data;
pub mod error;
pub mod extent;
pub mod info;
pub mod mtime;
pub mod request;

pub use data::{BlockNode, CompositeData, DataBody, DataKind, DataObject, FieldData};
pub use error::{DataError, NegotiationError};
pub use extent::Extent;
pub use info::{InfoKey, Information, TimeRange};
pub use mtime::MTime;
pub use request::{PassKind, PieceRequest, Request, UpdateRequest};
