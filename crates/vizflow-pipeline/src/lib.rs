//! vizflow pipeline - demand-driven stage execution
//!
//! Stages are wired into a DAG and pulled from a sink. A pull runs the
//! passes of the executive over the sink's upstream closure:
//! - output containers are declared and allocated
//! - metadata flows downstream
//! - requests for subsets (extent, pieces, time, blocks) flow upstream
//! - stale stages execute, everything else is served from cache
//!
//! # Example
//!
//! ```
//! use vizflow_pipeline::prelude::*;
//!
//! let mut pipeline = Pipeline::new();
//! let source = pipeline.add_stage(SyntheticImage::new(Extent::new(0, 15, 0, 15, 0, 0)));
//! let clip = pipeline.add_stage(Clip::new(Extent::new(0, 7, 0, 7, 0, 0)));
//! pipeline.connect(source, 0, clip, 0)?;
//!
//! let image = pipeline.update(clip, 0, UpdateRequest::piece(0, 2))?;
//! assert!(image.extent().is_some());
//!
//! // Nothing changed: served from cache.
//! let again = pipeline.update(clip, 0, UpdateRequest::piece(0, 2))?;
//! assert!(std::sync::Arc::ptr_eq(&image, &again));
//! # Ok::<(), PipelineError>(())
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod composite;
pub mod config;
pub mod error;
mod executive;
mod graph;
pub mod policy;
pub mod registry;
pub mod stage;
pub mod stages;
pub mod state;
pub mod trace;
pub mod types;

pub use composite::{BlockFilter, PerBlock};
pub use config::{ExecutiveConfig, LoggingConfig, PipelineConfig};
pub use error::{ConfigError, PipelineError, RegistryError, StageError, StateError, WiringError};
pub use graph::Pipeline;
pub use policy::{BlockPolicy, ExtentPolicy, ForwardExtent, ForwardTime, IgnoreTime, RequestWhole, ShiftTime, SnapTime, TimePolicy};
pub use registry::{StageFactory, StageRegistry};
pub use stage::{
    ExecuteContext, InputPortDescriptor, MetadataContext, NegotiationContext, OutputPortDescriptor, Stage,
    StageSignature,
};
pub use state::PortState;
pub use trace::{PassEvent, PassOutcome, PassTrace};
pub use types::{Connection, Direction, StageId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and pulling pipelines
    pub use crate::stages::{Clip, ExtractBlocks, Group, PassThrough, SyntheticImage, TemporalShift};
    pub use crate::{
        BlockPolicy, ExecuteContext, ExtentPolicy, InputPortDescriptor, MetadataContext, NegotiationContext,
        OutputPortDescriptor, PassOutcome, Pipeline, PipelineConfig, PipelineError, PortState, Stage, StageError,
        StageId, StageRegistry, StageSignature, TimePolicy,
    };
    pub use vizflow_core::{DataKind, DataObject, Extent, Information, UpdateRequest};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
