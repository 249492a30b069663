//! Built-in stages
//!
//! Each is registered in [`StageRegistry::with_builtins`](crate::StageRegistry::with_builtins)
//! under the name returned by its `type_name`.

mod clip;
mod extract_blocks;
mod group;
mod pass_through;
mod synthetic_image;
mod temporal_shift;
mod trivial;

pub use clip::{Clip, ClipParams};
pub use extract_blocks::{ExtractBlocks, ExtractBlocksParams};
pub use group::Group;
pub use pass_through::{PassThrough, PassThroughParams};
pub use synthetic_image::{SyntheticImage, SyntheticImageParams};
pub use temporal_shift::{TemporalShift, TemporalShiftParams};
pub use trivial::TrivialProducer;
