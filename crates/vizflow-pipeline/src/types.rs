//! Identifiers shared across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a stage inside a [`Pipeline`](crate::Pipeline)
///
/// Identifiers are never reused, so a handle to a removed stage keeps
/// failing with [`PipelineError::UnknownStage`](crate::PipelineError::UnknownStage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub(crate) u32);

impl StageId {
    /// Raw index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Consumes data
    Input,
    /// Produces data
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// One end of a connection: a producer's output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Producing stage
    pub producer: StageId,
    /// Output port on the producer
    pub port: usize,
}
