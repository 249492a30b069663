//! Error types for vizflow-pipeline
//!
//! Everything that can go wrong during graph construction or a pull surfaces
//! as a [`PipelineError`]. Pulls never panic past their boundary; callers
//! decide whether to retry with other parameters, skip or abort.

use crate::state::PortState;
use crate::types::{Direction, StageId};
use std::path::PathBuf;
use vizflow_core::{DataError, DataKind, NegotiationError};

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Connection rejected at wiring time
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),

    /// A required input has no connection
    #[error("{stage} is missing required input `{port}`")]
    MissingInput {
        /// Stage whose input is unconnected
        stage: StageId,
        /// Input port name
        port: String,
    },

    /// A producer cannot satisfy the subset asked of it
    #[error("negotiation failed at {stage}: {source}")]
    Negotiation {
        /// Stage that could not satisfy the request
        stage: StageId,
        /// Underlying reason
        source: NegotiationError,
    },

    /// Metadata exchange reported failure
    #[error("metadata exchange failed at {stage}: {source}")]
    Metadata {
        /// Failing stage
        stage: StageId,
        /// Stage-reported failure
        source: StageError,
    },

    /// Execute reported failure
    #[error("execution failed at {stage}: {source}")]
    Execution {
        /// Failing stage
        stage: StageId,
        /// Stage-reported failure
        source: StageError,
    },

    /// The pulled stage was not reached because something upstream failed
    #[error("{stage} not updated: upstream {upstream} failed: {source}")]
    UpstreamFailed {
        /// Stage that was pulled
        stage: StageId,
        /// First stage that failed
        upstream: StageId,
        /// Failure at `upstream`
        source: Box<PipelineError>,
    },

    /// No stage with this identifier
    #[error("unknown stage {0}")]
    UnknownStage(StageId),

    /// Port index out of range
    #[error("{stage} has no {direction} port {port}")]
    InvalidPort {
        /// Stage addressed
        stage: StageId,
        /// Port direction
        direction: Direction,
        /// Offending index
        port: usize,
    },

    /// Downcast to a concrete stage type failed
    #[error("{stage} is a `{actual}`, not a `{expected}`")]
    WrongStageType {
        /// Stage addressed
        stage: StageId,
        /// Requested type
        expected: &'static str,
        /// Registered type name
        actual: &'static str,
    },

    /// Stage construction from the registry failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Port state machine violation
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl PipelineError {
    /// Check if the error was raised while wiring the graph
    #[inline]
    #[must_use]
    pub fn is_wiring(&self) -> bool {
        matches!(self, Self::Wiring(_))
    }

    /// Check if a later pull could succeed without changing the graph
    ///
    /// Negotiation and execution failures depend on parameters and data;
    /// wiring, lookup and configuration errors do not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Negotiation { .. } | Self::Execution { .. } | Self::Metadata { .. } => true,
            Self::UpstreamFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Stage at which the failure originated
    #[must_use]
    pub fn failed_stage(&self) -> Option<StageId> {
        match self {
            Self::MissingInput { stage, .. }
            | Self::Negotiation { stage, .. }
            | Self::Metadata { stage, .. }
            | Self::Execution { stage, .. }
            | Self::InvalidPort { stage, .. }
            | Self::WrongStageType { stage, .. } => Some(*stage),
            Self::UpstreamFailed { upstream, .. } => Some(*upstream),
            Self::UnknownStage(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, looking through [`PipelineError::UpstreamFailed`]
    #[must_use]
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::UpstreamFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Graph wiring errors, detected at connect time
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WiringError {
    /// Producer output kind does not satisfy the consumer's constraint
    #[error("{producer} produces {produced}, but input `{port}` of {consumer} requires {required}")]
    IncompatibleType {
        /// Producing stage
        producer: StageId,
        /// Kind produced
        produced: DataKind,
        /// Consuming stage
        consumer: StageId,
        /// Input port name
        port: String,
        /// Kind required
        required: DataKind,
    },

    /// A stage cannot feed itself
    #[error("{0} cannot be connected to itself")]
    SelfLoop(StageId),

    /// The connection would close a cycle
    #[error("connecting {producer} to {consumer} would create a cycle")]
    Cycle {
        /// Producing stage
        producer: StageId,
        /// Consuming stage
        consumer: StageId,
    },

    /// Port already holds a connection and does not accept more
    #[error("input `{port}` of {stage} is already connected and not repeatable")]
    NotRepeatable {
        /// Consuming stage
        stage: StageId,
        /// Input port name
        port: String,
    },

    /// Disconnect of a connection that does not exist
    #[error("{producer}:{out_port} is not connected to {consumer}:{in_port}")]
    NotConnected {
        /// Producing stage
        producer: StageId,
        /// Producer output port
        out_port: usize,
        /// Consuming stage
        consumer: StageId,
        /// Consumer input port
        in_port: usize,
    },
}

/// Failure reported by a stage callback
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    /// Free-form failure
    #[error("{0}")]
    Failed(String),

    /// An input the stage needs holds no data
    #[error("input {0} holds no data")]
    MissingInput(usize),

    /// Data manipulation failed
    #[error(transparent)]
    Data(#[from] DataError),
}

impl StageError {
    /// Free-form failure
    #[inline]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Missing data on input `port`
    #[inline]
    #[must_use]
    pub fn missing_input(port: usize) -> Self {
        Self::MissingInput(port)
    }
}

/// Stage registry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// No factory registered under this name
    #[error("unknown stage type `{0}`")]
    UnknownType(String),

    /// Factory rejected its parameters
    #[error("invalid parameters for `{type_name}`: {reason}")]
    InvalidParams {
        /// Stage type
        type_name: String,
        /// Why the parameters were rejected
        reason: String,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Config text is not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed value out of range
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Port state machine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Transition not in the allowed table
    #[error("illegal port state transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: PortState,
        /// Requested state
        to: PortState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failure_reports_origin() {
        let inner = PipelineError::Execution {
            stage: StageId(1),
            source: StageError::failed("boom"),
        };
        let err = PipelineError::UpstreamFailed {
            stage: StageId(4),
            upstream: StageId(1),
            source: Box::new(inner),
        };
        assert_eq!(err.failed_stage(), Some(StageId(1)));
        assert!(err.is_retryable());
        assert!(matches!(err.root(), PipelineError::Execution { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn wiring_is_not_retryable() {
        let err = PipelineError::from(WiringError::SelfLoop(StageId(0)));
        assert!(err.is_wiring());
        assert!(!err.is_retryable());
    }
}
