//! Per-output-port state machine
//!
//! ```text
//! Uninitialized -> CleanMetadata -> CleanExtent -> Valid <-> Stale
//!                                        |                    |
//!                                        +--> Invalid <-------+
//!                                               |
//!                                               +--> Stale
//! ```
//!
//! A change of the declared output kind resets the port to `Uninitialized`
//! outside the table.

use crate::error::StateError;
use serde::{Deserialize, Serialize};

/// Lifecycle of an output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PortState {
    /// No output container yet
    #[default]
    Uninitialized,
    /// Container allocated, information current
    CleanMetadata,
    /// Request negotiated, never executed
    CleanExtent,
    /// Output holds the result of the last negotiated request
    Valid,
    /// Output exists but no longer matches its inputs or request
    Stale,
    /// Last execution failed; never reused as a cached result
    Invalid,
}

impl PortState {
    /// Whether the output can be served without executing
    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == PortState::Valid
    }

    /// Whether the port has been through at least one execute attempt
    #[inline]
    #[must_use]
    pub fn has_executed(self) -> bool {
        matches!(self, PortState::Valid | PortState::Stale | PortState::Invalid)
    }
}

/// Validates a state transition.
///
/// Illegal transitions panic with the `strict-debug` feature and return an
/// error otherwise.
pub fn validate_transition(from: PortState, to: PortState) -> Result<(), StateError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal port state transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(StateError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: PortState) -> Vec<PortState> {
    use PortState::*;
    match from {
        Uninitialized => vec![CleanMetadata],
        CleanMetadata => vec![CleanExtent],
        CleanExtent => vec![Valid, Invalid],
        Valid => vec![Stale],
        Stale => vec![Valid, Invalid],
        Invalid => vec![Stale],
    }
}

fn allowed(from: PortState, to: PortState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
