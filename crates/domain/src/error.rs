//! Domain error types.

use thiserror::Error;

use crate::state::WorkState;

/// Errors that can occur during domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The requested state change is not in the transition table.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: WorkState, to: WorkState },
}
