//! Unit-of-work state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The state of a unit of work in its lifecycle.
///
/// State transitions:
/// ```text
/// Init ──► InProgress ──┬──► Completed
///                       └──► Failed
/// ```
///
/// `Completed` and `Failed` are terminal. The table in
/// [`WorkState::can_transition_to`] is the only place legality is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Work has been identified but not started.
    #[default]
    Init,

    /// The provider call is being attempted.
    InProgress,

    /// The appointment was created and recorded (terminal state).
    Completed,

    /// The request failed and its outcome was recorded (terminal state).
    Failed,
}

impl WorkState {
    /// Returns true if `target` is a legal successor of this state.
    pub fn can_transition_to(&self, target: WorkState) -> bool {
        matches!(
            (self, target),
            (WorkState::Init, WorkState::InProgress)
                | (WorkState::InProgress, WorkState::Completed)
                | (WorkState::InProgress, WorkState::Failed)
        )
    }

    /// Validates a transition, returning the target state on success.
    pub fn transition(self, target: WorkState) -> Result<WorkState, DomainError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkState::Completed | WorkState::Failed)
    }

    /// Returns the state name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkState::Init => "init",
            WorkState::InProgress => "in_progress",
            WorkState::Completed => "completed",
            WorkState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Free-function form of [`WorkState::transition`].
pub fn transition(current: WorkState, target: WorkState) -> Result<WorkState, DomainError> {
    current.transition(target)
}
