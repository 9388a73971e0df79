//! Saga error types.

use store::StoreError;
use thiserror::Error;

use crate::provider::ProviderError;

/// Tag stored for a request rejected by an open circuit.
pub const TAG_CIRCUIT_OPEN: &str = "circuit_open";

/// Tag stored for a request whose attempt budget ran out.
pub const TAG_RETRY_EXHAUSTED: &str = "retry_exhausted";

/// Errors that can occur while handling an appointment request.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The action label does not route to any flow.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// The provider circuit is open.
    #[error("Circuit is open")]
    CircuitOpen,

    /// Provider failures outlasted the attempt budget.
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { last_error: String, attempts: u32 },

    /// Provider error.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Ledger or outbox error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SagaError {
    /// Stable tag recorded in the ledger and returned to callers.
    ///
    /// Unclassified failures are tagged with their display string.
    pub fn error_tag(&self) -> String {
        match self {
            SagaError::BadRequest(_) => "bad_request".to_string(),
            SagaError::UnsupportedAction(_) => "unsupported_action".to_string(),
            SagaError::CircuitOpen => TAG_CIRCUIT_OPEN.to_string(),
            SagaError::RetryExhausted { .. } => TAG_RETRY_EXHAUSTED.to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classified_tags() {
        assert_eq!(SagaError::CircuitOpen.error_tag(), "circuit_open");
        let exhausted = SagaError::RetryExhausted {
            last_error: "provider timeout: timeout".to_string(),
            attempts: 3,
        };
        assert_eq!(exhausted.error_tag(), "retry_exhausted");
        assert_eq!(
            SagaError::UnsupportedAction("delete-appointment".into()).error_tag(),
            "unsupported_action"
        );
    }

    #[test]
    fn test_generic_failure_is_stringified() {
        let err = SagaError::from(ProviderError::Permanent("permanent failure".into()));
        assert_eq!(err.error_tag(), "provider failure: permanent failure");

        let err = SagaError::from(StoreError::Publish {
            topic: "appointments.created".into(),
            reason: "broker down".into(),
        });
        assert!(err.error_tag().contains("broker down"));
    }
}
