use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the ledger or outbox.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A status write was rejected by the work-state transition table.
    #[error("Ledger rejected status change for key {key}: {source}")]
    InvalidTransition {
        key: String,
        #[source]
        source: DomainError,
    },

    /// The publish-on-enqueue hook refused an outbox event.
    #[error("Failed to publish event on topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger and outbox operations.
pub type Result<T> = std::result::Result<T, StoreError>;
