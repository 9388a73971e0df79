//! Shared identifier types for the appointment saga workspace.

pub mod types;

pub use types::{CorrelationId, IdempotencyKey};
