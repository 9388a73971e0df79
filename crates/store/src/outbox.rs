//! Outbox contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::Result;

/// A domain event waiting for an external dispatcher.
///
/// Events are immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Append-only buffer decoupling "an event happened" from "the event was published".
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Appends an event stamped with the current time.
    ///
    /// Fails only if a publish-on-enqueue hook rejects the event, in which
    /// case nothing is appended.
    async fn enqueue(&self, topic: &str, payload: Value) -> Result<OutboxEvent>;

    /// Atomically takes every buffered event and clears the buffer.
    async fn drain(&self) -> Result<Vec<OutboxEvent>>;
}
