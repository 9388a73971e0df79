//! Idempotency ledger and outbox.
//!
//! Both are defined as traits so a durable backing store can replace the
//! in-memory implementations without touching the coordinator.

pub mod error;
pub mod idempotency;
pub mod memory;
pub mod outbox;

pub use error::{Result, StoreError};
pub use idempotency::{Claim, IdempotencyLedger, IdempotencyRecord};
pub use memory::{InMemoryIdempotencyLedger, InMemoryOutbox, PublishHook};
pub use outbox::{Outbox, OutboxEvent};
