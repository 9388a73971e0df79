//! Idempotency ledger contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::IdempotencyKey;
use domain::WorkState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Outcome of one unit of work, keyed by its idempotency key.
///
/// At most one record exists per key. Once `status` is terminal the record
/// only changes through [`IdempotencyLedger::bump_retry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub status: WorkState,
    /// Result payload; may be attached while still in progress.
    pub response: Option<Value>,
    /// Number of provider attempts made on behalf of this key.
    pub retries: u32,
    /// Failure description, only set when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates a record in the given status with no response.
    pub fn new(key: IdempotencyKey, status: WorkState) -> Self {
        let now = Utc::now();
        Self {
            key,
            status,
            response: None,
            retries: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Refreshes `updated_at`, never moving it backwards.
    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Result of [`IdempotencyLedger::begin`].
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// No record existed; the caller now owns the unit of work.
    Acquired(IdempotencyRecord),
    /// A record already existed and is returned unchanged.
    Existing(IdempotencyRecord),
}

impl Claim {
    pub fn record(&self) -> &IdempotencyRecord {
        match self {
            Claim::Acquired(record) | Claim::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> IdempotencyRecord {
        match self {
            Claim::Acquired(record) | Claim::Existing(record) => record,
        }
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self, Claim::Acquired(_))
    }
}

/// Keyed store of unit-of-work outcomes with single-flight semantics.
///
/// Every operation is atomic with respect to concurrent callers using the
/// same key. Implementations backed by durable storage can be substituted
/// without changing the coordinator.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Returns the record for `key`, if any.
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    /// Single-flight gate.
    ///
    /// Creates an `InProgress` record when none exists and reports
    /// [`Claim::Acquired`]; otherwise returns the existing record unchanged as
    /// [`Claim::Existing`], whatever its status.
    async fn begin(&self, key: &IdempotencyKey) -> Result<Claim>;

    /// Records the outcome of a unit of work.
    ///
    /// The status change is validated against the work-state transition
    /// table, so terminal records are never overwritten. A missing record is
    /// created directly in `status`.
    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: Option<Value>,
        status: WorkState,
        error: Option<String>,
    ) -> Result<IdempotencyRecord>;

    /// Increments the attempt counter, creating an `InProgress` record if absent.
    async fn bump_retry(&self, key: &IdempotencyKey) -> Result<IdempotencyRecord>;

    /// Snapshot of every record.
    async fn all(&self) -> Result<Vec<IdempotencyRecord>>;
}
