use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::IdempotencyKey;
use domain::{DomainError, WorkState};
use serde_json::Value;

use crate::{
    Claim, IdempotencyLedger, IdempotencyRecord, Outbox, OutboxEvent, Result, StoreError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Checks a ledger status write against the transition table.
///
/// Rewriting the current non-terminal status is allowed so a partial
/// response can be attached to an in-progress record.
fn check_status_change(
    current: WorkState,
    target: WorkState,
) -> std::result::Result<(), DomainError> {
    if current == target && !current.is_terminal() {
        return Ok(());
    }
    current.transition(target).map(|_| ())
}

/// In-memory idempotency ledger.
///
/// A single mutex guards the whole keyed map and every operation is one
/// short critical section, which is what makes `begin` a true single-flight
/// gate. Records are never evicted.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyLedger {
    records: Arc<Mutex<HashMap<IdempotencyKey, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records held.
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryIdempotencyLedger {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        Ok(lock(&self.records).get(key).cloned())
    }

    async fn begin(&self, key: &IdempotencyKey) -> Result<Claim> {
        let mut records = lock(&self.records);
        if let Some(existing) = records.get(key) {
            return Ok(Claim::Existing(existing.clone()));
        }

        let status = WorkState::Init.transition(WorkState::InProgress).map_err(|source| {
            StoreError::InvalidTransition {
                key: key.to_string(),
                source,
            }
        })?;
        let record = IdempotencyRecord::new(key.clone(), status);
        records.insert(key.clone(), record.clone());
        tracing::debug!(idempotency_key = %key, "idempotency record created");
        Ok(Claim::Acquired(record))
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: Option<Value>,
        status: WorkState,
        error: Option<String>,
    ) -> Result<IdempotencyRecord> {
        let mut records = lock(&self.records);
        let existed = records.contains_key(key);
        let record = records
            .entry(key.clone())
            .or_insert_with(|| IdempotencyRecord::new(key.clone(), status));
        if existed {
            check_status_change(record.status, status).map_err(|source| {
                StoreError::InvalidTransition {
                    key: key.to_string(),
                    source,
                }
            })?;
        }

        record.status = status;
        record.response = response;
        record.error = if status == WorkState::Failed { error } else { None };
        record.touch();
        Ok(record.clone())
    }

    async fn bump_retry(&self, key: &IdempotencyKey) -> Result<IdempotencyRecord> {
        let mut records = lock(&self.records);
        let record = records
            .entry(key.clone())
            .or_insert_with(|| IdempotencyRecord::new(key.clone(), WorkState::InProgress));
        record.retries = record.retries.saturating_add(1);
        record.touch();
        Ok(record.clone())
    }

    async fn all(&self) -> Result<Vec<IdempotencyRecord>> {
        Ok(lock(&self.records).values().cloned().collect())
    }
}

/// Hook invoked on every enqueue before the event is buffered.
pub type PublishHook = Arc<dyn Fn(&OutboxEvent) -> std::result::Result<(), String> + Send + Sync>;

/// In-memory outbox.
///
/// Enqueue and drain share one mutex, so a drain hands back exactly the
/// events buffered before it and never duplicates or drops one enqueued
/// concurrently.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    events: Arc<Mutex<Vec<OutboxEvent>>>,
    publish_hook: Option<PublishHook>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an outbox that runs `hook` for each event before buffering it.
    ///
    /// A hook error fails the enqueue and leaves the buffer untouched.
    pub fn with_publish_hook<F>(hook: F) -> Self
    where
        F: Fn(&OutboxEvent) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self {
            events: Arc::default(),
            publish_hook: Some(Arc::new(hook)),
        }
    }

    /// Returns a copy of the buffered events without draining them.
    pub fn pending(&self) -> Vec<OutboxEvent> {
        lock(&self.events).clone()
    }

    /// Returns the buffered events on `topic`.
    pub fn pending_on(&self, topic: &str) -> Vec<OutboxEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn enqueue(&self, topic: &str, payload: Value) -> Result<OutboxEvent> {
        let event = OutboxEvent::new(topic, payload);

        if let Some(hook) = &self.publish_hook {
            hook(&event).map_err(|reason| StoreError::Publish {
                topic: topic.to_string(),
                reason,
            })?;
        }

        lock(&self.events).push(event.clone());
        metrics::counter!("outbox_events_enqueued", "topic" => topic.to_string()).increment(1);
        Ok(event)
    }

    async fn drain(&self) -> Result<Vec<OutboxEvent>> {
        let drained = std::mem::take(&mut *lock(&self.events));
        metrics::counter!("outbox_events_drained").increment(drained.len() as u64);
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn key(k: &str) -> IdempotencyKey {
        IdempotencyKey::new(k)
    }

    #[tokio::test]
    async fn test_begin_creates_in_progress_record() {
        let ledger = InMemoryIdempotencyLedger::new();

        let claim = ledger.begin(&key("k1")).await.unwrap();
        assert!(claim.is_acquired());
        let record = claim.record();
        assert_eq!(record.status, WorkState::InProgress);
        assert_eq!(record.retries, 0);
        assert!(record.response.is_none());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_begin_returns_existing_record_unchanged() {
        let ledger = InMemoryIdempotencyLedger::new();
        ledger.begin(&key("k1")).await.unwrap();
        let done = ledger
            .complete(&key("k1"), Some(json!({"appointment_id": "a-1"})), WorkState::Completed, None)
            .await
            .unwrap();

        let claim = ledger.begin(&key("k1")).await.unwrap();
        assert_eq!(claim, Claim::Existing(done));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_sets_fields() {
        let ledger = InMemoryIdempotencyLedger::new();
        let created = ledger.begin(&key("k1")).await.unwrap().into_record();

        let failed = ledger
            .complete(
                &key("k1"),
                Some(json!({"error": "boom"})),
                WorkState::Failed,
                Some("boom".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(failed.status, WorkState::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.created_at, created.created_at);
        assert!(failed.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_error_is_dropped_unless_failed() {
        let ledger = InMemoryIdempotencyLedger::new();
        ledger.begin(&key("k1")).await.unwrap();
        let record = ledger
            .complete(&key("k1"), None, WorkState::Completed, Some("ignored".into()))
            .await
            .unwrap();
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_terminal_record_is_never_overwritten() {
        let ledger = InMemoryIdempotencyLedger::new();
        ledger.begin(&key("k1")).await.unwrap();
        ledger
            .complete(&key("k1"), Some(json!({"appointment_id": "a-1"})), WorkState::Completed, None)
            .await
            .unwrap();

        let result = ledger
            .complete(&key("k1"), None, WorkState::Failed, Some("late".into()))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));

        let record = ledger.get(&key("k1")).await.unwrap().unwrap();
        assert_eq!(record.status, WorkState::Completed);
        assert_eq!(record.response, Some(json!({"appointment_id": "a-1"})));
    }

    #[tokio::test]
    async fn test_partial_response_can_be_attached_in_progress() {
        let ledger = InMemoryIdempotencyLedger::new();
        ledger.begin(&key("k1")).await.unwrap();
        let record = ledger
            .complete(&key("k1"), Some(json!({"draft": true})), WorkState::InProgress, None)
            .await
            .unwrap();
        assert_eq!(record.status, WorkState::InProgress);
        assert!(record.response.is_some());
    }

    #[tokio::test]
    async fn test_complete_without_begin_creates_record() {
        let ledger = InMemoryIdempotencyLedger::new();
        let record = ledger
            .complete(&key("raced"), None, WorkState::Failed, Some("x".into()))
            .await
            .unwrap();
        assert_eq!(record.status, WorkState::Failed);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_bump_retry_is_monotonic_and_creates_if_absent() {
        let ledger = InMemoryIdempotencyLedger::new();
        assert_eq!(ledger.bump_retry(&key("k1")).await.unwrap().retries, 1);
        assert_eq!(ledger.bump_retry(&key("k1")).await.unwrap().retries, 2);

        let record = ledger.get(&key("k1")).await.unwrap().unwrap();
        assert_eq!(record.status, WorkState::InProgress);
        assert_eq!(record.retries, 2);
    }

    #[tokio::test]
    async fn test_concurrent_begin_acquires_once() {
        let ledger = InMemoryIdempotencyLedger::new();
        let k = key("shared");

        let claims =
            futures_util::future::join_all((0..16).map(|_| ledger.begin(&k))).await;
        let acquired = claims
            .into_iter()
            .map(|c| c.unwrap())
            .filter(Claim::is_acquired)
            .count();
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn test_concurrent_begin_across_threads_acquires_once() {
        let ledger = InMemoryIdempotencyLedger::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.begin(&IdempotencyKey::new("threaded")).await.unwrap()
            }));
        }

        let mut acquired = 0;
        for handle in handles {
            if handle.await.unwrap().is_acquired() {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn test_outbox_drain_returns_and_clears() {
        let outbox = InMemoryOutbox::new();
        outbox.enqueue("appointments.created", json!({"id": 1})).await.unwrap();
        outbox.enqueue("appointments.created", json!({"id": 2})).await.unwrap();

        let drained = outbox.drain().await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload, json!({"id": 1}));
        assert_eq!(drained[1].payload, json!({"id": 2}));
        assert!(outbox.is_empty());
        assert!(outbox.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_hook_failure_leaves_buffer_untouched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let outbox = InMemoryOutbox::with_publish_hook(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("broker unavailable".to_string())
            } else {
                Ok(())
            }
        });

        let err = outbox.enqueue("t", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Publish { ref topic, .. } if topic == "t"));
        assert!(outbox.is_empty());

        outbox.enqueue("t", json!(2)).await.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pending_on_filters_by_topic() {
        let outbox = InMemoryOutbox::new();
        outbox.enqueue("a", json!(1)).await.unwrap();
        outbox.enqueue("b", json!(2)).await.unwrap();
        assert_eq!(outbox.pending_on("b").len(), 1);
        assert_eq!(outbox.pending().len(), 2);
    }
}
