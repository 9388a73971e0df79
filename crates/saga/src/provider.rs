//! Calendar provider port and an in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures reported by a calendar provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider did not answer in time; worth retrying.
    #[error("provider timeout: {0}")]
    Timeout(String),

    /// The provider rejected the request.
    #[error("provider failure: {0}")]
    Permanent(String),

    /// The appointment to cancel does not exist.
    #[error("appointment not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Returns true for failure categories that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

/// External calendar the coordinator books appointments against.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Creates an appointment and returns its provider-assigned ID.
    async fn create_appointment(&self, payload: &Value) -> Result<String, ProviderError>;

    /// Cancels a previously created appointment. Best-effort.
    async fn cancel_appointment(&self, appointment_id: &str) -> Result<(), ProviderError>;
}

/// Behaviour of [`InMemoryCalendarProvider::create_appointment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderScenario {
    /// Succeed immediately.
    #[default]
    Immediate,
    /// Succeed after the given delay.
    Delayed(Duration),
    /// Time out on the first `n` calls, then succeed.
    FailTimes(u32),
    /// Time out on every call.
    AlwaysTimeout,
    /// Reject every call permanently.
    AlwaysFail,
}

#[derive(Debug, Default)]
struct InMemoryCalendarState {
    scenario: ProviderScenario,
    call_count: u32,
    cancel_count: u32,
    next_id: u32,
    created_ids: Vec<String>,
    cancelled_ids: Vec<String>,
    fail_on_cancel: bool,
}

/// In-memory calendar provider for testing.
///
/// A caller-supplied `appointment_id` in the payload is honoured; otherwise
/// IDs are assigned sequentially as `APT-0001`, `APT-0002`, ...
#[derive(Debug, Clone, Default)]
pub struct InMemoryCalendarProvider {
    state: Arc<RwLock<InMemoryCalendarState>>,
}

impl InMemoryCalendarProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenario(scenario: ProviderScenario) -> Self {
        let provider = Self::default();
        provider.set_scenario(scenario);
        provider
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryCalendarState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryCalendarState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_scenario(&self, scenario: ProviderScenario) {
        self.write().scenario = scenario;
    }

    /// Configures the service to fail cancellation calls.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.write().fail_on_cancel = fail;
    }

    /// Number of create calls received, successful or not.
    pub fn call_count(&self) -> u32 {
        self.read().call_count
    }

    /// Number of cancel calls received, successful or not.
    pub fn cancel_count(&self) -> u32 {
        self.read().cancel_count
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.read().created_ids.clone()
    }

    pub fn cancelled_ids(&self) -> Vec<String> {
        self.read().cancelled_ids.clone()
    }

    fn record_success(&self, payload: &Value) -> String {
        let mut state = self.write();
        let appointment_id = match payload.get("appointment_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                format!("APT-{:04}", state.next_id)
            }
        };
        state.created_ids.push(appointment_id.clone());
        appointment_id
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendarProvider {
    #[tracing::instrument(skip(self, payload))]
    async fn create_appointment(&self, payload: &Value) -> Result<String, ProviderError> {
        let (scenario, call) = {
            let mut state = self.write();
            state.call_count += 1;
            (state.scenario, state.call_count)
        };

        match scenario {
            ProviderScenario::Immediate => Ok(self.record_success(payload)),
            ProviderScenario::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.record_success(payload))
            }
            ProviderScenario::FailTimes(n) if call <= n => {
                Err(ProviderError::Timeout("transient timeout".to_string()))
            }
            ProviderScenario::FailTimes(_) => Ok(self.record_success(payload)),
            ProviderScenario::AlwaysTimeout => Err(ProviderError::Timeout("timeout".to_string())),
            ProviderScenario::AlwaysFail => {
                Err(ProviderError::Permanent("permanent failure".to_string()))
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_appointment(&self, appointment_id: &str) -> Result<(), ProviderError> {
        let mut state = self.write();
        state.cancel_count += 1;
        if state.fail_on_cancel {
            return Err(ProviderError::Permanent("cancellation rejected".to_string()));
        }
        if !state.created_ids.iter().any(|id| id == appointment_id) {
            return Err(ProviderError::NotFound(appointment_id.to_string()));
        }
        state.cancelled_ids.push(appointment_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_create_and_cancel() {
        let provider = InMemoryCalendarProvider::new();

        let id = provider.create_appointment(&json!({})).await.unwrap();
        assert_eq!(id, "APT-0001");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.created_ids(), vec!["APT-0001"]);

        provider.cancel_appointment(&id).await.unwrap();
        assert_eq!(provider.cancel_count(), 1);
        assert_eq!(provider.cancelled_ids(), vec!["APT-0001"]);
    }

    #[tokio::test]
    async fn test_supplied_appointment_id_is_used() {
        let provider = InMemoryCalendarProvider::new();
        let id = provider
            .create_appointment(&json!({ "appointment_id": "custom-7" }))
            .await
            .unwrap();
        assert_eq!(id, "custom-7");
    }

    #[tokio::test]
    async fn test_fail_times_then_succeed() {
        let provider = InMemoryCalendarProvider::with_scenario(ProviderScenario::FailTimes(1));

        let first = provider.create_appointment(&json!({})).await;
        assert!(matches!(first, Err(ProviderError::Timeout(_))));
        assert!(first.unwrap_err().is_transient());

        assert!(provider.create_appointment(&json!({})).await.is_ok());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_always_fail_is_permanent() {
        let provider = InMemoryCalendarProvider::with_scenario(ProviderScenario::AlwaysFail);
        let err = provider.create_appointment(&json!({})).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(provider.created_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_success_waits() {
        let provider = InMemoryCalendarProvider::with_scenario(ProviderScenario::Delayed(
            Duration::from_millis(100),
        ));
        let start = tokio::time::Instant::now();
        provider.create_appointment(&json!({})).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_fail_on_cancel() {
        let provider = InMemoryCalendarProvider::new();
        provider.set_fail_on_cancel(true);
        assert!(provider.cancel_appointment("APT-0001").await.is_err());
        assert_eq!(provider.cancel_count(), 1);
        assert!(provider.cancelled_ids().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_appointment_is_not_found() {
        let provider = InMemoryCalendarProvider::new();
        let err = provider.cancel_appointment("APT-9999").await.unwrap_err();
        assert_eq!(err, ProviderError::NotFound("APT-9999".to_string()));
        assert!(!err.is_transient());
        assert!(provider.cancelled_ids().is_empty());
    }
}
