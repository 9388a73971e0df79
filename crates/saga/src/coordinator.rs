//! Appointment coordinator: idempotency gate, guarded provider call,
//! outbox publication and compensation.

use std::sync::Arc;

use common::{CorrelationId, IdempotencyKey};
use domain::{ActionExtractor, DefaultActionExtractor, WorkState};
use serde_json::{Value, json};
use store::{Claim, IdempotencyLedger, IdempotencyRecord, Outbox, OutboxEvent};
use tokio::time::Instant;

use crate::appointment::{Route, SAGA_TYPE};
use crate::breaker::{CircuitBreaker, CircuitError};
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::events::AppointmentEvent;
use crate::masking::mask_fields;
use crate::provider::{CalendarProvider, ProviderError};
use crate::request::{AppointmentRequest, AppointmentResponse, RequestPayload};
use crate::retry::{RetryError, retry_with_backoff_if};

/// Executes appointment requests end to end.
///
/// A request is routed, gated through the idempotency ledger, and on first
/// delivery runs the provider call behind the circuit breaker and retry
/// policy. Every execution outcome is persisted to the ledger so that a
/// redelivered request gets the same answer without touching the provider.
pub struct AppointmentService<P, L, O>
where
    P: CalendarProvider,
    L: IdempotencyLedger,
    O: Outbox,
{
    provider: P,
    ledger: L,
    outbox: O,
    breaker: Arc<CircuitBreaker>,
    extractor: Arc<dyn ActionExtractor>,
    config: SagaConfig,
}

impl<P, L, O> AppointmentService<P, L, O>
where
    P: CalendarProvider,
    L: IdempotencyLedger,
    O: Outbox,
{
    /// Creates a coordinator with the default configuration.
    pub fn new(provider: P, ledger: L, outbox: O) -> Self {
        let config = SagaConfig::default();
        Self {
            provider,
            ledger,
            outbox,
            breaker: Arc::new(config.breaker()),
            extractor: Arc::new(DefaultActionExtractor),
            config,
        }
    }

    /// Creates a coordinator after validating `config`.
    pub fn with_config(provider: P, ledger: L, outbox: O, config: SagaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            ledger,
            outbox,
            breaker: Arc::new(config.breaker()),
            extractor: Arc::new(DefaultActionExtractor),
            config,
        })
    }

    /// Shares an existing breaker, e.g. one guarding the same provider for
    /// several coordinators.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_extractor(mut self, extractor: impl ActionExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Handles one request.
    ///
    /// Malformed requests and unknown actions are returned as `Err` and never
    /// reach the ledger. Execution failures are persisted and returned as an
    /// `Ok` response with `state = failed` and an error tag.
    #[tracing::instrument(
        skip(self, request),
        fields(
            saga_type = SAGA_TYPE,
            correlation_id = tracing::field::Empty,
            idempotency_key = tracing::field::Empty,
            route = tracing::field::Empty,
        )
    )]
    pub async fn handle(&self, request: AppointmentRequest) -> Result<AppointmentResponse> {
        metrics::counter!("appointment_requests_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.dispatch(request).await;

        metrics::histogram!("appointment_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(&self, request: AppointmentRequest) -> Result<AppointmentResponse> {
        let AppointmentRequest {
            event,
            payload,
            idempotency_key,
            correlation_id,
        } = request;
        let correlation_id = CorrelationId::or_generate(correlation_id.as_deref());
        let key = IdempotencyKey::or_generate(idempotency_key.as_deref());
        let span = tracing::Span::current();
        span.record("correlation_id", correlation_id.as_str());
        span.record("idempotency_key", key.as_str());

        // 1. Validate and route
        let event = event.ok_or_else(|| SagaError::BadRequest("Missing event".to_string()))?;
        let attribute = payload
            .attribute
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.config.action_attribute);
        let action_label = self.extractor.extract(&event, attribute);
        if action_label.is_empty() {
            return Err(SagaError::BadRequest("Missing action label".to_string()));
        }
        let Some(route) = Route::from_label(&action_label) else {
            tracing::warn!(%action_label, "unsupported action");
            return Err(SagaError::UnsupportedAction(action_label));
        };
        span.record("route", route.as_str());

        // 2. Idempotency gate
        match self.ledger.begin(&key).await? {
            Claim::Existing(record) => {
                let record = if record.is_terminal() || record.response.is_some() {
                    record
                } else {
                    self.await_in_flight(record).await?
                };
                Ok(Self::replay(&record))
            }
            Claim::Acquired(_) => match route {
                Route::CreateAppointment => {
                    self.create_appointment(&key, &correlation_id, payload)
                        .await
                }
            },
        }
    }

    /// Answers a duplicate delivery from the ledger record.
    fn replay(record: &IdempotencyRecord) -> AppointmentResponse {
        match record.status {
            WorkState::Completed => {
                metrics::counter!("appointment_idempotent_hits").increment(1);
                tracing::info!(retries = record.retries, "idempotent_hit");
            }
            WorkState::Failed => {
                tracing::info!(error = ?record.error, "idempotent_failure_replay");
            }
            WorkState::Init | WorkState::InProgress => {
                tracing::info!(has_response = record.response.is_some(), "in_progress_replay");
            }
        }
        AppointmentResponse::from_record(record)
    }

    /// Polls the ledger until the owner of `record` finishes or attaches a
    /// response, or the in-flight wait runs out.
    async fn await_in_flight(&self, record: IdempotencyRecord) -> Result<IdempotencyRecord> {
        let deadline = Instant::now() + self.config.in_flight_wait;
        let mut latest = record;
        while !latest.is_terminal() && latest.response.is_none() && Instant::now() < deadline {
            tokio::time::sleep(self.config.in_flight_poll_interval).await;
            if let Some(record) = self.ledger.get(&latest.key).await? {
                latest = record;
            }
        }
        Ok(latest)
    }

    #[tracing::instrument(skip(self, payload))]
    async fn create_appointment(
        &self,
        key: &IdempotencyKey,
        correlation_id: &CorrelationId,
        payload: RequestPayload,
    ) -> Result<AppointmentResponse> {
        let masked = mask_fields(&payload.fields, &self.config.sensitive_fields);
        let provider_payload = Value::Object(masked.clone());
        let policy = self.config.retry_policy(payload.max_attempts);
        let retry_permanent = self.config.retry_permanent_failures;
        tracing::debug!(payload = %provider_payload, "creating appointment");

        let provider_payload = &provider_payload;
        let outcome = retry_with_backoff_if(
            &policy,
            move || async move {
                // Only attempts the breaker admits count as retries.
                self.breaker
                    .call(move || async move {
                        if let Err(err) = self.ledger.bump_retry(key).await {
                            tracing::warn!(error = %err, "failed to record retry");
                        }
                        self.provider.create_appointment(provider_payload).await
                    })
                    .await
            },
            |err: &CircuitError<ProviderError>| match err {
                CircuitError::Open => false,
                CircuitError::Inner(e) => retry_permanent || e.is_transient(),
            },
        )
        .await;

        let (appointment_id, attempts) = match outcome {
            Ok(created) => created,
            Err(err) => return self.fail(key, correlation_id, classify(err), None).await,
        };

        // The appointment exists upstream from here on: any failure must
        // compensate it.
        let event = AppointmentEvent::created(
            &appointment_id,
            key.as_str(),
            correlation_id.as_str(),
            masked,
        );
        if let Err(err) = self.publish(&event).await {
            return self
                .fail(key, correlation_id, err, Some(&appointment_id))
                .await;
        }

        let response = json!({
            "appointment_id": appointment_id,
            "state": WorkState::Completed,
            "idempotency_key": key,
            "retries": attempts,
        });
        let record = match self
            .ledger
            .complete(key, Some(response), WorkState::Completed, None)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                return self
                    .fail(key, correlation_id, err.into(), Some(&appointment_id))
                    .await;
            }
        };

        metrics::counter!("appointment_completed").increment(1);
        tracing::info!(%appointment_id, retries = record.retries, "appointment_created");
        Ok(AppointmentResponse::from_record(&record))
    }

    /// Persists a failed outcome, compensating `appointment_id` if one was
    /// created before the failure. A ledger error is returned only after
    /// compensation has run.
    async fn fail(
        &self,
        key: &IdempotencyKey,
        correlation_id: &CorrelationId,
        err: SagaError,
        appointment_id: Option<&str>,
    ) -> Result<AppointmentResponse> {
        let tag = err.error_tag();
        let category = match &err {
            SagaError::CircuitOpen => {
                tracing::warn!("circuit_open");
                "circuit_open"
            }
            SagaError::RetryExhausted {
                last_error,
                attempts,
            } => {
                tracing::error!(attempts, %last_error, "retry_exhausted");
                "retry_exhausted"
            }
            other => {
                tracing::error!(error = %other, ?appointment_id, "appointment_failed");
                "error"
            }
        };
        metrics::counter!("appointment_failed", "reason" => category).increment(1);

        let written = self
            .ledger
            .complete(key, None, WorkState::Failed, Some(tag.clone()))
            .await;

        // Compensate even when the failure could not be recorded.
        if let Some(appointment_id) = appointment_id {
            self.compensate(key, correlation_id, appointment_id, &tag)
                .await;
        }

        Ok(AppointmentResponse::from_record(&written?))
    }

    /// Cancels a created appointment. Best-effort: a failed cancel is logged
    /// as dead-lettered and never retried.
    #[tracing::instrument(skip(self, key, correlation_id))]
    async fn compensate(
        &self,
        key: &IdempotencyKey,
        correlation_id: &CorrelationId,
        appointment_id: &str,
        reason: &str,
    ) {
        metrics::counter!("appointment_compensations").increment(1);

        match self.provider.cancel_appointment(appointment_id).await {
            Ok(()) => {
                let event = AppointmentEvent::compensated(
                    appointment_id,
                    key.as_str(),
                    correlation_id.as_str(),
                    reason,
                );
                if let Err(err) = self.publish(&event).await {
                    tracing::warn!(error = %err, "compensation event not published");
                }
                tracing::warn!("appointment_compensated");
            }
            Err(err) => {
                tracing::error!(error = %err, dead_letter = true, "compensation_failed");
            }
        }
    }

    async fn publish(&self, event: &AppointmentEvent) -> Result<OutboxEvent> {
        let payload = event.to_payload()?;
        Ok(self.outbox.enqueue(event.topic(), payload).await?)
    }
}

/// Maps a failed guarded call onto the coordinator's error categories.
fn classify(err: RetryError<CircuitError<ProviderError>>) -> SagaError {
    match err {
        RetryError::Exhausted {
            last_error: CircuitError::Open,
            ..
        }
        | RetryError::Aborted {
            error: CircuitError::Open,
            ..
        } => SagaError::CircuitOpen,
        RetryError::Exhausted {
            last_error: CircuitError::Inner(err),
            attempts,
        } => SagaError::RetryExhausted {
            last_error: err.to_string(),
            attempts,
        },
        RetryError::Aborted {
            error: CircuitError::Inner(err),
            ..
        } => SagaError::Provider(err),
    }
}
