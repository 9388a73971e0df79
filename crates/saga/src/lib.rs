//! Saga coordinator for appointment booking.
//!
//! This crate orchestrates one business action, creating an appointment
//! against an external calendar provider, with exactly-once effect over
//! at-least-once delivery:
//! 1. Deduplicate the request through the idempotency ledger
//! 2. Call the provider behind a circuit breaker, retrying with backoff
//! 3. Publish the outcome through the outbox
//!
//! If a step fails after the appointment was created, the appointment is
//! cancelled as a compensating action.

pub mod appointment;
pub mod breaker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod masking;
pub mod provider;
pub mod request;
pub mod retry;
pub mod telemetry;

pub use appointment::Route;
pub use breaker::{CircuitBreaker, CircuitError, CircuitState};
pub use config::SagaConfig;
pub use coordinator::AppointmentService;
pub use error::SagaError;
pub use events::{AppointmentCompensatedData, AppointmentCreatedData, AppointmentEvent};
pub use masking::mask_fields;
pub use provider::{CalendarProvider, InMemoryCalendarProvider, ProviderError, ProviderScenario};
pub use request::{AppointmentRequest, AppointmentResponse, RequestPayload};
pub use retry::{RetryError, RetryPolicy, retry_with_backoff, retry_with_backoff_if};
