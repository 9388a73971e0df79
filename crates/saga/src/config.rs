//! Coordinator configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::DEFAULT_ACTION_ATTRIBUTE;

use crate::breaker::{CircuitBreaker, DEFAULT_FAIL_THRESHOLD, DEFAULT_RESET_TIMEOUT};
use crate::error::{Result, SagaError};
use crate::masking::DEFAULT_SENSITIVE_FIELDS;
use crate::retry::RetryPolicy;

/// Coordinator configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_FAIL_THRESHOLD`: consecutive failures that open the circuit (default: `3`)
/// - `SAGA_RESET_TIMEOUT_MS`: circuit cooldown (default: `5000`)
/// - `SAGA_MAX_ATTEMPTS`: provider attempts per request (default: `3`)
/// - `SAGA_BASE_DELAY_MS`: first backoff delay (default: `50`)
/// - `SAGA_BACKOFF_MULTIPLIER`: backoff growth factor (default: `2.0`)
/// - `SAGA_ACTION_ATTRIBUTE`: attribute holding the action label (default: `"data-action"`)
/// - `SAGA_RETRY_PERMANENT_FAILURES`: retry permanent provider errors too (default: `true`)
/// - `SAGA_IN_FLIGHT_WAIT_MS`: how long a duplicate waits for the owner (default: `5000`)
/// - `SAGA_IN_FLIGHT_POLL_MS`: ledger poll interval while waiting (default: `10`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `SAGA_LOG_JSON`: emit JSON log lines (default: `false`)
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    pub fail_threshold: u32,
    pub reset_timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub action_attribute: String,
    pub retry_permanent_failures: bool,
    pub in_flight_wait: Duration,
    pub in_flight_poll_interval: Duration,
    pub sensitive_fields: Vec<String>,
    pub log_level: String,
    pub log_json: bool,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fail_threshold: env_or("SAGA_FAIL_THRESHOLD", defaults.fail_threshold),
            reset_timeout: env_millis("SAGA_RESET_TIMEOUT_MS", defaults.reset_timeout),
            max_attempts: env_or("SAGA_MAX_ATTEMPTS", defaults.max_attempts),
            base_delay: env_millis("SAGA_BASE_DELAY_MS", defaults.base_delay),
            backoff_multiplier: env_or("SAGA_BACKOFF_MULTIPLIER", defaults.backoff_multiplier),
            action_attribute: std::env::var("SAGA_ACTION_ATTRIBUTE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.action_attribute),
            retry_permanent_failures: env_or(
                "SAGA_RETRY_PERMANENT_FAILURES",
                defaults.retry_permanent_failures,
            ),
            in_flight_wait: env_millis("SAGA_IN_FLIGHT_WAIT_MS", defaults.in_flight_wait),
            in_flight_poll_interval: env_millis(
                "SAGA_IN_FLIGHT_POLL_MS",
                defaults.in_flight_poll_interval,
            ),
            sensitive_fields: defaults.sensitive_fields,
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: env_or("SAGA_LOG_JSON", defaults.log_json),
        }
    }

    /// Rejects values the breaker and retry policy cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.fail_threshold == 0 {
            return Err(SagaError::Config("fail_threshold must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(SagaError::Config("max_attempts must be positive".into()));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(SagaError::Config(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.in_flight_poll_interval.is_zero() {
            return Err(SagaError::Config("in_flight_poll_interval must be positive".into()));
        }
        Ok(())
    }

    /// Retry policy for one request, honouring a per-request attempt budget.
    pub fn retry_policy(&self, max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts.unwrap_or(self.max_attempts),
            self.base_delay,
            self.backoff_multiplier,
        )
    }

    /// A fresh breaker built from this configuration.
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(self.fail_threshold, self.reset_timeout)
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            max_attempts: retry.max_attempts,
            base_delay: retry.base_delay,
            backoff_multiplier: retry.multiplier,
            action_attribute: DEFAULT_ACTION_ATTRIBUTE.to_string(),
            retry_permanent_failures: true,
            in_flight_wait: Duration::from_secs(5),
            in_flight_poll_interval: Duration::from_millis(10),
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}
