//! Circuit breaker guarding one downstream dependency.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// Default number of consecutive failures that opens the circuit.
pub const DEFAULT_FAIL_THRESHOLD: u32 = 3;

/// Default time the circuit stays open before a trial call is allowed.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(5);

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit is open; the wrapped call was not attempted.
    #[error("Circuit is open")]
    Open,

    /// The wrapped call ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open)
    }
}

/// Observable breaker state.
///
/// Only two fields are stored; `HalfOpen` is derived from an open circuit
/// whose cooldown has elapsed but which has not yet seen its trial call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Fails fast once `fail_threshold` consecutive failures have been seen,
/// and lets the next call through once `reset_timeout` has elapsed.
///
/// Counters and the open timestamp sit behind a per-instance mutex, so one
/// breaker can be shared by every concurrent caller of the dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    fail_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAIL_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }
}

impl CircuitBreaker {
    /// Creates a breaker. A threshold of zero is treated as one.
    pub fn new(fail_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            fail_threshold: fail_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn fail_threshold(&self) -> u32 {
        self.fail_threshold
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` unless the circuit is open.
    ///
    /// An expired cooldown resets the breaker to closed before `f` runs, which
    /// makes this call the half-open trial. The failure of `f` is always
    /// propagated; opening the circuit is a side effect.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitError::Open);
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    /// Returns true iff the circuit is not currently open, counting an
    /// elapsed cooldown as closed.
    pub fn closed(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        let state = self.lock();
        match state.opened_at {
            None => CircuitState::Closed,
            Some(opened_at) if opened_at.elapsed() >= self.reset_timeout => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn admit(&self) -> bool {
        let mut state = self.lock();
        let Some(opened_at) = state.opened_at else {
            return true;
        };
        if opened_at.elapsed() < self.reset_timeout {
            return false;
        }

        state.opened_at = None;
        state.consecutive_failures = 0;
        tracing::info!("circuit_half_open");
        true
    }

    fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.fail_threshold {
            if state.opened_at.is_none() {
                metrics::counter!("circuit_breaker_opened").increment(1);
            }
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                consecutive_failures = state.consecutive_failures,
                "circuit_opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    async fn failing(calls: &AtomicU32) -> Result<(), &'static str> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("boom")
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(5));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result = breaker.call(|| failing(&calls)).await;
            assert!(matches!(result, Err(CircuitError::Inner("boom"))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.closed());

        let result = breaker.call(|| failing(&calls)).await;
        assert!(matches!(result, Err(CircuitError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_after_cooldown() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(5));
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let _ = breaker.call(|| failing(&calls)).await;
        }

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(breaker.call(|| failing(&calls)).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.closed());

        let result: Result<u32, CircuitError<&str>> = breaker.call(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_accumulates_towards_threshold_again() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        for _ in 0..2 {
            let _ = breaker.call(|| failing(&calls)).await;
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let _ = breaker.call(|| failing(&calls)).await;
        assert_eq!(breaker.consecutive_failures(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = breaker.call(|| failing(&calls)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_threshold_of_one_reopens_on_failed_trial() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let _ = breaker.call(|| failing(&calls)).await;
        assert_eq!(breaker.consecutive_failures(), 1);

        let _ = breaker.call(|| failing(&calls)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::default();
        let calls = AtomicU32::new(0);
        let _ = breaker.call(|| failing(&calls)).await;
        let _ = breaker.call(|| failing(&calls)).await;
        assert_eq!(breaker.consecutive_failures(), 2);

        let ok: Result<(), CircuitError<&str>> = breaker.call(|| async { Ok(()) }).await;
        assert!(ok.is_ok());
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(breaker.closed());
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        assert_eq!(CircuitBreaker::new(0, DEFAULT_RESET_TIMEOUT).fail_threshold(), 1);
    }
}
