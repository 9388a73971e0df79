//! Bounded retries with exponential backoff.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Retry configuration.
///
/// The delay after failed attempt `n` (1-based) is
/// `base_delay * multiplier^(n-1)`. With the defaults (3 attempts, 50ms,
/// x2.0) a call that keeps failing sleeps 50ms, then 100ms, then gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Growth factor applied to the delay after each further failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Returns a copy with a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Backoff to wait after `attempt` (1-based) has failed.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Returns `true` if another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.effective_max_attempts()
    }

    fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a retried call gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt in the budget failed.
    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    Exhausted { last_error: E, attempts: u32 },

    /// A failure was classified as not worth retrying.
    #[error("retry aborted after {attempts} attempts: {error}")]
    Aborted { error: E, attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Aborted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The last underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Calls `f` until it succeeds or the attempt budget runs out, retrying
/// every failure. Returns the value and the number of attempts used.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    f: F,
) -> Result<(T, u32), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_if(policy, f, |_| true).await
}

/// Like [`retry_with_backoff`], but stops immediately with
/// [`RetryError::Aborted`] when `should_retry` rejects a failure.
///
/// Backoff suspends the calling task; nothing else runs on its behalf in
/// the meantime.
pub async fn retry_with_backoff_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut f: F,
    mut should_retry: P,
) -> Result<(T, u32), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match f().await {
            Ok(value) => return Ok((value, attempt)),
            Err(err) => err,
        };

        if !should_retry(&err) {
            return Err(RetryError::Aborted {
                error: err,
                attempts: attempt,
            });
        }
        if !policy.should_retry(attempt) {
            return Err(RetryError::Exhausted {
                last_error: err,
                attempts: attempt,
            });
        }

        let delay = policy.backoff_duration(attempt);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retry_scheduled");
        tokio::time::sleep(delay).await;
    }
}
