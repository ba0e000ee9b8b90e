//! Requeue backoff policy and retry helper
//!
//! Reconcile retries follow a two-phase policy: a fixed short delay while
//! a failure is young, escalating to capped exponential backoff once the
//! resource has failed to converge for longer than the initial window.
//! The policy is a pure function of the time since the first failure, so
//! it needs no hidden counters and can be tested without a scheduler.

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::Error;

/// Two-phase requeue policy
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay used while within the initial window
    pub initial_delay: Duration,
    /// How long the fixed-delay phase lasts, measured from first failure
    pub initial_window: Duration,
    /// Upper bound for the exponential phase
    pub max_delay: Duration,
    /// Multiplier applied per initial_delay elapsed beyond the window
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            initial_window: Duration::from_secs(120),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Compute the requeue delay given how long ago the resource first
    /// started failing.
    ///
    /// Inside the initial window the delay is constant; beyond it the
    /// delay doubles (by `multiplier`) per elapsed `initial_delay` step,
    /// capped at `max_delay`.
    pub fn next_requeue(&self, since_first_failure: Duration) -> Duration {
        if since_first_failure <= self.initial_window {
            return self.initial_delay;
        }

        let beyond = since_first_failure - self.initial_window;
        let steps = (beyond.as_secs_f64() / self.initial_delay.as_secs_f64().max(1e-9))
            .floor()
            .max(1.0)
            .min(64.0);
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powf(steps);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Configuration for in-process retries of transient external calls
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Only errors the taxonomy classifies as retryable are retried; a fatal
/// error is returned from the first attempt that produced it. Jitter
/// spreads retries of independent callers apart.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut delay = config.initial_delay;

    for attempt in 1u32.. {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() {
            warn!(
                operation = %operation_name,
                attempt,
                error = %err,
                "not retryable, giving up"
            );
            return Err(err);
        }
        if config.max_attempts > 0 && attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %err,
                "retries exhausted"
            );
            return Err(err);
        }

        let jittered = delay.mul_f64(rand::thread_rng().gen_range(0.5..1.5));
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = jittered.as_millis() as u64,
            "retrying"
        );
        tokio::time::sleep(jittered).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier)
                .min(config.max_delay.as_secs_f64()),
        );
    }
    unreachable!("retry loop exits by returning")
}
