//! Bounded retry with exponential backoff
//!
//! [`RetryExecutor`] knows nothing about the operation it wraps. It asks the
//! error whether another attempt makes sense ([`Retryable`]) and reports the
//! whole attempt history when it gives up.

mod backoff;
mod error;

pub use backoff::{Backoff, ExponentialBackoff, ExponentialBackoffBuilder, FixedBackoff};
pub use error::{RetryError, Retryable};
pub(crate) use error::distinct_kinds;

use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Growth factor applied per retry
    pub multiplier: f64,
    /// Upper bound of the additive jitter, as a fraction of the current backoff
    pub jitter_factor: f64,
    /// Optional ceiling on the backoff (None for unbounded growth)
    pub max_backoff: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_millis(10),
            multiplier: 2.0,
            jitter_factor: 1.0,
            max_backoff: None,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .initial_delay(self.initial_backoff)
            .max_delay(self.max_backoff)
            .multiplier(self.multiplier)
            .jitter_factor(self.jitter_factor)
            .build()
    }
}

/// Runs an async operation until it succeeds, fails fatally, or runs out of retries
#[derive(Debug, Clone)]
pub struct RetryExecutor<B: Backoff = ExponentialBackoff> {
    config: RetryConfig,
    backoff: B,
}

impl RetryExecutor<ExponentialBackoff> {
    pub fn new(config: RetryConfig) -> Self {
        let backoff = config.backoff();
        Self { config, backoff }
    }
}

impl Default for RetryExecutor<ExponentialBackoff> {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl<B: Backoff> RetryExecutor<B> {
    pub fn with_backoff(config: RetryConfig, backoff: B) -> Self {
        Self { config, backoff }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retry an operation with backoff
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + 'static,
    {
        self.execute_observed(operation, |_, _, _| {}).await
    }

    /// Like [`execute`](Self::execute), calling `on_retry(retry, delay, error)`
    /// before each backoff wait
    pub async fn execute_observed<F, Fut, T, E, O>(
        &self,
        mut operation: F,
        mut on_retry: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + 'static,
        O: FnMut(u32, Duration, &E),
    {
        let mut errors: Vec<E> = Vec::new();

        loop {
            trace!(attempt = errors.len() + 1, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if !errors.is_empty() {
                        debug!(attempts = errors.len() + 1, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(
                    attempt = errors.len() + 1,
                    error = %error,
                    "Non-retryable failure"
                );
                return Err(RetryError::NonRetryable {
                    error,
                    previous: errors,
                });
            }

            let retries_used = errors.len() as u32;
            if retries_used >= self.config.max_retries {
                warn!(
                    attempts = retries_used + 1,
                    error = %error,
                    "Maximum retry attempts exceeded"
                );
                errors.push(error);
                return Err(RetryError::ExhaustedRetries { errors });
            }

            let retry = retries_used + 1;
            let delay = self.backoff.next_delay(retry);
            warn!(
                attempt = retry,
                delay_ms = ?delay.as_millis(),
                error = %error,
                "Operation failed, retrying after delay"
            );
            on_retry(retry, delay, &error);
            errors.push(error);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
