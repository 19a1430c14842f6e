//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient fetch failures.
//! Delays grow exponentially from `initial_delay` and are capped at `max_delay`;
//! jitter is optional. Waiting between attempts is cancellable.
//!
//! # Example
//!
//! ```no_run
//! use audio_hub::retry::{Cancelled, IsRetryable, with_retry};
//! use audio_hub::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//!     Cancelled,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! impl From<Cancelled> for MyError {
//!     fn from(_: Cancelled) -> Self {
//!         MyError::Cancelled
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! with_retry(&config, 3, &cancel, |_, _, _| {}, |_attempt| async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection resets, HTTP 5xx) should return `true`.
/// Permanent failures (unsupported URL, unavailable media, missing binary) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Marker returned when a backoff wait was interrupted by cancellation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based), without jitter
    ///
    /// `initial_delay * multiplier^(retry-1)`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Backoff shape (delays, multiplier, jitter)
/// * `max_retries` - Retries allowed after the first attempt
/// * `cancel` - Interrupts the backoff wait; the operation itself must watch it too
/// * `on_retry` - Called as `(retry_number, delay, &error)` before each wait
/// * `operation` - Called with the 1-based attempt number
///
/// # Returns
///
/// The first success, the first non-retryable error, the last error once
/// `max_retries` is exhausted, or `E::from(Cancelled)` if cancelled while waiting.
pub async fn with_retry<F, Fut, T, E, R>(
    config: &RetryConfig,
    max_retries: u32,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + From<Cancelled> + std::fmt::Display,
    R: FnMut(u32, Duration, &E),
{
    let mut retries = 0;

    loop {
        match operation(retries + 1).await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && retries < max_retries => {
                retries += 1;

                let base = config.delay_for(retries);
                let delay = if config.jitter { add_jitter(base) } else { base };

                tracing::warn!(
                    error = %e,
                    retry = retries,
                    max_retries,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                on_retry(retries, delay, &e);

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(retry = retries, "Backoff wait cancelled");
                        return Err(E::from(Cancelled));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = retries + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
