//! Caller-side retry with exponential backoff and jitter
//!
//! The backend itself never retries transient failures (apart from the
//! abuse acknowledgement in fetch). Hosts that want retries wrap whole
//! operations with [`retry_with_backoff`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RetryConfig;
use crate::error::{Error, ErrorKind, Result};

/// Retry a fallible async operation with exponential backoff
///
/// # Example
/// ```ignore
/// let names = retry_with_backoff(
///     &config.retry,
///     || backend.list(),
///     is_retryable_error,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= config.max_attempts || !is_retryable(&err) {
            return Err(err);
        }

        let delay = backoff_delay(config, attempt);
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// `initial * 2^(attempt-1)` capped at `max_backoff_ms`, plus up to the
/// same amount again as jitter
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base_ms = config
        .initial_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_backoff_ms);
    Duration::from_millis(base_ms + jitter(base_ms))
}

/// Clock-derived value in `0..bound`
fn jitter(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % bound
}

/// Only transient failures are worth another attempt
pub fn is_retryable_error(error: &Error) -> bool {
    error.kind() == ErrorKind::Transient
}
