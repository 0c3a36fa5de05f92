//! Bounded retry for Telegram API operations.
//!
//! Only transient failures (network errors and flood control) are retried,
//! using exponential backoff with jitter. With `max_retries = 0` an operation
//! runs exactly once, so a failed send is dropped rather than repeated.
//!
//! # Usage
//!
//! ```ignore
//! use channel_mirror::bot::resilient::retry_transient;
//!
//! let copied = retry_transient(3, || bot.copy_message(to, from, id).into_future()).await?;
//! ```

use crate::config::{TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS};
use std::future::Future;
use std::time::Duration;
use teloxide::RequestError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Whether a failed request may succeed when sent again
#[must_use]
pub const fn is_transient(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
    )
}

/// Run a Telegram operation, retrying transient failures up to `max_retries` times.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error immediately.
pub async fn retry_transient<F, Fut, T>(max_retries: usize, operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(max_retries);

    RetryIf::start(retry_strategy, operation, is_transient)
        .await
        .map_err(|e| {
            if max_retries > 0 && is_transient(&e) {
                warn!(
                    "Telegram API operation failed after {} retries: {}",
                    max_retries, e
                );
            }
            e
        })
}
