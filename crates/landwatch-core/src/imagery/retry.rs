//! Retry with exponential backoff for transient catalog errors.

use std::future::Future;

use tracing::warn;

use super::ImageryError;
use crate::config::RetryPolicy;

/// Run `op` until it succeeds, fails non-transiently, or the retry budget
/// runs out. Delay before retry `n` is `backoff_base_ms * 2^(n-1)`.
///
/// Exhaustion surfaces as `ImageryError::CatalogUnavailable` carrying the
/// attempt count and the last transient reason.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    op: F,
) -> Result<T, ImageryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ImageryError>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(ImageryError::Transient(reason)) => {
                if attempt >= max_attempts {
                    return Err(ImageryError::CatalogUnavailable {
                        attempts: attempt,
                        reason,
                    });
                }
                let delay = policy.backoff(attempt);
                warn!(
                    operation = %operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "transient catalog error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}
