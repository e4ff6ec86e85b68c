use std::{future::Future, time::Duration};

use primitives::retries::retry_with_backoff_if;
use tracing::warn;

use crate::sink::DeliveryError;

/// Backoff applied to retryable delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry; grows exponentially
    pub initial_backoff: Duration,
    /// Retries after the first attempt
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_backoff: Duration::from_millis(500), max_retries: 3 }
    }
}

/// Run `op`, retrying with exponential backoff while the error is retryable.
pub(crate) async fn retry_delivery<F, Fut, T>(policy: RetryPolicy, op: F) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    retry_with_backoff_if(
        op,
        |err: &DeliveryError| {
            let retry = err.is_retryable();
            if retry {
                warn!(error = %err, "Delivery failed, retrying");
            }
            retry
        },
        policy.initial_backoff,
        policy.max_retries,
    )
    .await
}
