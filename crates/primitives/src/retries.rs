use std::time::Duration;

use alloy::transports::{
    RpcError, TransportError, TransportErrorKind,
    layers::{RetryBackoffLayer, RetryPolicy},
};
use alloy_json_rpc::ErrorPayload;
use serde::Deserialize;
use tokio_retry::{RetryIf, strategy::ExponentialBackoff};

/// Maximum number of retries for a transient RPC error.
const DEFAULT_MAX_RETRIES: u32 = 9;

/// Initial backoff for a transient RPC error, in milliseconds.
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Compute units per second assumed for the RPC provider.
const DEFAULT_COMPUTE_UNITS_PER_SECOND: u64 = 330;

/// Retry settings applied to the chain RPC transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcRetryConfig {
    /// Retries attempted before the error surfaces to the caller
    pub max_retries: u32,
    /// First backoff interval in milliseconds; doubled on every attempt
    pub initial_backoff_ms: u64,
    /// Provider throughput budget used to pace retries
    pub compute_units_per_second: u64,
}

impl Default for RpcRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            compute_units_per_second: DEFAULT_COMPUTE_UNITS_PER_SECOND,
        }
    }
}

impl RpcRetryConfig {
    /// Build the transport layer retrying rate limits and refused connections.
    pub const fn layer(&self) -> RetryBackoffLayer<RateLimitConnRefusedRetryPolicy> {
        RetryBackoffLayer::new_with_policy(
            self.max_retries,
            self.initial_backoff_ms,
            self.compute_units_per_second,
            RateLimitConnRefusedRetryPolicy,
        )
    }
}

/// Extension trait classifying [`RpcError<TransportErrorKind>`] values.
///
/// Mirrors the private helper of the same name in alloy's transport crate.
pub(crate) trait RpcErrorExt {
    /// Whether the request should be retried.
    fn is_retryable(&self) -> bool;

    /// Backoff requested by the provider, if any.
    fn backoff_hint(&self) -> Option<Duration>;
}

impl RpcErrorExt for RpcError<TransportErrorKind> {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retry_err(),
            Self::DeserError { text, .. } => {
                if let Ok(resp) = serde_json::from_str::<ErrorPayload>(text) {
                    return resp.is_retry_err();
                }

                // some providers omit the `id` field on error responses
                #[derive(Deserialize)]
                struct Resp {
                    error: ErrorPayload,
                }

                serde_json::from_str::<Resp>(text).is_ok_and(|resp| resp.error.is_retry_err())
            }
            Self::ErrorResp(err) => err.is_retry_err(),
            Self::NullResp => true,
            _ => false,
        }
    }

    fn backoff_hint(&self) -> Option<Duration> {
        let Self::ErrorResp(resp) = self else { return None };
        let Some(Ok(data)) = resp.try_data_as::<serde_json::Value>() else { return None };

        // infura reports the requested backoff when a rate limit is hit
        let seconds = &data["rate"]["backoff_seconds"];
        seconds
            .as_u64()
            .map(Duration::from_secs)
            .or_else(|| seconds.as_f64().map(|s| Duration::from_secs(s as u64 + 1)))
    }
}

/// A retry policy that also retries "connection refused" errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitConnRefusedRetryPolicy;

impl RetryPolicy for RateLimitConnRefusedRetryPolicy {
    fn should_retry(&self, error: &TransportError) -> bool {
        error.is_retryable() || is_connection_refused(error)
    }

    fn backoff_hint(&self, error: &TransportError) -> Option<Duration> {
        error.backoff_hint()
    }
}

/// Checks whether the error message contains "connection refused".
#[inline]
pub fn is_connection_refused<S: ToString>(e: S) -> bool {
    e.to_string().to_lowercase().contains("connection refused")
}

/// Retry `op` with exponential backoff while `condition` holds for its error.
///
/// At most `max_retries` retries are made, starting from `initial_backoff`.
pub async fn retry_with_backoff_if<F, Fut, T, E, C>(
    op: F,
    condition: C,
    initial_backoff: Duration,
    max_retries: usize,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: FnMut(&E) -> bool,
{
    let base_ms = u64::try_from(initial_backoff.as_millis()).unwrap_or(u64::MAX).max(1);
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(base_ms / 2 + 1)
        .max_delay(Duration::from_secs(30))
        .take(max_retries);
    RetryIf::spawn(strategy, op, condition).await
}
