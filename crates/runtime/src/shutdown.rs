//! OS shutdown signals bridged to a [`CancellationToken`].

use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::FutureExt;
use tokio::{
    signal::unix::{Signal, SignalKind},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolves once SIGINT or SIGTERM is received.
pub struct ShutdownSignal {
    ctrl_c: Pin<Box<dyn Future<Output = io::Result<()>> + Send>>,
    term_signal: Signal,
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal").finish_non_exhaustive()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Install the signal handlers.
    ///
    /// # Panics
    ///
    /// Panics if the SIGTERM handler cannot be installed.
    pub fn new() -> Self {
        let ctrl_c = Box::pin(tokio::signal::ctrl_c());
        let term_signal = tokio::signal::unix::signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        Self { ctrl_c, term_signal }
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.ctrl_c.poll_unpin(cx).is_ready() {
            debug!("Received SIGINT signal");
            return Poll::Ready(());
        }

        if this.term_signal.poll_recv(cx).is_ready() {
            debug!("Received SIGTERM signal");
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

/// Cancel `token` once a shutdown signal arrives.
///
/// The listener exits quietly if the token is cancelled by someone else first.
pub fn spawn_shutdown_listener(token: CancellationToken) -> JoinHandle<()> {
    let signal = ShutdownSignal::new();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal => {
                info!("Shutdown signal received, stopping");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Drive `fut` to completion unless `token` is cancelled.
///
/// After cancellation `fut` gets `grace` to wind down on its own; `None` is
/// returned if it does not finish in time.
pub async fn run_until_cancelled<F, O>(fut: F, token: CancellationToken, grace: Duration) -> Option<O>
where
    F: Future<Output = O>,
{
    // boxed so the caller does not carry the whole state machine on its stack
    let mut fut = Box::pin(fut);

    tokio::select! {
        result = &mut fut => return Some(result),
        _ = token.cancelled() => {}
    }

    debug!(grace_ms = grace.as_millis(), "Cancellation requested, waiting for graceful completion");
    match tokio::time::timeout(grace, &mut fut).await {
        Ok(result) => Some(result),
        Err(_) => {
            warn!("Graceful shutdown timeout exceeded, abandoning task");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_without_cancellation() {
        let token = CancellationToken::new();
        let result = run_until_cancelled(async { "completed" }, token, Duration::from_secs(1)).await;
        assert_eq!(result, Some("completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_may_finish_within_grace() {
        let token = CancellationToken::new();
        token.cancel();

        let fut = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            7
        };
        assert_eq!(run_until_cancelled(fut, token, Duration::from_secs(1)).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_abandoned_after_grace() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = run_until_cancelled(
            std::future::pending::<()>(),
            token,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn listener_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = spawn_shutdown_listener(token.clone());
        token.cancel();
        handle.await.unwrap();
    }
}
