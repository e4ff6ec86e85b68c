use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// A message could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The messaging API answered with a non-success status.
    #[error("message rejected with status {status}: {description}")]
    Rejected {
        /// HTTP status returned by the API
        status: StatusCode,
        /// Error description returned by the API, if any
        description: String,
    },
    /// The request never produced a response.
    #[error("message request failed")]
    Transport(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Whether sending the same message again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => is_retryable_status(*status),
            Self::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.status().is_some_and(is_retryable_status)
            }
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Delivers formatted messages to a channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `text` to `channel`. Returns once the message was accepted.
    async fn deliver(&self, channel: &str, text: &str) -> Result<(), DeliveryError>;
}
