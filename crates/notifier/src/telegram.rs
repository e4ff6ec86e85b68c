//! Telegram Bot API client.

use std::time::Duration;

use async_trait::async_trait;
use derive_more::Debug;
use eyre::{Result, WrapErr, bail};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
    retry::{RetryPolicy, retry_delivery},
    sink::{DeliveryError, NotificationSink},
};

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct BotUser {
    username: Option<String>,
}

/// Client for the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    #[debug(skip)]
    http: HttpClient,
    api_base: Url,
    #[debug(skip)]
    bot_token: String,
    retry: RetryPolicy,
}

impl TelegramClient {
    /// Create a client for the bot identified by `bot_token`, talking to `api_base`.
    pub fn new(api_base: Url, bot_token: String, retry: RetryPolicy) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client")?;
        Ok(Self { http, api_base, bot_token, retry })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.as_str().trim_end_matches('/'), self.bot_token, method)
    }

    /// Check that the bot token is accepted. Returns the bot's username.
    pub async fn verify(&self) -> Result<String> {
        let resp = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .wrap_err("failed to reach Telegram API")?;
        let status = resp.status();
        let body: ApiResponse<BotUser> =
            resp.json().await.wrap_err("invalid getMe response from Telegram API")?;

        if !status.is_success() || !body.ok {
            bail!(
                "Telegram API rejected bot token ({status}): {}",
                body.description.unwrap_or_default()
            );
        }
        let username = body.result.and_then(|u| u.username).unwrap_or_default();
        info!(%username, "Telegram bot verified");
        Ok(username)
    }

    async fn send_once(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = SendMessage { chat_id, text, parse_mode: "HTML", disable_web_page_preview: true };
        let resp = self.http.post(self.method_url("sendMessage")).json(&body).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let description = resp
            .json::<ApiResponse<serde_json::Value>>()
            .await
            .ok()
            .and_then(|r| r.description)
            .unwrap_or_default();
        Err(DeliveryError::Rejected { status, description })
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn deliver(&self, channel: &str, text: &str) -> Result<(), DeliveryError> {
        retry_delivery(self.retry, || self.send_once(channel, text)).await?;
        debug!(chat_id = channel, "Message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;

    const FAST: RetryPolicy = RetryPolicy { initial_backoff: Duration::from_millis(1), max_retries: 2 };

    fn client(server: &Server) -> TelegramClient {
        TelegramClient::new(server.url().parse().unwrap(), "123:abc".to_owned(), FAST).unwrap()
    }

    #[tokio::test]
    async fn delivers_html_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": "-100200",
                "text": "<b>burn</b>",
                "parse_mode": "HTML",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .expect(1)
            .create_async()
            .await;

        client(&server).deliver("-100200", "<b>burn</b>").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejection_is_reported_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).deliver("-1", "hi").await.unwrap_err();
        match err {
            DeliveryError::Rejected { status, description } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_surface() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server).deliver("-1", "hi").await.unwrap_err();
        assert!(err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn verify_returns_bot_username() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/bot123:abc/getMe")
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"id":1,"is_bot":true,"username":"burnwatch_bot"}}"#)
            .create_async()
            .await;

        assert_eq!(client(&server).verify().await.unwrap(), "burnwatch_bot");
    }

    #[tokio::test]
    async fn verify_fails_on_unauthorized_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/bot123:abc/getMe")
            .with_status(401)
            .with_body(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
            .create_async()
            .await;

        let err = client(&server).verify().await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }
}
