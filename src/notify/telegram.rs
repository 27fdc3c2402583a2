//! Telegram Bot API sink.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage
//! Endpoint: `POST {base}/bot{token}/sendMessage` with `{chat_id, text}`.
//! A 2xx response can still carry `"ok": false`; that counts as a failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::NotificationSink;
use crate::types::NotifyError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const SINK_NAME: &str = "telegram";
const REQUEST_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct TelegramSink {
    http: Client,
    token: SecretString,
    api_base: String,
}

impl TelegramSink {
    /// Create a sink for the given bot token. `api_base` overrides the
    /// public Bot API host (used by tests and self-hosted bot servers).
    pub fn new(token: String, api_base: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            token: SecretString::new(token),
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token.expose_secret())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        debug!(chat_id = destination, chars = text.chars().count(), "Sending Telegram message");

        let resp = self
            .http
            .post(self.send_url())
            .json(&SendMessageRequest {
                chat_id: destination,
                text,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ApiResponse = resp.json().await?;
        if !body.ok {
            return Err(NotifyError::Rejected(
                body.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        info!(chat_id = destination, "Telegram notification sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        SINK_NAME
    }
}
