//! Notification sinks.
//!
//! The pipeline hands finished reports (and failure alerts) to a
//! `NotificationSink`. Delivery is fallible and is retried by the caller
//! under the same recovery policy as fetching.

pub mod log;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::types::NotifyError;

/// Delivers a text message to a destination (chat id, channel, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), NotifyError>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Pick the sink for this run: Telegram when `[notify]` names its env
/// vars (which must then resolve), otherwise the log. Returns the sink
/// and its destination.
pub fn sink_from_config(cfg: &AppConfig) -> Result<(Arc<dyn NotificationSink>, String)> {
    match cfg.telegram_credentials()? {
        Some(creds) => {
            let sink = telegram::TelegramSink::new(creds.token, cfg.notify.api_base.clone())?;
            info!(chat_id = %creds.chat_id, "Reports go to Telegram");
            Ok((Arc::new(sink), creds.chat_id))
        }
        None => {
            warn!("No Telegram settings in [notify], reports go to the log only");
            Ok((Arc::new(self::log::LogSink), "log".to_string()))
        }
    }
}
