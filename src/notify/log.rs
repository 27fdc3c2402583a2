//! Fallback sink used when no messaging credentials are configured.
//! Messages go to the log and delivery always succeeds.

use async_trait::async_trait;
use tracing::info;

use super::NotificationSink;
use crate::types::NotifyError;

#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        info!(destination, message = text, "Notification (log only)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
