//! Report emitter.
//!
//! Prints the rendered report and hands it to the notification sink under
//! the recovery policy. Delivery failures end here: they are logged and
//! reported back as `false`, never turned into a run failure.

use std::sync::Arc;
use tracing::{error, info};

use crate::notify::NotificationSink;
use crate::recovery::RecoveryPolicy;
use crate::report;
use crate::types::{AccountFailure, RunReport};

pub struct ReportEmitter {
    sink: Arc<dyn NotificationSink>,
    destination: String,
    policy: RecoveryPolicy,
}

impl ReportEmitter {
    pub fn new(sink: Arc<dyn NotificationSink>, destination: impl Into<String>, policy: RecoveryPolicy) -> Self {
        Self {
            sink,
            destination: destination.into(),
            policy,
        }
    }

    /// Deliver `text`, retrying per policy. Returns whether it got through.
    pub async fn deliver(&self, kind: &str, text: &str) -> bool {
        let label = format!("{}:{}", self.sink.name(), kind);
        let outcome = self
            .policy
            .run(&label, |_| self.sink.deliver(&self.destination, text))
            .await;

        if outcome.is_success() {
            info!(sink = self.sink.name(), kind, attempts = outcome.attempts(), "Notification delivered");
            true
        } else {
            let attempts = outcome.attempts();
            if let Err(e) = outcome.into_result() {
                error!(sink = self.sink.name(), kind, attempts, error = %e, "Notification not delivered");
            }
            false
        }
    }

    /// Print and deliver the run report.
    pub async fn emit(&self, report: &RunReport) -> bool {
        let text = report::render(report);
        println!("{text}");
        self.deliver("report", &text).await
    }

    pub async fn notify_account_failure(&self, failure: &AccountFailure) -> bool {
        self.deliver("account-failure", &report::render_account_failure(failure))
            .await
    }

    /// Best-effort alert for a failed run. A failure here is only logged.
    pub async fn notify_run_failure(&self, error: &str) -> bool {
        self.deliver("run-failure", &report::render_run_failure(error))
            .await
    }
}
