//! The daily fetch → aggregate → reconcile → report pipeline.
//!
//! One `Pipeline::run` call is one independent run:
//!
//! ```text
//! Idle → Fetching → Aggregated → Reconciling → Reported → Done
//!   any state → Failed → NotifyFailure → Done
//! ```
//!
//! Per-account failures never fail the run. Anything else that goes
//! wrong (unreadable settlement file, ledger write error, ...) moves the
//! run to `Failed`, which sends one best-effort alert and stops.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::aggregator::Aggregator;
use super::emitter::ReportEmitter;
use super::reconciler::RevenueReconciler;
use crate::config::AppConfig;
use crate::notify::NotificationSink;
use crate::portal::OrderSource;
use crate::recovery::RecoveryPolicy;
use crate::storage::{export, ledger, settlement};
use crate::storage::ledger::LedgerEntry;
use crate::storage::settlement::SettlementColumns;
use crate::types::{FetchTarget, PaymentInstructions, RevenueMode, RunReport};

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Aggregated,
    Reconciling,
    Reported,
    Failed,
    NotifyFailure,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Fetching => "fetching",
            RunState::Aggregated => "aggregated",
            RunState::Reconciling => "reconciling",
            RunState::Reported => "reported",
            RunState::Failed => "failed",
            RunState::NotifyFailure => "notify-failure",
            RunState::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// How a run ended. Both variants are terminal; nothing carries over.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        report: RunReport,
        /// Whether the notification sink accepted the report.
        delivered: bool,
    },
    Failed {
        error: String,
        /// State the run was in when it failed.
        failed_in: RunState,
        /// Whether the failure alert got through.
        notified: bool,
    },
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed { report, .. } => Some(report),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    targets: Vec<FetchTarget>,
    source: Arc<dyn OrderSource>,
    emitter: ReportEmitter,
    policy: RecoveryPolicy,
    reconciler: RevenueReconciler,
    settlement: Option<(PathBuf, SettlementColumns)>,
    ledger_path: Option<PathBuf>,
    export_path: Option<PathBuf>,
    payment: Option<PaymentInstructions>,
    notify_account_failures: bool,
    run_date: Option<NaiveDate>,
}

/// Assembles a [`Pipeline`]. Everything except the source, sink and
/// accounts has a default: fixed rate 0, no settlement, no ledger.
pub struct PipelineBuilder {
    targets: Vec<FetchTarget>,
    source: Arc<dyn OrderSource>,
    sink: Arc<dyn NotificationSink>,
    destination: String,
    policy: RecoveryPolicy,
    mode: RevenueMode,
    settlement: Option<(PathBuf, SettlementColumns)>,
    ledger_path: Option<PathBuf>,
    export_path: Option<PathBuf>,
    payment: Option<PaymentInstructions>,
    notify_account_failures: bool,
    run_date: Option<NaiveDate>,
}

impl PipelineBuilder {
    pub fn new(source: Arc<dyn OrderSource>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            targets: Vec::new(),
            source,
            sink,
            destination: String::new(),
            policy: RecoveryPolicy::default(),
            mode: RevenueMode::FixedRate {
                rate_per_order: rust_decimal::Decimal::ZERO,
            },
            settlement: None,
            ledger_path: None,
            export_path: None,
            payment: None,
            notify_account_failures: false,
            run_date: None,
        }
    }

    pub fn targets(mut self, targets: Vec<FetchTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn revenue_mode(mut self, mode: RevenueMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn settlement(mut self, path: impl Into<PathBuf>, columns: SettlementColumns) -> Self {
        self.settlement = Some((path.into(), columns));
        self
    }

    pub fn ledger(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    pub fn export_orders(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    pub fn payment(mut self, payment: Option<PaymentInstructions>) -> Self {
        self.payment = payment;
        self
    }

    pub fn notify_account_failures(mut self, enabled: bool) -> Self {
        self.notify_account_failures = enabled;
        self
    }

    /// Fix the report date instead of using today's local date.
    pub fn run_date(mut self, date: NaiveDate) -> Self {
        self.run_date = Some(date);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            targets: self.targets,
            source: self.source,
            emitter: ReportEmitter::new(self.sink, self.destination, self.policy.clone()),
            policy: self.policy,
            reconciler: RevenueReconciler::new(self.mode),
            settlement: self.settlement,
            ledger_path: self.ledger_path,
            export_path: self.export_path,
            payment: self.payment,
            notify_account_failures: self.notify_account_failures,
            run_date: self.run_date,
        }
    }
}

impl Pipeline {
    pub fn builder(source: Arc<dyn OrderSource>, sink: Arc<dyn NotificationSink>) -> PipelineBuilder {
        PipelineBuilder::new(source, sink)
    }

    /// Wire a pipeline from validated configuration. Fails if an account
    /// secret cannot be resolved.
    pub fn from_config(
        cfg: &AppConfig,
        source: Arc<dyn OrderSource>,
        sink: Arc<dyn NotificationSink>,
        destination: impl Into<String>,
    ) -> Result<Self> {
        let mut builder = PipelineBuilder::new(source, sink)
            .targets(cfg.fetch_targets()?)
            .destination(destination)
            .policy(cfg.recovery_policy()?)
            .revenue_mode(cfg.revenue_mode())
            .payment(cfg.payment_instructions())
            .notify_account_failures(cfg.notify.account_failures);

        if let Some(s) = &cfg.settlement {
            builder = builder.settlement(
                s.path.clone(),
                SettlementColumns {
                    date: s.date_column.clone(),
                    amount: s.amount_column.clone(),
                },
            );
        }
        if cfg.ledger.enabled {
            builder = builder.ledger(cfg.ledger.path.clone());
        }
        if let Some(path) = &cfg.export.orders_path {
            builder = builder.export_orders(path.clone());
        }

        Ok(builder.build())
    }

    /// Execute one run. Never returns an error: failures are reported in
    /// the outcome after the failure alert has been attempted.
    pub async fn run(&self) -> RunOutcome {
        let mut state = RunState::Idle;
        info!(accounts = self.targets.len(), source = self.source.name(), "Run starting");

        match self.execute(&mut state).await {
            Ok((report, delivered)) => {
                transition(&mut state, RunState::Done);
                info!(
                    orders = report.order_count,
                    computed = %report.computed_total,
                    failed_accounts = report.failed_accounts.len(),
                    delivered,
                    "Run complete"
                );
                RunOutcome::Completed { report, delivered }
            }
            Err(e) => {
                let failed_in = state;
                let message = format!("{e:#}");
                transition(&mut state, RunState::Failed);
                error!(severity = "critical", state = %failed_in, error = %message, "Run failed");

                transition(&mut state, RunState::NotifyFailure);
                let notified = self.emitter.notify_run_failure(&message).await;
                if !notified {
                    error!("Failure alert could not be delivered either");
                }

                transition(&mut state, RunState::Done);
                RunOutcome::Failed {
                    error: message,
                    failed_in,
                    notified,
                }
            }
        }
    }

    async fn execute(&self, state: &mut RunState) -> Result<(RunReport, bool)> {
        transition(state, RunState::Fetching);
        let aggregate = Aggregator::new(self.source.as_ref(), &self.policy)
            .collect(&self.targets)
            .await;
        transition(state, RunState::Aggregated);

        if self.notify_account_failures {
            for failure in &aggregate.failures {
                self.emitter.notify_account_failure(failure).await;
            }
        }

        if let Some(path) = &self.export_path {
            if aggregate.orders.is_empty() {
                debug!(path = %path.display(), "No orders to export");
            } else {
                export::write_orders(path, &aggregate.orders)?;
            }
        }

        transition(state, RunState::Reconciling);
        let settlement_total = match &self.settlement {
            Some((path, columns)) => settlement::read_total(path, columns)
                .context("Failed to read settlement file")?,
            None => None,
        };
        let result = self
            .reconciler
            .reconcile(&aggregate.orders, settlement_total.as_ref());
        if result.skipped_orders > 0 {
            warn!(skipped = result.skipped_orders, "Some order amounts were unreadable");
        }

        let date = self.run_date.unwrap_or_else(|| Local::now().date_naive());
        let report = RunReport {
            date,
            order_count: result.order_count,
            revenue_mode: self.reconciler.mode().clone(),
            computed_total: result.computed_total,
            external_total: result.external_total,
            difference: result.difference,
            skipped_orders: result.skipped_orders,
            skipped_settlement_rows: result.skipped_settlement_rows,
            failed_accounts: aggregate.failures,
            payment: self.payment.clone(),
        };

        if let Some(path) = &self.ledger_path {
            ledger::append(
                path,
                &LedgerEntry {
                    date,
                    order_count: report.order_count as u64,
                    total: report.computed_total,
                },
            )?;
        }

        let delivered = self.emitter.emit(&report).await;
        transition(state, RunState::Reported);

        Ok((report, delivered))
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = %state, to = %next, "Run state");
    *state = next;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
