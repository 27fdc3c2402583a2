use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use tally::engine::pipeline::{Pipeline, RunOutcome, RunState};
use tally::recovery::RecoveryPolicy;
use tally::storage::settlement::SettlementColumns;
use tally::types::{PaymentInstructions, RevenueMode};

use crate::common::{target, RecordingSink, Script, ScriptedSource};

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_partial_account_failure_still_reports() {
    let source = Arc::new(ScriptedSource::new(&[
        ("a@example.com", Script::Orders(3)),
        ("b@example.com", Script::Down),
    ]));
    let sink = RecordingSink::new();

    let pipeline = Pipeline::builder(source.clone(), Arc::new(sink.clone()))
        .targets(vec![target("a@example.com"), target("b@example.com")])
        .destination("chat-1")
        .policy(RecoveryPolicy::default())
        .revenue_mode(RevenueMode::FixedRate { rate_per_order: dec!(20) })
        .run_date(run_date())
        .build();

    let started = Instant::now();
    let outcome = pipeline.run().await;

    let report = match outcome {
        RunOutcome::Completed { report, delivered } => {
            assert!(delivered);
            report
        }
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(report.order_count, 3);
    assert_eq!(report.computed_total, dec!(60));
    assert_eq!(report.failed_accounts.len(), 1);
    assert_eq!(report.failed_accounts[0].account, "b@example.com");
    assert_eq!(report.failed_accounts[0].attempts, 3);
    assert_eq!(source.calls("a@example.com"), 1);
    assert_eq!(source.calls("b@example.com"), 3);

    // 3s + 6s between B's three attempts.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(9) && elapsed < Duration::from_millis(9100));

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "chat-1");
    assert!(messages[0].1.contains("- Orders: 3"));
    assert!(messages[0].1.contains("- Computed total: 60.00"));
    assert!(messages[0].1.contains("b@example.com (3 attempts)"));
}

#[tokio::test(start_paused = true)]
async fn test_flaky_account_recovers_within_budget() {
    let source = Arc::new(ScriptedSource::new(&[("a", Script::FlakyThen(2, 4))]));
    let sink = RecordingSink::new();

    let pipeline = Pipeline::builder(source.clone(), Arc::new(sink.clone()))
        .targets(vec![target("a")])
        .policy(RecoveryPolicy::default())
        .revenue_mode(RevenueMode::AmountColumn { index: 2 })
        .run_date(run_date())
        .build();

    let report = pipeline.run().await.report().cloned().unwrap();
    assert_eq!(source.calls("a"), 3);
    assert!(report.failed_accounts.is_empty());
    // 10 + 11 + 12 + 13
    assert_eq!(report.computed_total, dec!(46));
}

#[tokio::test(start_paused = true)]
async fn test_reconciles_against_settlement_file() {
    let dir = tempfile::tempdir().unwrap();
    let bank = dir.path().join("bank.csv");
    std::fs::write(&bank, "date,amount,memo\n2026-10-19,30,x\n2026-10-18,20,y\n2026-10-19,n/a,z\n").unwrap();

    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(3))]));
    let sink = RecordingSink::new();

    let pipeline = Pipeline::builder(source, Arc::new(sink.clone()))
        .targets(vec![target("a")])
        .revenue_mode(RevenueMode::FixedRate { rate_per_order: dec!(20) })
        .settlement(&bank, SettlementColumns::default())
        .payment(Some(PaymentInstructions {
            bank: "Post Office".into(),
            account: "0021009".into(),
            transfer_url: None,
        }))
        .run_date(run_date())
        .build();

    let report = pipeline.run().await.report().cloned().unwrap();
    assert_eq!(report.external_total, Some(dec!(50)));
    assert_eq!(report.difference, Some(dec!(10)));
    assert_eq!(report.skipped_settlement_rows, 1);

    let text = &sink.messages()[0].1;
    assert!(text.contains("- Settlement total: 50.00"));
    assert!(text.contains("- Difference: +10.00"));
    assert!(text.contains("Amount due today: 60.00"));
    assert!(text.contains("- Skipped settlement rows: 1"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_settlement_file_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(1))]));
    let sink = RecordingSink::new();

    let pipeline = Pipeline::builder(source, Arc::new(sink.clone()))
        .targets(vec![target("a")])
        .settlement(dir.path().join("absent.csv"), SettlementColumns::default())
        .run_date(run_date())
        .build();

    let report = pipeline.run().await.report().cloned().unwrap();
    assert_eq!(report.external_total, None);
    assert!(sink.messages()[0].1.contains("- Settlement total: unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_run_failure_sends_single_alert_and_ends() {
    let dir = tempfile::tempdir().unwrap();
    let bank = dir.path().join("bank.csv");
    std::fs::write(&bank, "posted,value\n2026-10-19,30\n").unwrap();

    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(2))]));
    let sink = RecordingSink::new();

    let pipeline = Pipeline::builder(source, Arc::new(sink.clone()))
        .targets(vec![target("a")])
        .destination("ops")
        .settlement(&bank, SettlementColumns::default())
        .run_date(run_date())
        .build();

    match pipeline.run().await {
        RunOutcome::Failed { error, failed_in, notified } => {
            assert_eq!(failed_in, RunState::Reconciling);
            assert!(notified);
            assert!(error.contains("date"));
            assert!(error.contains("amount"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "ops");
    assert!(messages[0].1.starts_with("ALERT: daily run failed:"));
}

#[tokio::test(start_paused = true)]
async fn test_rejecting_sink_does_not_fail_run() {
    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(2))]));
    let sink = RecordingSink::rejecting();

    let pipeline = Pipeline::builder(source, Arc::new(sink.clone()))
        .targets(vec![target("a")])
        .policy(RecoveryPolicy::new(2, Duration::from_secs(1), 1.0).unwrap())
        .run_date(run_date())
        .build();

    match pipeline.run().await {
        RunOutcome::Completed { delivered, report } => {
            assert!(!delivered);
            assert_eq!(report.order_count, 2);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(sink.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_orders_exported_with_account_column() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("orders.csv");

    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(2)), ("b", Script::Orders(1))]));
    let pipeline = Pipeline::builder(source, Arc::new(RecordingSink::new()))
        .targets(vec![target("a"), target("b")])
        .export_orders(&export)
        .run_date(run_date())
        .build();

    assert!(pipeline.run().await.is_completed());

    let written = std::fs::read_to_string(&export).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines, vec!["a-000,delivered,10,a", "a-001,delivered,11,a", "b-000,delivered,10,b"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_orders_skips_export() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("orders.csv");

    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(0))]));
    let pipeline = Pipeline::builder(source, Arc::new(RecordingSink::new()))
        .targets(vec![target("a")])
        .export_orders(&export)
        .run_date(run_date())
        .build();

    let report = pipeline.run().await.report().cloned().unwrap();
    assert_eq!(report.order_count, 0);
    assert!(!export.exists());
}
