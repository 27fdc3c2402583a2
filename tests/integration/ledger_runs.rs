use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::sync::Arc;

use tally::engine::pipeline::Pipeline;
use tally::storage::ledger;
use tally::types::RevenueMode;

use crate::common::{target, RecordingSink, Script, ScriptedSource};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

async fn run_on(path: &std::path::Path, date: NaiveDate, orders: usize) {
    let source = Arc::new(ScriptedSource::new(&[("a", Script::Orders(orders))]));
    let pipeline = Pipeline::builder(source, Arc::new(RecordingSink::new()))
        .targets(vec![target("a")])
        .revenue_mode(RevenueMode::FixedRate { rate_per_order: dec!(20) })
        .ledger(path)
        .run_date(date)
        .build();
    assert!(pipeline.run().await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_ledger_accumulates_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("financial_ledger.csv");

    run_on(&path, day(1), 2).await;
    run_on(&path, day(18), 3).await;
    run_on(&path, day(19), 0).await;

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.matches("Date,OrderCount,TotalRevenue").count(), 1);
    assert!(raw.starts_with("Date,OrderCount,TotalRevenue\n"));

    let contents = ledger::read_entries(&path).unwrap();
    assert_eq!(contents.entries.len(), 3);
    assert_eq!(contents.skipped_rows, 0);

    let summary = ledger::summarize(&contents, day(19));
    assert_eq!(summary.days_recorded, 3);
    assert_eq!(summary.total_orders, 5);
    assert_eq!(summary.total_revenue, dec!(100));
    assert_eq!(summary.revenue_last_7_days, dec!(60));
    assert_eq!(summary.revenue_last_30_days, dec!(100));
    assert_eq!(summary.latest.as_ref().map(|e| e.date), Some(day(19)));

    let text = ledger::render_summary(&summary);
    assert!(text.contains("Days recorded: 3"));
    assert!(text.contains("Total revenue: 100.00"));
}
