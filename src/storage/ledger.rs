//! Append-only run ledger.
//!
//! One row per run: `Date,OrderCount,TotalRevenue`. The header is written
//! once, when the file is created (or found empty). Rows are never
//! rewritten; each append is open-append-close.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const HEADER: [&str; 3] = ["Date", "OrderCount", "TotalRevenue"];

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One persisted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub order_count: u64,
    pub total: Decimal,
}

/// Entries read back from disk, plus how many rows were unreadable.
#[derive(Debug, Clone, Default)]
pub struct LedgerContents {
    pub entries: Vec<LedgerEntry>,
    pub skipped_rows: usize,
}

/// Append one entry, writing the header first if the file is new or empty.
pub fn append(path: &Path, entry: &LedgerEntry) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;

    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat ledger {}", path.display()))?
        .len();
    let is_empty = len == 0;

    // A hand-edited ledger may lack the final newline.
    if !is_empty {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .with_context(|| format!("Failed to read ledger {}", path.display()))?;
        if last[0] != b'\n' {
            file.write_all(b"\n")
                .with_context(|| format!("Failed to write ledger {}", path.display()))?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if is_empty {
        writer.write_record(HEADER)?;
        debug!(path = %path.display(), "Ledger created");
    }

    writer.write_record([
        entry.date.format("%Y-%m-%d").to_string(),
        entry.order_count.to_string(),
        entry.total.to_string(),
    ])?;
    writer
        .flush()
        .with_context(|| format!("Failed to write ledger {}", path.display()))?;

    info!(
        path = %path.display(),
        date = %entry.date,
        orders = entry.order_count,
        total = %entry.total,
        "Ledger row appended"
    );
    Ok(())
}

/// Read every entry. A missing file is an empty ledger.
pub fn read_entries(path: &Path) -> Result<LedgerContents> {
    if !path.exists() {
        info!(path = %path.display(), "No ledger found");
        return Ok(LedgerContents::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;

    let mut contents = LedgerContents::default();
    for (line, record) in reader.records().enumerate() {
        let parsed = record.ok().and_then(|r| parse_row(&r));
        match parsed {
            Some(entry) => contents.entries.push(entry),
            None => {
                warn!(path = %path.display(), row = line + 2, "Skipping malformed ledger row");
                contents.skipped_rows += 1;
            }
        }
    }

    Ok(contents)
}

fn parse_row(record: &csv::StringRecord) -> Option<LedgerEntry> {
    let date = NaiveDate::parse_from_str(record.get(0)?, "%Y-%m-%d").ok()?;
    let order_count = record.get(1)?.parse().ok()?;
    let total = Decimal::from_str(record.get(2)?).ok()?;
    Some(LedgerEntry {
        date,
        order_count,
        total,
    })
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Historical view over the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    /// Distinct dates with at least one row.
    pub days_recorded: usize,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub average_daily_revenue: Decimal,
    pub revenue_last_7_days: Decimal,
    pub revenue_last_30_days: Decimal,
    /// Last row in file order.
    pub latest: Option<LedgerEntry>,
    pub skipped_rows: usize,
}

/// Summarize the ledger relative to `today`. The 7/30-day windows include
/// every row dated on or after `today - 7` / `today - 30` days.
pub fn summarize(contents: &LedgerContents, today: NaiveDate) -> LedgerSummary {
    let entries = &contents.entries;
    let days: BTreeSet<NaiveDate> = entries.iter().map(|e| e.date).collect();
    let total_revenue: Decimal = entries.iter().map(|e| e.total).sum();

    let since = |days_back: i64| -> Decimal {
        let cutoff = today - Duration::days(days_back);
        entries
            .iter()
            .filter(|e| e.date >= cutoff)
            .map(|e| e.total)
            .sum()
    };

    let average_daily_revenue = if days.is_empty() {
        Decimal::ZERO
    } else {
        (total_revenue / Decimal::from(days.len())).round_dp(2)
    };

    LedgerSummary {
        days_recorded: days.len(),
        total_orders: entries.iter().map(|e| e.order_count).sum(),
        total_revenue,
        average_daily_revenue,
        revenue_last_7_days: since(7),
        revenue_last_30_days: since(30),
        latest: entries.last().cloned(),
        skipped_rows: contents.skipped_rows,
    }
}

/// Render the summary the way the finance report prints it.
pub fn render_summary(summary: &LedgerSummary) -> String {
    let mut out = String::new();
    out.push_str("--- Ledger Summary ---\n");
    out.push_str("Overall:\n");
    out.push_str(&format!("  - Days recorded: {}\n", summary.days_recorded));
    out.push_str(&format!("  - Total orders: {}\n", summary.total_orders));
    out.push_str(&format!("  - Total revenue: {:.2}\n", summary.total_revenue));
    out.push_str(&format!(
        "  - Average daily revenue: {:.2}\n",
        summary.average_daily_revenue
    ));
    out.push_str("Recent:\n");
    out.push_str(&format!("  - Last 7 days: {:.2}\n", summary.revenue_last_7_days));
    out.push_str(&format!("  - Last 30 days: {:.2}\n", summary.revenue_last_30_days));
    match &summary.latest {
        Some(e) => {
            out.push_str("Latest entry:\n");
            out.push_str(&format!("  - Date: {}\n", e.date.format("%Y-%m-%d")));
            out.push_str(&format!("  - Orders: {}\n", e.order_count));
            out.push_str(&format!("  - Revenue: {:.2}\n", e.total));
        }
        None => out.push_str("No entries recorded yet.\n"),
    }
    if summary.skipped_rows > 0 {
        out.push_str(&format!("({} malformed rows skipped)\n", summary.skipped_rows));
    }
    out.push_str("----------------------\n");
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
