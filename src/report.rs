//! Report text rendering.
//!
//! One fixed template, used for stdout and the notification body.

use rust_decimal::Decimal;

use crate::types::{AccountFailure, RunReport};

/// Render the run report.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("--- Daily Revenue Report ({}) ---\n", report.date.format("%Y-%m-%d")));
    out.push_str(&format!("- Orders: {}\n", report.order_count));
    out.push_str(&format!("- Revenue basis: {}\n", report.revenue_mode));
    out.push_str(&format!("- Computed total: {}\n", money(report.computed_total)));

    match (report.external_total, report.difference) {
        (Some(external), Some(diff)) => {
            out.push_str(&format!("- Settlement total: {}\n", money(external)));
            out.push_str(&format!("- Difference: {}\n", signed(diff)));
        }
        (Some(external), None) => {
            out.push_str(&format!("- Settlement total: {}\n", money(external)));
        }
        _ => out.push_str("- Settlement total: unavailable\n"),
    }

    if report.skipped_orders > 0 {
        out.push_str(&format!("- Skipped orders (unreadable amount): {}\n", report.skipped_orders));
    }
    if report.skipped_settlement_rows > 0 {
        out.push_str(&format!("- Skipped settlement rows: {}\n", report.skipped_settlement_rows));
    }

    if !report.failed_accounts.is_empty() {
        out.push_str(&format!("- Failed accounts: {}\n", report.failed_accounts.len()));
        for failure in &report.failed_accounts {
            out.push_str(&format!("    {}\n", failure_line(failure)));
        }
    }

    if let Some(payment) = &report.payment {
        out.push_str("\n--- Transfer Instructions ---\n");
        out.push_str(&format!("Amount due today: {}\n", money(report.computed_total)));
        out.push_str(&format!("Bank: {}\n", payment.bank));
        out.push_str(&format!("Account: {}\n", payment.account));
        if let Some(url) = &payment.transfer_url {
            out.push_str(&format!("Transfer link: {url}\n"));
        }
    }

    out
}

/// Alert sent when one account exhausts its retries.
pub fn render_account_failure(failure: &AccountFailure) -> String {
    format!("Order fetch failed: {}", failure_line(failure))
}

/// Alert sent when the whole run fails.
pub fn render_run_failure(error: &str) -> String {
    format!("ALERT: daily run failed: {error}")
}

fn failure_line(failure: &AccountFailure) -> String {
    format!(
        "{} ({} attempts): {}",
        failure.account, failure.attempts, failure.reason
    )
}

fn money(d: Decimal) -> String {
    format!("{:.2}", d)
}

fn signed(d: Decimal) -> String {
    if d.is_sign_positive() && !d.is_zero() {
        format!("+{:.2}", d)
    } else {
        format!("{:.2}", d)
    }
}
