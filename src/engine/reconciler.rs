//! Revenue reconciler.
//!
//! Computes the run's revenue from the aggregated orders and compares it
//! with the bank settlement total when one is available. Bad amounts are
//! skipped and counted, never fatal.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::storage::settlement::SettlementTotal;
use crate::types::{OrderRecord, ReconciliationResult, RevenueMode};

pub struct RevenueReconciler {
    mode: RevenueMode,
}

impl RevenueReconciler {
    pub fn new(mode: RevenueMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &RevenueMode {
        &self.mode
    }

    /// Computed total and the number of orders whose amount was skipped.
    pub fn compute(&self, orders: &[OrderRecord]) -> (Decimal, usize) {
        match &self.mode {
            RevenueMode::FixedRate { rate_per_order } => {
                (Decimal::from(orders.len()) * *rate_per_order, 0)
            }
            RevenueMode::AmountColumn { index } => {
                let mut total = Decimal::ZERO;
                let mut skipped = 0;
                for order in orders {
                    match order.amount(*index) {
                        Ok(amount) => total += amount,
                        Err(e) => {
                            warn!(account = order.account(), error = %e, "Skipping order amount");
                            skipped += 1;
                        }
                    }
                }
                (total, skipped)
            }
        }
    }

    /// Compute revenue and, if given, reconcile against the settlement total.
    pub fn reconcile(
        &self,
        orders: &[OrderRecord],
        settlement: Option<&SettlementTotal>,
    ) -> ReconciliationResult {
        let (computed_total, skipped_orders) = self.compute(orders);
        let external_total = settlement.map(|s| s.total);
        let difference = external_total.map(|ext| computed_total - ext);

        info!(
            orders = orders.len(),
            computed = %computed_total,
            external = ?external_total.map(|d| d.to_string()),
            difference = ?difference.map(|d| d.to_string()),
            skipped_orders,
            settlement_rows = settlement.map(|s| s.rows).unwrap_or(0),
            "Revenue reconciled"
        );

        ReconciliationResult {
            order_count: orders.len(),
            computed_total,
            external_total,
            difference,
            skipped_orders,
            skipped_settlement_rows: settlement.map(|s| s.skipped_rows).unwrap_or(0),
        }
    }
}
