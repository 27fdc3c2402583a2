//! Account aggregator.
//!
//! Resolves every configured account in order, each under the recovery
//! policy, and merges the successful ones. An account that exhausts its
//! retries is recorded as a failure; the remaining accounts still run.

use tracing::{error, info};

use crate::portal::OrderSource;
use crate::recovery::{RecoveryPolicy, Recovered};
use crate::types::{AccountFailure, FetchOutcome, FetchTarget, OrderRecord};

/// Orders from all reachable accounts.
#[derive(Debug, Default)]
pub struct Aggregate {
    /// Account order first, then row order within the account.
    pub orders: Vec<OrderRecord>,
    /// `(account, order count)` for each account that was fetched.
    pub fetched: Vec<(String, usize)>,
    pub failures: Vec<AccountFailure>,
}

impl Aggregate {
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

pub struct Aggregator<'a> {
    source: &'a dyn OrderSource,
    policy: &'a RecoveryPolicy,
}

impl<'a> Aggregator<'a> {
    pub fn new(source: &'a dyn OrderSource, policy: &'a RecoveryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch one account under the recovery policy.
    pub async fn fetch_account(&self, target: &FetchTarget) -> FetchOutcome {
        let account = target.account().to_string();
        let label = format!("{}:{}", self.source.name(), account);

        match self
            .policy
            .run(&label, |_| self.source.fetch_orders(target))
            .await
        {
            Recovered::Success { value, attempts, .. } => FetchOutcome::Fetched {
                account,
                orders: value,
                attempts,
            },
            Recovered::Failure {
                last_error,
                attempts,
                ..
            } => FetchOutcome::Exhausted {
                account,
                attempts,
                last_error,
            },
        }
    }

    /// Fetch all accounts sequentially, in the order given.
    pub async fn collect(&self, targets: &[FetchTarget]) -> Aggregate {
        let mut aggregate = Aggregate::default();

        for target in targets {
            match self.fetch_account(target).await {
                FetchOutcome::Fetched {
                    account,
                    orders,
                    attempts,
                } => {
                    info!(account = %account, count = orders.len(), attempts, "Account fetched");
                    aggregate.fetched.push((account, orders.len()));
                    aggregate.orders.extend(orders);
                }
                FetchOutcome::Exhausted {
                    account,
                    attempts,
                    last_error,
                } => {
                    error!(
                        account = %account,
                        attempts,
                        error = %last_error,
                        "Account skipped after exhausting retries"
                    );
                    aggregate.failures.push(AccountFailure {
                        account,
                        attempts,
                        reason: last_error.to_string(),
                    });
                }
            }
        }

        info!(
            accounts = targets.len(),
            fetched = aggregate.fetched.len(),
            failed = aggregate.failures.len(),
            orders = aggregate.order_count(),
            "Aggregation complete"
        );

        aggregate
    }
}
