//! Order portal integrations.
//!
//! Defines the `OrderSource` trait and the HTTP implementation that logs
//! in to the delivery partner portal and scrapes its order table.

pub mod http;
pub mod table;

use async_trait::async_trait;

use crate::types::{FetchError, FetchTarget, OrderRecord};

/// Something that can produce one account's orders.
///
/// Every error is treated as retryable by the caller. An empty order
/// list is a valid answer, not an error.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Log in as `target` and return the scraped order rows, each tagged
    /// with the account identifier.
    async fn fetch_orders(&self, target: &FetchTarget) -> Result<Vec<OrderRecord>, FetchError>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}
