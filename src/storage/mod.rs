//! Persistence layer.
//!
//! - `ledger`: the append-only run history (`Date,OrderCount,TotalRevenue`).
//! - `settlement`: read-only bank settlement export used for reconciliation.
//! - `export`: optional dump of the raw scraped orders.
//!
//! All files are CSV. None of them is locked; runs against the same
//! files must be serialized by whoever schedules them.

pub mod export;
pub mod ledger;
pub mod settlement;
