//! Shared types for the TALLY pipeline.
//!
//! These types form the data model passed between the portal fetcher,
//! the aggregator, the reconciler and the report emitter.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// One set of portal credentials. Immutable for the run.
#[derive(Clone)]
pub struct AccountCredential {
    /// Opaque identifier, usually the login email.
    pub identifier: String,
    secret: SecretString,
}

impl AccountCredential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: SecretString::new(secret.into()),
        }
    }

    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredential")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A credential paired with the endpoint it logs in to.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub credential: AccountCredential,
    pub endpoint: String,
}

impl FetchTarget {
    pub fn new(credential: AccountCredential, endpoint: impl Into<String>) -> Self {
        Self {
            credential,
            endpoint: endpoint.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.credential.identifier
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// One scraped table row plus the account it came from.
///
/// The cells are kept as the portal rendered them. The only structured
/// access is [`OrderRecord::amount`], which fails closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    cells: Vec<String>,
    account: String,
}

impl OrderRecord {
    pub fn new(cells: Vec<String>, account: impl Into<String>) -> Self {
        Self {
            cells,
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// All fields in export order: the scraped cells, then the account.
    pub fn fields(&self) -> Vec<&str> {
        self.cells
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.account.as_str()))
            .collect()
    }

    /// Extract the amount at `index` of the scraped cells.
    pub fn amount(&self, index: usize) -> Result<Decimal, AmountError> {
        let raw = self.cells.get(index).ok_or(AmountError::MissingColumn {
            index,
            len: self.cells.len(),
        })?;
        parse_amount(raw)
    }
}

/// A single number with an optional sign, an optional currency marker on
/// either side and optional `,ddd` thousands groups.
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<sign>[+-])?\s*(?:NT\$|US\$|\$)?\s*(?P<int>\d{1,3}(?:,\d{3})+|\d+)(?P<frac>\.\d+)?\s*(?:元|NTD|TWD)?$",
    )
    .expect("static regex")
});

/// Parse a money string as rendered by a portal or a bank export.
///
/// Accepts currency prefixes/suffixes and thousands separators,
/// e.g. `NT$1,234.50`, `$10`, `10.0 元`. Anything else is rejected.
pub fn parse_amount(raw: &str) -> Result<Decimal, AmountError> {
    let trimmed = raw.trim();
    let unparsable = || AmountError::Unparsable(trimmed.to_string());

    let caps = AMOUNT.captures(trimmed).ok_or_else(unparsable)?;
    let mut number = String::with_capacity(trimmed.len());
    if caps.name("sign").map(|m| m.as_str()) == Some("-") {
        number.push('-');
    }
    number.extend(caps["int"].chars().filter(|c| *c != ','));
    if let Some(frac) = caps.name("frac") {
        number.push_str(frac.as_str());
    }
    Decimal::from_str(&number).map_err(|_| unparsable())
}

// ---------------------------------------------------------------------------
// Fetch outcome
// ---------------------------------------------------------------------------

/// Result of resolving one account under the recovery policy.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched {
        account: String,
        orders: Vec<OrderRecord>,
        attempts: u32,
    },
    Exhausted {
        account: String,
        attempts: u32,
        last_error: FetchError,
    },
}

/// An account that could not be fetched this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFailure {
    pub account: String,
    pub attempts: u32,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Revenue
// ---------------------------------------------------------------------------

/// How the run's revenue figure is derived.
#[derive(Debug, Clone, PartialEq)]
pub enum RevenueMode {
    /// `order_count × rate_per_order`.
    FixedRate { rate_per_order: Decimal },
    /// Sum of the amount found at `index` in each order's cells.
    AmountColumn { index: usize },
}

impl fmt::Display for RevenueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevenueMode::FixedRate { rate_per_order } => {
                write!(f, "fixed rate {rate_per_order} per order")
            }
            RevenueMode::AmountColumn { index } => write!(f, "sum of column {index}"),
        }
    }
}

/// Computed revenue compared with an external settlement total.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub order_count: usize,
    pub computed_total: Decimal,
    pub external_total: Option<Decimal>,
    pub difference: Option<Decimal>,
    /// Orders whose amount could not be extracted (amount-column mode only).
    pub skipped_orders: usize,
    /// Settlement rows skipped while summing the external total.
    pub skipped_settlement_rows: usize,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Where the money should be transferred, shown at the end of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInstructions {
    pub bank: String,
    pub account: String,
    pub transfer_url: Option<String>,
}

/// Summary of one run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub date: NaiveDate,
    pub order_count: usize,
    pub revenue_mode: RevenueMode,
    pub computed_total: Decimal,
    pub external_total: Option<Decimal>,
    pub difference: Option<Decimal>,
    /// Orders left out of `computed_total` because their amount was unreadable.
    pub skipped_orders: usize,
    /// Settlement rows left out of `external_total`.
    pub skipped_settlement_rows: usize,
    pub failed_accounts: Vec<AccountFailure>,
    pub payment: Option<PaymentInstructions>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Retryable failure while fetching one account's orders.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Timed out after {0:?} waiting for the order table")]
    Timeout(Duration),

    #[error("Login rejected for {account} (HTTP {status})")]
    Auth { account: String, status: u16 },

    #[error("Portal returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Order table not found in portal response")]
    TableNotFound,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure to deliver a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Sink returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Sink rejected message: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Why an order amount could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("no column {index} in a row of {len} cells")]
    MissingColumn { index: usize, len: usize },

    #[error("unparsable amount {0:?}")]
    Unparsable(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
