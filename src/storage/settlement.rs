//! Bank settlement export reader.
//!
//! The settlement file is a CSV with a header row. The date and amount
//! columns are selected by name. All rows are summed; the date column is
//! required to be present but is not used to filter, even though the
//! bank calls the export "daily".

use rust_decimal::Decimal;
use std::path::Path;
use tracing::{info, warn};

use crate::types::parse_amount;

/// Errors that abort reading the settlement file.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Settlement file {path} is missing required columns: {missing:?}")]
    MissingColumns { path: String, missing: Vec<String> },

    #[error("Failed to read settlement file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Sum of the settlement file.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementTotal {
    pub total: Decimal,
    pub rows: usize,
    pub skipped_rows: usize,
}

/// Column names to look for.
#[derive(Debug, Clone)]
pub struct SettlementColumns {
    pub date: String,
    pub amount: String,
}

impl Default for SettlementColumns {
    fn default() -> Self {
        Self {
            date: "date".to_string(),
            amount: "amount".to_string(),
        }
    }
}

/// Read and sum the settlement file.
///
/// `Ok(None)` means the file does not exist and reconciliation is not
/// possible this run.
pub fn read_total(
    path: &Path,
    columns: &SettlementColumns,
) -> Result<Option<SettlementTotal>, SettlementError> {
    if !path.exists() {
        warn!(path = %path.display(), "Settlement file not found, reconciliation unavailable");
        return Ok(None);
    }

    let path_str = path.display().to_string();
    let read_err = |source| SettlementError::Read {
        path: path_str.clone(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(read_err)?;

    let headers = reader.headers().map_err(read_err)?.clone();
    let find = |name: &str| headers.iter().position(|h| h.trim_start_matches('\u{feff}') == name);

    let (date_idx, amount_idx) = match (find(&columns.date), find(&columns.amount)) {
        (Some(d), Some(a)) => (d, a),
        (d, a) => {
            let mut missing = Vec::new();
            if d.is_none() {
                missing.push(columns.date.clone());
            }
            if a.is_none() {
                missing.push(columns.amount.clone());
            }
            return Err(SettlementError::MissingColumns {
                path: path_str,
                missing,
            });
        }
    };

    let mut total = Decimal::ZERO;
    let mut rows = 0;
    let mut skipped_rows = 0;

    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path_str, row = line + 2, error = %e, "Skipping unreadable settlement row");
                skipped_rows += 1;
                continue;
            }
        };

        let amount = record
            .get(amount_idx)
            .ok_or_else(|| "missing amount cell".to_string())
            .and_then(|raw| parse_amount(raw).map_err(|e| e.to_string()));

        match amount {
            Ok(a) if record.get(date_idx).is_some() => {
                total += a;
                rows += 1;
            }
            Ok(_) => {
                warn!(path = %path_str, row = line + 2, "Skipping settlement row without date cell");
                skipped_rows += 1;
            }
            Err(reason) => {
                warn!(path = %path_str, row = line + 2, reason = %reason, "Skipping settlement row");
                skipped_rows += 1;
            }
        }
    }

    info!(path = %path_str, total = %total, rows, skipped_rows, "Settlement file read");

    Ok(Some(SettlementTotal {
        total,
        rows,
        skipped_rows,
    }))
}
