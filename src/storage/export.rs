//! Raw order dump. Overwritten every run; the account identifier is the
//! last column of each row. No header, matching the scraped layout.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::types::OrderRecord;

pub fn write_orders(path: &Path, orders: &[OrderRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create order export {}", path.display()))?;

    for order in orders {
        writer.write_record(order.fields())?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write order export {}", path.display()))?;

    info!(path = %path.display(), count = orders.len(), "Orders exported");
    Ok(())
}
