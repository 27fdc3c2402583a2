//! HTML order-table extraction.
//!
//! The portal renders orders as a plain `<table>`. The first `<tr>` is the
//! header and is always skipped; after that every row with at least one
//! `<td>` becomes an order. Cell text has inner tags stripped, common
//! entities decoded and whitespace collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

static TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").expect("static regex"));
static ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("static regex"));
static CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td\s*>").expect("static regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Extract data rows from the first table in `html`.
///
/// Returns `None` when no table is present.
pub fn extract_rows(html: &str) -> Option<Vec<Vec<String>>> {
    let body = TABLE.captures(html)?.get(1)?.as_str();

    let rows = ROW
        .captures_iter(body)
        .skip(1)
        .filter_map(|row| {
            let inner = row.get(1)?.as_str();
            let cells: Vec<String> = CELL
                .captures_iter(inner)
                .filter_map(|c| c.get(1).map(|m| cell_text(m.as_str())))
                .collect();
            if cells.is_empty() {
                None
            } else {
                Some(cells)
            }
        })
        .collect();

    Some(rows)
}

fn cell_text(raw: &str) -> String {
    let stripped = TAG.replace_all(raw, "");
    let decoded = decode_entities(&stripped);
    SPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
