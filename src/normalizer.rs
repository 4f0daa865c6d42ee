//! Turns raw statement rows into clean, deduplicated [`Transaction`]s.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{PennyError, Result};
use crate::models::{round_amount, RawCell, RawTable, Transaction};

pub const MAX_MERCHANT_LEN: usize = 200;

const DATE_ALIASES: &[&str] = &["תאריך", "תאריך עסקה", "date", "transaction date"];
const MERCHANT_ALIASES: &[&str] = &["שם בית העסק", "שם בית עסק", "merchant", "description"];
const AMOUNT_ALIASES: &[&str] = &["סכום", "סכום חיוב בש''ח", "סכום חיוב", "amount"];

// Two-digit years first: `%Y` would happily read "24" as the year 24.
const DATE_FORMATS: &[&str] = &["%d/%m/%y", "%d/%m/%Y", "%d.%m.%y", "%d.%m.%Y", "%d-%m-%Y", "%Y-%m-%d"];

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200e}' | '\u{200f}' | '\u{202a}'..='\u{202e}' | '\u{2066}'..='\u{2069}' | '\u{feff}')
}

/// Header cleaning: drop bidi marks and control characters, drop spaces, lowercase.
pub fn clean_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !is_invisible(*c) && !c.is_control() && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Canonical merchant key. The mapping store and the categorizer both go
/// through this, so the same text always lands on the same entry.
pub fn normalize_merchant(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter(|c| !is_invisible(*c))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let mut name = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.starts_with(['=', '+', '-', '@']) {
        name.insert(0, '\'');
    }
    name.chars().take(MAX_MERCHANT_LEN).collect()
}

fn amount_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,\s\u{20aa}$\u{200e}\u{200f}]").expect("static regex"))
}

pub fn parse_amount(cell: &RawCell) -> Option<Decimal> {
    let value = match cell {
        RawCell::Empty => return None,
        RawCell::Number(n) => Decimal::from_f64(*n)?,
        RawCell::Text(s) => {
            let cleaned = amount_noise().replace_all(s, "");
            let cleaned = cleaned.trim();
            if let Some(inner) = cleaned.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
                -Decimal::from_str(inner).ok()?
            } else {
                Decimal::from_str(cleaned).ok()?
            }
        }
    };
    Some(round_amount(value))
}

/// Spreadsheet serial day numbers count from 1899-12-30.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))
}

pub fn parse_date(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::Empty => None,
        RawCell::Number(n) => excel_serial_to_date(*n),
        RawCell::Text(s) => {
            let s = s.trim();
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt.date());
            }
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    date: usize,
    merchant: usize,
    amount: usize,
}

fn field_for(header: &str) -> Option<usize> {
    let cleaned = clean_header(header);
    let hit = |aliases: &[&str]| aliases.iter().any(|a| clean_header(a) == cleaned);
    if hit(DATE_ALIASES) {
        Some(0)
    } else if hit(MERCHANT_ALIASES) {
        Some(1)
    } else if hit(AMOUNT_ALIASES) {
        Some(2)
    } else {
        None
    }
}

/// The header is the first row where at least two known columns appear;
/// statement exports often start with a few lines of account details.
fn locate_header(table: &RawTable) -> Result<(usize, Columns)> {
    for (idx, row) in table.rows.iter().enumerate() {
        let mut found: [Option<usize>; 3] = [None; 3];
        for (col, cell) in row.iter().enumerate() {
            if let Some(field) = cell.as_text().as_deref().and_then(field_for) {
                found[field].get_or_insert(col);
            }
        }
        if found.iter().filter(|f| f.is_some()).count() < 2 {
            continue;
        }
        return match found {
            [Some(date), Some(merchant), Some(amount)] => Ok((idx, Columns { date, merchant, amount })),
            _ => {
                let missing: Vec<&str> = ["date", "merchant", "amount"]
                    .iter()
                    .zip(found.iter())
                    .filter(|(_, f)| f.is_none())
                    .map(|(name, _)| *name)
                    .collect();
                Err(PennyError::Input(format!(
                    "{}: missing required column(s): {}. Expected headers like '{}' / '{}' / '{}'",
                    table.source,
                    missing.join(", "),
                    DATE_ALIASES[1],
                    MERCHANT_ALIASES[0],
                    AMOUNT_ALIASES[0],
                )))
            }
        };
    }
    Err(PennyError::Input(format!(
        "{}: no header row with date, merchant and amount columns",
        table.source
    )))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeReport {
    pub files: usize,
    pub duplicate_files: Vec<String>,
    pub rows: usize,
    pub dropped_invalid: usize,
    pub dropped_duplicates: usize,
}

fn fingerprint(txn: &Transaction, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(txn.date.to_string());
    hasher.update([0u8]);
    hasher.update(&txn.merchant);
    hasher.update([0u8]);
    hasher.update(txn.amount.normalize().to_string());
    hasher.update([0u8]);
    hasher.update(occurrence.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize every table. Byte-identical files are read once. A row repeated
/// inside one file is kept (two identical purchases), but a row that already
/// arrived through another file is dropped: overlapping exports.
pub fn normalize(tables: Vec<RawTable>) -> Result<(Vec<Transaction>, NormalizeReport)> {
    let mut report = NormalizeReport::default();
    let mut checksums: HashSet<String> = HashSet::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for table in tables {
        if !checksums.insert(table.checksum.clone()) {
            warn!("skipping {}: identical to a file already read", table.source);
            report.duplicate_files.push(table.source.clone());
            continue;
        }
        report.files += 1;

        let (header_idx, cols) = locate_header(&table)?;
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut invalid = 0usize;
        let mut duplicates = 0usize;

        for row in table.rows.iter().skip(header_idx + 1) {
            let cell = |i: usize| row.get(i).cloned().unwrap_or(RawCell::Empty);
            let merchant_raw = cell(cols.merchant).as_text().unwrap_or_default();
            let merchant = normalize_merchant(&merchant_raw);
            let (Some(date), Some(amount)) = (parse_date(&cell(cols.date)), parse_amount(&cell(cols.amount))) else {
                if row.iter().any(|c| *c != RawCell::Empty) {
                    invalid += 1;
                }
                continue;
            };
            if merchant.is_empty() {
                invalid += 1;
                continue;
            }

            let txn = Transaction {
                merchant_raw,
                merchant,
                amount,
                date,
                source: table.source.clone(),
            };
            let plain = fingerprint(&txn, 0);
            let occurrence = occurrences.entry(plain).or_insert(0);
            let key = fingerprint(&txn, *occurrence);
            *occurrence += 1;
            if !seen.insert(key) {
                duplicates += 1;
                continue;
            }
            out.push(txn);
        }

        if invalid > 0 {
            warn!("{}: dropped {invalid} row(s) with a missing or invalid date, merchant or amount", table.source);
        }
        if duplicates > 0 {
            info!("{}: dropped {duplicates} row(s) already present in another file", table.source);
        }
        report.dropped_invalid += invalid;
        report.dropped_duplicates += duplicates;
    }

    report.rows = out.len();
    debug!(?report, "normalization complete");
    Ok((out, report))
}

#[cfg(test)]
pub(crate) fn table(source: &str, rows: &[&[&str]]) -> RawTable {
    let rows: Vec<Vec<RawCell>> = rows
        .iter()
        .map(|r| {
            r.iter()
                .map(|c| if c.is_empty() { RawCell::Empty } else { RawCell::Text(c.to_string()) })
                .collect()
        })
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(source);
    hasher.update(format!("{rows:?}"));
    RawTable {
        source: source.to_string(),
        checksum: hex::encode(hasher.finalize()),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(&RawCell::Text("1,234.56".into())), Some(dec("1234.56")));
        assert_eq!(parse_amount(&RawCell::Text(" \u{20aa} 50.00 ".into())), Some(dec("50")));
        assert_eq!(parse_amount(&RawCell::Text("(1,234.56)".into())), Some(dec("-1234.56")));
        assert_eq!(parse_amount(&RawCell::Text("-$42.505".into())), Some(dec("-42.51")));
        assert_eq!(parse_amount(&RawCell::Number(19.9)), Some(dec("19.9")));
        assert_eq!(parse_amount(&RawCell::Text("n/a".into())), None);
        assert_eq!(parse_amount(&RawCell::Empty), None);
    }

    #[test]
    fn test_parse_date_day_first() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_date(&RawCell::Text("15/03/2024".into())), Some(d));
        assert_eq!(parse_date(&RawCell::Text("15.03.24".into())), Some(d));
        assert_eq!(parse_date(&RawCell::Text("2024-03-15".into())), Some(d));
        assert_eq!(parse_date(&RawCell::Text("2024-03-15 00:00:00".into())), Some(d));
        assert_eq!(parse_date(&RawCell::Text("31/02/2024".into())), None);
        assert_eq!(parse_date(&RawCell::Text("garbage".into())), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45667.0), NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(parse_date(&RawCell::Number(45667.0)), NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn test_normalize_merchant() {
        assert_eq!(normalize_merchant("  \u{200f}Shop\tX \n "), "Shop X");
        assert_eq!(normalize_merchant("=HYPERLINK(\"x\")"), "'=HYPERLINK(\"x\")");
        let long = "a".repeat(300);
        assert_eq!(normalize_merchant(&long).chars().count(), MAX_MERCHANT_LEN);
        let once = normalize_merchant(&format!("-{long}"));
        assert_eq!(normalize_merchant(&once), once);
    }

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header("\u{200f}Transaction  Date\n"), "transactiondate");
        assert_eq!(field_for("שם בית העסק"), Some(1));
        assert_eq!(field_for("סכום חיוב בש''ח"), Some(2));
        assert_eq!(field_for("Notes"), None);
    }

    #[test]
    fn test_normalize_skips_preamble_and_bad_rows() {
        let t = table(
            "card.csv",
            &[
                &["Card ending 1234", "", ""],
                &["תאריך", "שם בית העסק", "סכום"],
                &["01/03/2024", "ShopX", "50.00"],
                &["bad date", "ShopX", "10"],
                &["02/03/2024", "", "10"],
                &["", "", ""],
                &["03/03/2024", "Fuelco", "1,200.50"],
            ],
        );
        let (txns, report) = normalize(vec![t]).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[1].amount, dec("1200.50"));
        assert_eq!(report.dropped_invalid, 2);
        assert_eq!(report.rows, 2);
    }

    #[test]
    fn test_missing_mandatory_column() {
        let t = table("x.csv", &[&["date", "merchant", "notes"], &["01/03/2024", "ShopX", "hi"]]);
        let err = normalize(vec![t]).unwrap_err();
        assert!(matches!(err, PennyError::Input(ref m) if m.contains("amount")));
    }

    #[test]
    fn test_dedup_across_files_but_not_within() {
        let a = table(
            "a.csv",
            &[
                &["date", "merchant", "amount"],
                &["01/03/2024", "ShopX", "-5"],
                &["01/03/2024", "ShopX", "-5"],
            ],
        );
        let b = table(
            "b.csv",
            &[
                &["date", "merchant", "amount"],
                &["01/03/2024", "ShopX", "-5"],
                &["01/03/2024", "ShopX", "-5"],
                &["01/03/2024", "ShopX", "-5"],
                &["02/03/2024", "Fuelco", "-7"],
            ],
        );
        let (txns, report) = normalize(vec![a, b]).unwrap();
        assert_eq!(txns.len(), 4);
        assert_eq!(report.dropped_duplicates, 2);
    }

    #[test]
    fn test_identical_files_read_once() {
        let rows: &[&[&str]] = &[&["date", "merchant", "amount"], &["01/03/2024", "ShopX", "-5"]];
        let a = table("a.csv", rows);
        let mut b = a.clone();
        b.source = "copy-of-a.csv".into();
        let (txns, report) = normalize(vec![a, b]).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(report.duplicate_files, vec!["copy-of-a.csv".to_string()]);
    }
}
