use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Fractional digits kept for every monetary amount.
pub const AMOUNT_SCALE: u32 = 2;

/// Round an amount to the fixed monetary scale (half away from zero).
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryPair {
    pub category: String,
    pub subcategory: String,
}

impl CategoryPair {
    pub fn new(category: impl Into<String>, subcategory: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }
}

impl fmt::Display for CategoryPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {}", self.category, self.subcategory)
    }
}

/// A normalized transaction. Lives for one run only.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub merchant_raw: String,
    pub merchant: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub source: String,
}

impl Transaction {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// A transaction with its resolved category.
#[derive(Debug, Clone)]
pub struct ResolvedTxn {
    pub txn: Transaction,
    pub pair: CategoryPair,
}

/// Intermediate cell representation from a CSV/XLSX reader before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
}

impl RawCell {
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawCell::Empty => None,
            RawCell::Text(s) => Some(s.clone()),
            RawCell::Number(n) => Some(n.to_string()),
        }
    }
}

/// Rows read from one transaction file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: String,
    pub checksum: String,
    pub rows: Vec<Vec<RawCell>>,
}
