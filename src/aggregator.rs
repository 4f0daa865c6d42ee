use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::error::{PennyError, Result};
use crate::models::{CategoryPair, ResolvedTxn};

/// Earliest year accepted in the dashboard.
pub const MIN_YEAR: i32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregateKey {
    pub year: i32,
    pub month: u32,
    pub pair: CategoryPair,
}

/// Summed amounts per (year, month, category, subcategory). Ordered, so two
/// aggregations of the same transactions compare equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    cells: BTreeMap<AggregateKey, Decimal>,
}

impl Aggregates {
    pub fn aggregate(resolved: &[ResolvedTxn]) -> Result<Self> {
        let mut cells: BTreeMap<AggregateKey, Decimal> = BTreeMap::new();
        for r in resolved {
            let key = AggregateKey {
                year: r.txn.year(),
                month: r.txn.month(),
                pair: r.pair.clone(),
            };
            let sum = cells.entry(key).or_default();
            *sum = sum.checked_add(r.txn.amount).ok_or_else(|| {
                PennyError::Input(format!(
                    "total for {} in {}-{:02} is too large",
                    r.pair,
                    r.txn.year(),
                    r.txn.month()
                ))
            })?;
        }
        Ok(Self { cells })
    }

    #[cfg(test)]
    pub fn get(&self, year: i32, month: u32, pair: &CategoryPair) -> Option<Decimal> {
        self.cells
            .get(&AggregateKey {
                year,
                month,
                pair: pair.clone(),
            })
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AggregateKey, &Decimal)> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.cells.keys().map(|k| k.year).collect();
        years.into_iter().collect()
    }

    pub fn for_year(&self, year: i32) -> impl Iterator<Item = (&AggregateKey, &Decimal)> {
        self.cells.iter().filter(move |(k, _)| k.year == year)
    }

    /// Sum of every cell; `None` if it does not fit in a `Decimal`.
    pub fn total(&self) -> Option<Decimal> {
        self.cells
            .values()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
    }

    /// Reject keys that cannot map onto a year sheet: month outside 1..=12,
    /// year before 2000 or after next year.
    pub fn validate(&self, current_year: i32) -> Result<()> {
        for key in self.cells.keys() {
            if !(1..=12).contains(&key.month) {
                return Err(PennyError::Input(format!(
                    "invalid month {} for {} in {}",
                    key.month, key.pair, key.year
                )));
            }
            if key.year < MIN_YEAR || key.year > current_year + 1 {
                return Err(PennyError::Input(format!(
                    "year {} is outside {MIN_YEAR}..={} ({})",
                    key.year,
                    current_year + 1,
                    key.pair
                )));
            }
        }
        Ok(())
    }
}
