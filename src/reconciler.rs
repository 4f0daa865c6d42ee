use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregates;
use crate::error::{PennyError, Result};
use crate::models::CategoryPair;
use crate::settings::ExistingCellPolicy;
use crate::taxonomy::Taxonomy;
use crate::workbook::{month_col, CellValue, TabularDocument};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearReport {
    pub year: i32,
    pub sheet_created: bool,
    pub rows_appended: Vec<CategoryPair>,
    pub cells_written: usize,
    pub cells_unchanged: usize,
    pub cells_skipped: usize,
}

impl YearReport {
    pub fn changed(&self) -> bool {
        self.sheet_created || !self.rows_appended.is_empty() || self.cells_written > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub years: Vec<YearReport>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.years.iter().any(YearReport::changed)
    }
}

/// The value a month cell should hold after applying `amount` under `policy`,
/// or `None` to leave it alone.
fn next_value(existing: &CellValue, amount: Decimal, policy: ExistingCellPolicy) -> Option<CellValue> {
    match policy {
        ExistingCellPolicy::Overwrite => Some(CellValue::Number(amount)),
        ExistingCellPolicy::Skip if existing.is_blank() => Some(CellValue::Number(amount)),
        ExistingCellPolicy::Skip => None,
        ExistingCellPolicy::Add => match existing {
            CellValue::Number(n) => Some(CellValue::Number(*n + amount)),
            v if v.is_blank() => Some(CellValue::Number(amount)),
            _ => None,
        },
    }
}

/// Merge `aggregates` into one sheet per year.
///
/// Missing year sheets are cloned from `template_sheet`; Template pairs missing
/// from a sheet are appended at its end; each aggregate lands in the row found
/// by name and the column of its month. Nothing else in the document changes,
/// and a cell already holding the target value is not rewritten, so applying
/// the same aggregates twice under `Overwrite` leaves the document as it was.
pub fn reconcile<D: TabularDocument + ?Sized>(
    doc: &mut D,
    taxonomy: &Taxonomy,
    aggregates: &Aggregates,
    template_sheet: &str,
    policy: ExistingCellPolicy,
) -> Result<ReconcileReport> {
    // Every key must be a Template pair before anything is touched.
    if let Some((key, _)) = aggregates.iter().find(|(k, _)| !taxonomy.contains(&k.pair)) {
        return Err(PennyError::ReconciliationConsistency {
            year: key.year,
            category: key.pair.category.clone(),
            subcategory: key.pair.subcategory.clone(),
        });
    }

    let mut report = ReconcileReport::default();
    for year in aggregates.years() {
        let sheet = year.to_string();
        let mut yr = YearReport {
            year,
            ..Default::default()
        };

        if !doc.has_sheet(&sheet) {
            doc.clone_sheet_layout(template_sheet, &sheet)?;
            yr.sheet_created = true;
        }

        let present: HashSet<CategoryPair> =
            doc.row_keys(&sheet)?.into_iter().map(|(_, k)| k).collect();
        for pair in taxonomy.pairs() {
            if !present.contains(&pair) {
                let row = doc.append_row(&sheet, &pair)?;
                debug!(sheet = %sheet, row, %pair, "appended row");
                yr.rows_appended.push(pair);
            }
        }

        for (key, amount) in aggregates.for_year(year) {
            let Some(row) = doc.find_row(&sheet, &key.pair)? else {
                return Err(PennyError::ReconciliationConsistency {
                    year,
                    category: key.pair.category.clone(),
                    subcategory: key.pair.subcategory.clone(),
                });
            };
            let col = month_col(key.month);
            let existing = doc.read_cell(&sheet, row, col)?;
            match next_value(&existing, *amount, policy) {
                None => {
                    if matches!(existing, CellValue::Text(_) | CellValue::Formula(_)) {
                        warn!(sheet = %sheet, row, col, "cell holds non-numeric content; left unchanged");
                    }
                    yr.cells_skipped += 1;
                }
                Some(value) if value == existing => yr.cells_unchanged += 1,
                Some(value) => {
                    doc.write_cell(&sheet, row, col, value)?;
                    yr.cells_written += 1;
                }
            }
        }

        info!(
            year,
            created = yr.sheet_created,
            appended = yr.rows_appended.len(),
            written = yr.cells_written,
            unchanged = yr.cells_unchanged,
            skipped = yr.cells_skipped,
            "reconciled sheet"
        );
        report.years.push(yr);
    }
    Ok(report)
}
