//! The dashboard workbook: an `.xlsx` file edited in place.
//!
//! Cells are read and written through `umya-spreadsheet`, so fonts, fills,
//! merged ranges, column widths and sheet direction set by the user survive
//! every save. The reconciler only talks to it through [`TabularDocument`].

use std::path::Path;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::{debug, info};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::atomic::write_atomic_with;
use crate::error::{PennyError, Result};
use crate::models::CategoryPair;
use crate::taxonomy::{clean_name, is_header_row};

pub const CATEGORY_COL: usize = 0;
pub const SUBCATEGORY_COL: usize = 1;
pub const FIRST_MONTH_COL: usize = 2;
pub const MONTHS: usize = 12;

/// Column index holding the given month (1-12).
pub fn month_col(month: u32) -> usize {
    FIRST_MONTH_COL + month as usize - 1
}

fn month_cols() -> std::ops::Range<usize> {
    FIRST_MONTH_COL..FIRST_MONTH_COL + MONTHS
}

/// Zero-based (row, col) to the library's one-based (col, row).
fn coord(row: usize, col: usize) -> (u32, u32) {
    (col as u32 + 1, row as u32 + 1)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(Decimal),
    Formula(String),
}

impl CellValue {
    /// Empty cells, blank text and zero all count as "no data yet".
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_zero(),
            CellValue::Formula(_) => false,
        }
    }

    fn text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(n.normalize().to_string()),
            _ => None,
        }
    }
}

fn read_value(ws: &Worksheet, row: usize, col: usize) -> CellValue {
    let Some(cell) = ws.get_cell(coord(row, col)) else {
        return CellValue::Empty;
    };
    let formula = cell.get_formula();
    if !formula.is_empty() {
        return CellValue::Formula(formula.to_string());
    }
    if let Some(n) = cell.get_value_number() {
        return Decimal::from_f64(n)
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(n.to_string()));
    }
    let text = cell.get_value();
    if text.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(text.to_string())
    }
}

fn write_value(ws: &mut Worksheet, row: usize, col: usize, value: &CellValue) -> Result<()> {
    let cell = ws.get_cell_mut(coord(row, col));
    match value {
        CellValue::Empty => {
            cell.set_blank();
        }
        CellValue::Text(s) => {
            cell.set_value_string(s.clone());
        }
        CellValue::Number(n) => {
            let f = n
                .to_f64()
                .ok_or_else(|| PennyError::Workbook(format!("{n} cannot be stored as a number")))?;
            cell.set_value_number(f);
        }
        CellValue::Formula(f) => {
            cell.set_formula(f.clone());
        }
    }
    Ok(())
}

fn row_count(ws: &Worksheet) -> usize {
    ws.get_highest_row() as usize
}

fn row_text(ws: &Worksheet, row: usize, col: usize) -> Option<String> {
    read_value(ws, row, col).text()
}

/// Data rows keyed by (category, subcategory). Row 0 is the header; a blank
/// category cell inherits the category above it (merged cells).
fn keyed_rows(ws: &Worksheet) -> Vec<(usize, CategoryPair)> {
    let mut keys = Vec::new();
    let mut current: Option<String> = None;
    for idx in 1..row_count(ws) {
        let cat = row_text(ws, idx, CATEGORY_COL).and_then(|s| clean_name(&s));
        let sub = row_text(ws, idx, SUBCATEGORY_COL).and_then(|s| clean_name(&s));
        if is_header_row(cat.as_deref(), sub.as_deref()) {
            continue;
        }
        if cat.is_some() {
            current = cat;
        }
        if let (Some(c), Some(s)) = (&current, sub) {
            keys.push((idx, CategoryPair::new(c.clone(), s)));
        }
    }
    keys
}

/// Header row (bold) plus one row per pair, the category written once per group.
fn fill_pairs(ws: &mut Worksheet, pairs: &[CategoryPair]) -> Result<()> {
    let mut header = vec!["Category".to_string(), "Subcategory".to_string()];
    header.extend((1..=MONTHS).map(|m| m.to_string()));
    for (col, title) in header.into_iter().enumerate() {
        write_value(ws, 0, col, &CellValue::Text(title))?;
        ws.get_style_mut(coord(0, col)).get_font_mut().set_bold(true);
    }

    let mut previous: Option<&str> = None;
    for (i, pair) in pairs.iter().enumerate() {
        let row = i + 1;
        if previous != Some(pair.category.as_str()) {
            write_value(ws, row, CATEGORY_COL, &CellValue::Text(pair.category.clone()))?;
        }
        previous = Some(pair.category.as_str());
        write_value(ws, row, SUBCATEGORY_COL, &CellValue::Text(pair.subcategory.clone()))?;
    }
    Ok(())
}

/// The operations the dashboard reconciler needs from a spreadsheet.
pub trait TabularDocument {
    fn sheet_names(&self) -> Vec<String>;
    fn has_sheet(&self, name: &str) -> bool;
    /// Copy `source`'s rows and formatting into a new sheet `target`, with every
    /// month cell of every data row emptied.
    fn clone_sheet_layout(&mut self, source: &str, target: &str) -> Result<()>;
    fn row_keys(&self, sheet: &str) -> Result<Vec<(usize, CategoryPair)>>;
    fn find_row(&self, sheet: &str, key: &CategoryPair) -> Result<Option<usize>>;
    /// Append a data row for `key` after the last row; returns its index.
    fn append_row(&mut self, sheet: &str, key: &CategoryPair) -> Result<usize>;
    fn read_cell(&self, sheet: &str, row: usize, col: usize) -> Result<CellValue>;
    fn write_cell(&mut self, sheet: &str, row: usize, col: usize, value: CellValue) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Workbook {
    book: Spreadsheet,
}

fn missing_sheet(name: &str) -> PennyError {
    PennyError::Workbook(format!("no sheet named '{name}'"))
}

fn sheet_error(name: &str, reason: &str) -> PennyError {
    PennyError::Workbook(format!("cannot add sheet '{name}': {reason}"))
}

impl Workbook {
    /// A workbook holding only a header row Template: Category, Subcategory, 1..12.
    pub fn blank(template_sheet: &str) -> Result<Self> {
        Self::with_template(template_sheet, &[])
    }

    /// A workbook whose Template lists the given pairs.
    pub fn with_template(template_sheet: &str, pairs: &[CategoryPair]) -> Result<Self> {
        let mut wb = Workbook {
            book: umya_spreadsheet::new_file_empty_worksheet(),
        };
        wb.add_pairs_sheet(template_sheet, pairs)?;
        Ok(wb)
    }

    /// Add a sheet laid out like a Template listing `pairs`.
    pub fn add_pairs_sheet(&mut self, name: &str, pairs: &[CategoryPair]) -> Result<()> {
        let id = self.next_sheet_id();
        let ws = self.book.new_sheet(name).map_err(|e| sheet_error(name, e))?;
        ws.set_sheet_id(id);
        fill_pairs(ws, pairs)
    }

    /// Rewrite the Template sheet from `pairs`. Sheet-level formatting stays;
    /// every other sheet is left exactly as it was.
    pub fn replace_template(&mut self, sheet: &str, pairs: &[CategoryPair]) -> Result<()> {
        if !self.has_sheet(sheet) {
            return self.add_pairs_sheet(sheet, pairs);
        }
        let ws = self.sheet_mut(sheet)?;
        ws.get_merge_cells_mut().clear();
        for row in 0..row_count(ws) {
            for col in 0..FIRST_MONTH_COL + MONTHS {
                if ws.get_cell(coord(row, col)).is_some() {
                    ws.get_cell_mut(coord(row, col)).set_blank();
                }
            }
        }
        fill_pairs(ws, pairs)?;
        info!(pairs = pairs.len(), "rewrote sheet '{sheet}'");
        Ok(())
    }

    /// Open the dashboard; a missing file means setup has not happened yet.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PennyError::Workbook(format!(
                "dashboard not found at {}; run `penny init` first",
                path.display()
            )));
        }
        Self::read(path)
    }

    /// Read any `.xlsx` file.
    pub fn read(path: &Path) -> Result<Self> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| {
            PennyError::Workbook(format!("{} is not a readable workbook: {e}", path.display()))
        })?;
        let wb = Workbook { book };
        debug!(sheets = wb.sheet_names().len(), "workbook loaded from {}", path.display());
        Ok(wb)
    }

    /// Persist the whole workbook with write-to-temp-then-rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic_with(path, |file| {
            umya_spreadsheet::writer::xlsx::write_writer(&self.book, file)
                .map_err(|e| PennyError::Workbook(format!("failed to write {}: {e}", path.display())))
        })?;
        info!("dashboard saved to {}", path.display());
        Ok(())
    }

    fn sheet(&self, name: &str) -> Result<&Worksheet> {
        self.book.get_sheet_by_name(name).ok_or_else(|| missing_sheet(name))
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut Worksheet> {
        self.book
            .get_sheet_by_name_mut(name)
            .ok_or_else(|| missing_sheet(name))
    }

    fn next_sheet_id(&self) -> String {
        let max = self
            .book
            .get_sheet_collection()
            .iter()
            .filter_map(|ws| ws.get_sheet_id().parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|ws| ws.get_name().to_string())
            .collect()
    }

    /// Names of sheets that look like year sheets ("2024").
    pub fn year_sheets(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self
            .sheet_names()
            .iter()
            .filter(|s| s.len() == 4)
            .filter_map(|s| s.parse().ok())
            .collect();
        years.sort_unstable();
        years
    }

    /// Category and subcategory text of every row below the header, with the
    /// row's one-based line number. `None` when the sheet does not exist.
    pub fn label_rows(&self, sheet: &str) -> Option<Vec<(usize, Option<String>, Option<String>)>> {
        let ws = self.book.get_sheet_by_name(sheet)?;
        Some(
            (1..row_count(ws))
                .map(|idx| {
                    (
                        idx + 1,
                        row_text(ws, idx, CATEGORY_COL),
                        row_text(ws, idx, SUBCATEGORY_COL),
                    )
                })
                .collect(),
        )
    }

    #[cfg(test)]
    pub fn row_count(&self, sheet: &str) -> Result<usize> {
        Ok(row_count(self.sheet(sheet)?))
    }

    /// Every sheet's name with the values of its category, subcategory and month columns.
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<(String, Vec<Vec<CellValue>>)> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|ws| {
                let rows = (0..row_count(ws))
                    .map(|r| (0..FIRST_MONTH_COL + MONTHS).map(|c| read_value(ws, r, c)).collect())
                    .collect();
                (ws.get_name().to_string(), rows)
            })
            .collect()
    }
}

impl TabularDocument for Workbook {
    fn sheet_names(&self) -> Vec<String> {
        Workbook::sheet_names(self)
    }

    fn has_sheet(&self, name: &str) -> bool {
        self.book.get_sheet_by_name(name).is_some()
    }

    fn clone_sheet_layout(&mut self, source: &str, target: &str) -> Result<()> {
        if self.has_sheet(target) {
            return Err(PennyError::Workbook(format!("sheet '{target}' already exists")));
        }
        let mut ws = self.sheet(source)?.clone();
        ws.set_name(target);
        ws.set_sheet_id(self.next_sheet_id());
        for (row, _) in keyed_rows(&ws) {
            for col in month_cols() {
                if ws.get_cell(coord(row, col)).is_some() {
                    ws.get_cell_mut(coord(row, col)).set_blank();
                }
            }
        }
        self.book.add_sheet(ws).map_err(|e| sheet_error(target, e))?;
        info!("created sheet '{target}' from '{source}' layout");
        Ok(())
    }

    fn row_keys(&self, sheet: &str) -> Result<Vec<(usize, CategoryPair)>> {
        Ok(keyed_rows(self.sheet(sheet)?))
    }

    fn find_row(&self, sheet: &str, key: &CategoryPair) -> Result<Option<usize>> {
        Ok(keyed_rows(self.sheet(sheet)?)
            .into_iter()
            .find(|(_, k)| k == key)
            .map(|(i, _)| i))
    }

    fn append_row(&mut self, sheet: &str, key: &CategoryPair) -> Result<usize> {
        let ws = self.sheet_mut(sheet)?;
        let keyed = keyed_rows(ws);
        // Borrow formatting from the closest sibling: same category first, else any data row.
        let model = keyed
            .iter()
            .rev()
            .find(|(_, k)| k.category == key.category)
            .or_else(|| keyed.last())
            .map(|(i, _)| *i);

        let row = row_count(ws);
        for col in 0..FIRST_MONTH_COL + MONTHS {
            let style = model
                .and_then(|m| ws.get_cell(coord(m, col)))
                .map(|c| c.get_style().clone());
            if let Some(style) = style {
                ws.get_cell_mut(coord(row, col)).set_style(style);
            }
        }
        write_value(ws, row, CATEGORY_COL, &CellValue::Text(key.category.clone()))?;
        write_value(ws, row, SUBCATEGORY_COL, &CellValue::Text(key.subcategory.clone()))?;
        Ok(row)
    }

    fn read_cell(&self, sheet: &str, row: usize, col: usize) -> Result<CellValue> {
        Ok(read_value(self.sheet(sheet)?, row, col))
    }

    fn write_cell(&mut self, sheet: &str, row: usize, col: usize, value: CellValue) -> Result<()> {
        let ws = self.sheet_mut(sheet)?;
        if row >= row_count(ws) {
            return Err(PennyError::Workbook(format!(
                "row {row} out of range in sheet '{sheet}'"
            )));
        }
        write_value(ws, row, col, &value)
    }
}
