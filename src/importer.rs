use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{PennyError, Result};
use crate::models::{CategoryPair, RawCell, RawTable};
use crate::taxonomy::{Taxonomy, TemplateRow};

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn csv_rows(data: &[u8]) -> Result<Vec<Vec<RawCell>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|f| {
                    let f = f.trim();
                    if f.is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(f.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}

fn spreadsheet_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<RawCell>>> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| PennyError::Workbook(format!("failed to open {}: {e}", path.display())))?;
    let name = match sheet {
        Some(s) => s.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| PennyError::Input(format!("{} has no sheets", path.display())))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| PennyError::Workbook(format!("failed to read sheet '{name}': {e}")))?;

    let mut rows = Vec::new();
    for row in range.rows() {
        rows.push(
            row.iter()
                .map(|cell| match cell {
                    Data::String(s) if s.trim().is_empty() => RawCell::Empty,
                    Data::String(s) | Data::DateTimeIso(s) => RawCell::Text(s.trim().to_string()),
                    Data::Float(f) => RawCell::Number(*f),
                    Data::Int(i) => RawCell::Number(*i as f64),
                    Data::DateTime(dt) => RawCell::Number(dt.as_f64()),
                    _ => RawCell::Empty,
                })
                .collect(),
        );
    }
    Ok(rows)
}

/// Read one statement file (CSV, or the first worksheet of a spreadsheet).
pub fn read_transaction_file(path: &Path) -> Result<RawTable> {
    let data = std::fs::read(path)?;
    let checksum = compute_checksum(&data);
    let rows = match extension(path).as_str() {
        "csv" => csv_rows(&data)?,
        "xlsx" | "xlsm" | "xls" | "ods" => spreadsheet_rows(path, None)?,
        other => {
            return Err(PennyError::Input(format!(
                "{}: unsupported file type '.{other}' (expected .csv, .xlsx or .xls)",
                path.display()
            )))
        }
    };
    info!(rows = rows.len(), "read {}", path.display());
    Ok(RawTable {
        source: source_name(path),
        checksum,
        rows,
    })
}

pub fn read_transaction_files(paths: &[impl AsRef<Path>]) -> Result<Vec<RawTable>> {
    paths.iter().map(|p| read_transaction_file(p.as_ref())).collect()
}

/// Read a two-column Category/Subcategory definition (first row is a header)
/// and return its pairs in order, validated as a Template.
pub fn read_template_pairs(path: &Path, sheet: &str) -> Result<Vec<CategoryPair>> {
    let rows = match extension(path).as_str() {
        "csv" => csv_rows(&std::fs::read(path)?)?,
        _ => spreadsheet_rows(path, Some(sheet))?,
    };
    let template_rows: Vec<TemplateRow> = rows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, row)| {
            let text = |col: usize| row.get(col).and_then(RawCell::as_text);
            TemplateRow::new(i + 1, text(0).as_deref(), text(1).as_deref())
        })
        .collect();
    let parsed = Taxonomy::parse(&template_rows)?;
    Ok(parsed.taxonomy.pairs().collect())
}
