use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PennyError {
    #[error("Template error: {0}")]
    Taxonomy(String),

    #[error("Mapping store {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Conflict left unresolved for '{merchant}' (was {category} > {subcategory})")]
    ConflictUnresolved {
        merchant: String,
        category: String,
        subcategory: String,
    },

    #[error("'{category} > {subcategory}' is not in the current template")]
    Validation {
        category: String,
        subcategory: String,
    },

    #[error("Internal consistency error: no row for '{category} > {subcategory}' in sheet {year}")]
    ReconciliationConsistency {
        year: i32,
        category: String,
        subcategory: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Workbook(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Run cancelled; nothing was written")]
    Aborted,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PennyError>;
