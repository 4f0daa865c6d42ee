use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PennyError, Result};

/// How the reconciler treats a month cell that already holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExistingCellPolicy {
    #[default]
    Overwrite,
    Add,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_dashboard_file")]
    pub dashboard_file: String,
    #[serde(default = "default_mapping_file")]
    pub mapping_file: String,
    #[serde(default = "default_template_sheet")]
    pub template_sheet: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub on_existing: ExistingCellPolicy,
}

fn default_dashboard_file() -> String {
    "dashboard.xlsx".to_string()
}

fn default_mapping_file() -> String {
    "categories.json".to_string()
}

fn default_template_sheet() -> String {
    "Template".to_string()
}

fn default_currency_symbol() -> String {
    "\u{20aa}".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            dashboard_file: default_dashboard_file(),
            mapping_file: default_mapping_file(),
            template_sheet: default_template_sheet(),
            currency_symbol: default_currency_symbol(),
            log_level: default_log_level(),
            on_existing: ExistingCellPolicy::default(),
        }
    }
}

impl Settings {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.data_path().join(&self.dashboard_file)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.data_path().join(&self.mapping_file)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("penny")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("penny")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PennyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.template_sheet, "Template");
        assert_eq!(s.mapping_file, "categories.json");
        assert_eq!(s.on_existing, ExistingCellPolicy::Overwrite);
        assert!(!s.data_dir.is_empty());
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/budget", "on_existing": "skip"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.dashboard_file, "dashboard.xlsx");
        assert_eq!(s.on_existing, ExistingCellPolicy::Skip);
        assert_eq!(s.dashboard_path(), PathBuf::from("/tmp/budget/dashboard.xlsx"));
        assert_eq!(s.mapping_path(), PathBuf::from("/tmp/budget/categories.json"));
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            currency_symbol: "$".to_string(),
            on_existing: ExistingCellPolicy::Add,
            ..Settings::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        let loaded: Settings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.currency_symbol, "$");
        assert_eq!(loaded.on_existing, ExistingCellPolicy::Add);
    }
}
