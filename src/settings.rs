use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SortError};
use crate::importer::DEFAULT_ENCODING;
use crate::location::DEFAULT_MAPS_TEMPLATE;
use crate::normalizer::DEFAULT_DATE_FORMAT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rules_path: String,
    pub output_path: String,
    pub unassigned_path: String,
    pub encoding: String,
    pub date_format: String,
    pub location_links: bool,
    pub maps_url_template: String,
    pub excel_bom: bool,
    pub log_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules_path: config_dir().join("rules.toml").to_string_lossy().to_string(),
            output_path: "processed_transactions.csv".to_string(),
            unassigned_path: "unassigned_transactions.csv".to_string(),
            encoding: DEFAULT_ENCODING.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            location_links: true,
            maps_url_template: DEFAULT_MAPS_TEMPLATE.to_string(),
            excel_bom: true,
            log_file: None,
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("spendsort")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path())
}

/// A missing file means defaults. An unreadable or malformed one is an error
/// the caller can report before falling back.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| SortError::Settings(format!("{}: {e}", path.display())))
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SortError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
