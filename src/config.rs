//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for data locations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::UniverseFilter;
use crate::error::ConfigError;
use crate::pattern::PatternParams;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub universe: UniverseFilter,
    #[serde(default)]
    pub pattern: PatternParams,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise start from defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path);
        }
        tracing::warn!(
            "Config file {} not found, using defaults",
            path.as_ref().display()
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Data paths from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("KLINE_CSV_PATH") {
            self.data.csv_path = Some(path);
        }
        if let Ok(path) = std::env::var("KLINE_SQLITE_PATH") {
            self.data.sqlite_path = Some(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pattern.validate()?;
        match self.data.source {
            DataSource::Csv if self.data.csv_path.is_none() => {
                Err(ConfigError::MissingPath("csv".to_string()))
            }
            DataSource::Sqlite if self.data.sqlite_path.is_none() => {
                Err(ConfigError::MissingPath("sqlite".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Where daily bars come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Csv,
    Sqlite,
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub source: DataSource,
    /// CSV export of the `stock_detail` table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
    /// SQLite database holding a `stock_detail` table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            source: DataSource::Csv,
            csv_path: Some("data/stock_detail.csv".to_string()),
            sqlite_path: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write the scan report as JSON here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "data": { "source": "sqlite", "sqlite_path": "stock.db" },
            "pattern": { "lookback_days": 30, "confirm_turnover_ratio": "0.5" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.data.source, DataSource::Sqlite);
        assert_eq!(config.pattern.lookback_days, 30);
        assert_eq!(config.pattern.confirm_turnover_ratio, dec!(0.5));
        assert_eq!(config.pattern.avg_window, 5);
        assert_eq!(config.universe.exclude_code_prefixes, vec!["688", "920"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sqlite_source_requires_path() {
        let mut config = Config::default();
        config.data.source = DataSource::Sqlite;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingPath("sqlite".to_string()))
        );
    }

    #[test]
    fn test_invalid_pattern_params_rejected() {
        let mut config = Config::default();
        config.pattern.follow_window = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroWindow("follow_window"))
        );
    }

    #[test]
    fn test_from_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("kline_config_{}.json", std::process::id()));
        let config = Config::default();
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.pattern, config.pattern);
        fs::remove_file(&path).ok();
    }
}
