//! Ledger configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::models::StockThresholds;

/// Environment variable overriding the database path.
pub const ENV_DATABASE_PATH: &str = "CLINIC_STOCK_DB";
/// Environment variable overriding the SQLite busy timeout.
pub const ENV_BUSY_TIMEOUT_MS: &str = "CLINIC_STOCK_BUSY_TIMEOUT_MS";
/// Environment variable overriding the log filter.
pub const ENV_LOG_FILTER: &str = "CLINIC_STOCK_LOG";

/// Default tracing filter for the ledger.
pub fn default_log_filter() -> String {
    "info,clinic_stock_core=info".to_string()
}

/// Runtime settings for the stock ledger.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite file; `None` means in-memory
    pub database_path: Option<PathBuf>,
    /// How long a writer waits for a locked database
    pub busy_timeout_ms: u64,
    pub low_stock_threshold: i64,
    pub medium_stock_threshold: i64,
    pub expiry_warning_days: i64,
    pub expiry_notice_days: i64,
    /// Attempts before a transaction gives up on a moving batch resolution
    pub max_resolution_retries: u32,
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5_000,
            low_stock_threshold: 10,
            medium_stock_threshold: 50,
            expiry_warning_days: 30,
            expiry_notice_days: 90,
            max_resolution_retries: 3,
            log_filter: default_log_filter(),
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing ledger config {}", path.display()))?;
        Ok(config)
    }

    /// Apply `CLINIC_STOCK_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("invalid {}={:?}", ENV_BUSY_TIMEOUT_MS, timeout))?;
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER) {
            self.log_filter = filter;
        }
        Ok(self)
    }

    /// Classification thresholds derived from this config.
    pub fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            low: self.low_stock_threshold,
            medium: self.medium_stock_threshold,
            expiry_warning_days: self.expiry_warning_days,
            expiry_notice_days: self.expiry_notice_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_thresholds() {
        let config = LedgerConfig::default();
        assert_eq!(config.thresholds(), StockThresholds::default());
        assert_eq!(config.max_resolution_retries, 3);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"low_stock_threshold": 5, "database_path": "/tmp/stock.db"}}"#).unwrap();

        let config = LedgerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.low_stock_threshold, 5);
        assert_eq!(config.medium_stock_threshold, 50);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/stock.db")));
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = LedgerConfig::from_file("/nonexistent/ledger.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/ledger.json"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "clinic.db"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_LOG_FILTER, "debug"),
        ]
        .into_iter()
        .collect();

        let config = LedgerConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("clinic.db")));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_log_override_reaches_filter() {
        let config = LedgerConfig::default()
            .with_overrides(|k| (k == ENV_LOG_FILTER).then(|| "clinic_stock_core=trace".to_string()))
            .unwrap();
        assert_eq!(
            crate::logging::env_filter(None, &config.log_filter).to_string(),
            "clinic_stock_core=trace"
        );
    }

    #[test]
    fn test_invalid_timeout_override() {
        let result = LedgerConfig::default().with_overrides(|k| {
            (k == ENV_BUSY_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }
}
