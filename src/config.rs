// ⚙️ Configuration - JSON file, then environment overrides
//
// Every key is optional; a missing file section falls back to its default.
//
//   WAREHOUSE_DB    → database_path
//   WAREHOUSE_LOG   → logging.filter
//   WAREHOUSE_BIND  → server.bind

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "WAREHOUSE_DB";
pub const ENV_LOG: &str = "WAREHOUSE_LOG";
pub const ENV_BIND: &str = "WAREHOUSE_BIND";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or `warehouse_ledger=debug`
    pub filter: String,
    /// One JSON object per line instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Directory CSV exports land in
    pub export_dir: PathBuf,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("warehouse.db"),
            export_dir: PathBuf::from("."),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// File (when given) or defaults, then process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from any key → value lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(db) = non_empty(ENV_DB) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(filter) = non_empty(ENV_LOG) {
            self.logging.filter = filter;
        }
        if let Some(bind) = non_empty(ENV_BIND) {
            self.server.bind = bind;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_path, PathBuf::from("warehouse.db"));
        assert_eq!(config.logging.filter, "info");
        assert!(!config.logging.json);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            r#"{ "database_path": "/var/lib/sklad.db", "logging": { "json": true } }"#,
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/sklad.db"));
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.export_dir, PathBuf::from("."));
    }

    #[test]
    fn test_bad_json_is_reported() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "{ not json").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config JSON"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(ENV_DB, "other.db"), (ENV_LOG, "debug"), (ENV_BIND, "  ")]
            .into_iter()
            .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }
}
