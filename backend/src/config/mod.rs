//! Configuration for a consolidation run.
//!
//! Loaded once at startup from a JSON file (default `config.json`, or the
//! path in `CONSOLIDATOR_CONFIG`), checked against the embedded schema, then
//! shared read-only. Relative paths are resolved against the directory that
//! holds the config file.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::fetch::FetchConfig;
use crate::logs::LogLevel;
use crate::output::OutputConfig;
use crate::schema::{SchemaDescriptor, StructureConfig};
use crate::transform::mapper::TransformRules;
use crate::validation::validate_config_document;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CONSOLIDATOR_CONFIG";
/// Environment variable overriding `logging.level`.
pub const LOG_LEVEL_ENV: &str = "CONSOLIDATOR_LOG_LEVEL";
/// Config file used when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

const DEFAULT_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Remote locations of the branch workbooks.
    #[serde(default)]
    pub excel_urls: Vec<String>,

    pub excel: ExcelConfig,

    #[serde(default)]
    pub transform: TransformRules,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub formats: FormatsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Downloads land in `{data_dir}/downloads/execution_{timestamp}`.
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Where consolidated workbooks are written.
    pub summary_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            logs_dir: PathBuf::from("logs"),
            summary_dir: PathBuf::from("data/summary"),
        }
    }
}

impl PathsConfig {
    fn resolve(&mut self, base: &Path) {
        for path in [&mut self.data_dir, &mut self.logs_dir, &mut self.summary_dir] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// `excel` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcelConfig {
    pub structure: StructureConfig,
}

/// `formats` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatsConfig {
    /// `chrono` format used in file names.
    pub timestamp: String,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            timestamp: DEFAULT_TIMESTAMP.to_string(),
        }
    }
}

/// `logging` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Write `execution_{timestamp}.log` under `logs_dir`.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: true,
        }
    }
}

impl AppConfig {
    /// Load, check and resolve a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&content)?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.paths.resolve(base);
        config.apply_env();
        Ok(config)
    }

    /// Load from `explicit`, else `$CONSOLIDATOR_CONFIG`, else `config.json`.
    pub fn discover(explicit: Option<&Path>) -> ConfigResult<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    /// Parse a config document; paths stay as written.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(content)?;
        validate_config_document(&value).map_err(|errors| ConfigError::Schema { errors })?;
        let config: Self = serde_json::from_value(value)?;
        config.descriptor()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            self.logging.level = level;
        }
    }

    /// Build the schema descriptor and check the field map against it.
    pub fn descriptor(&self) -> ConfigResult<SchemaDescriptor> {
        let descriptor = SchemaDescriptor::new(&self.excel.structure)?;
        self.transform.check(&descriptor)?;
        Ok(descriptor)
    }

    /// Configured log level; unknown names fall back to `Info`.
    pub fn log_level(&self) -> LogLevel {
        self.logging.level.parse().unwrap_or(LogLevel::Info)
    }

    /// Current local time in the configured timestamp format.
    pub fn timestamp(&self) -> String {
        format_timestamp(&self.formats.timestamp)
    }

    pub fn log_file(&self, timestamp: &str) -> PathBuf {
        self.paths
            .logs_dir
            .join(format!("execution_{}.log", timestamp))
    }
}

/// Format the current local time, falling back to the default format when
/// `format` holds an invalid specifier.
pub fn format_timestamp(format: &str) -> String {
    let now = Local::now();
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        out.clear();
        let _ = write!(out, "{}", now.format(DEFAULT_TIMESTAMP));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = include_str!("../../../config.example.json");

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_json_str(EXAMPLE).unwrap();
        assert_eq!(config.excel_urls.len(), 2);
        assert_eq!(config.excel.structure.anchor_cell, "B2");
        assert_eq!(config.transform.excluded_enrollment_type, "Pre-Inscrito");
        assert_eq!(config.output.sheet_name, "Consolidado");
        assert_eq!(config.log_level(), LogLevel::Info);

        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.sentinel_column(), "C");
        assert_eq!(descriptor.columns().len(), 9);
    }

    #[test]
    fn test_load_resolves_paths_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, EXAMPLE).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.paths.summary_dir, dir.path().join("data/summary"));
        assert_eq!(config.paths.logs_dir, dir.path().join("logs"));
    }

    #[test]
    fn test_schema_errors_surface() {
        let err = AppConfig::from_json_str(r#"{ "excel": { "structure": {} } }"#).unwrap_err();
        match err {
            ConfigError::Schema { errors } => assert!(!errors.is_empty()),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_columns_rejected_at_load() {
        let mut doc: Value = serde_json::from_str(EXAMPLE).unwrap();
        doc["excel"]["structure"]["columns"]["sem4"]["column"] = "H".into();
        let err = AppConfig::from_json_str(&doc.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_unbound_field_map_rejected() {
        let mut doc: Value = serde_json::from_str(EXAMPLE).unwrap();
        doc["transform"]["field_map"] = serde_json::json!({ "group_id": "seccion" });
        let err = AppConfig::from_json_str(&doc.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFieldMap(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_bad_timestamp_format_falls_back() {
        let ts = format_timestamp("%Q");
        assert_eq!(ts.len(), "20240101_120000".len());
        assert_eq!(format_timestamp("%Y").len(), 4);
    }
}
