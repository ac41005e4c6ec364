//! Configuration handling for schema_autogen

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::diff::DEFAULT_VERSION_TABLE;

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let config_str = fs::read_to_string(path.as_ref())
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    parse(&config_str)
}

/// Parse configuration from TOML text
pub fn parse(config_str: &str) -> Result<Config> {
    toml::from_str(config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))
}

/// Represents the complete schema_autogen configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub autogenerate: AutogenerateConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    pub logging: Option<LoggingConfig>,
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub driver: String,
    pub url: String,
    pub pool_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub schema: Option<String>,
}

/// Comparison and rendering behavior
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AutogenerateConfig {
    /// Emit `drop_table` for tables only present in the database
    #[serde(default)]
    pub remove_tables: bool,
    /// Compare tables in every schema, not only the default one
    #[serde(default)]
    pub include_schemas: bool,
    #[serde(default = "default_true")]
    pub compare_type: bool,
    #[serde(default = "default_true")]
    pub compare_server_default: bool,
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,
    #[serde(default = "default_op_prefix")]
    pub op_prefix: String,
    #[serde(default = "default_version_table")]
    pub version_table: String,
}

impl Default for AutogenerateConfig {
    fn default() -> Self {
        Self {
            remove_tables: false,
            include_schemas: false,
            compare_type: true,
            compare_server_default: true,
            model_prefix: default_model_prefix(),
            op_prefix: default_op_prefix(),
            version_table: default_version_table(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model_prefix() -> String {
    "sa.".to_string()
}

fn default_op_prefix() -> String {
    "op.".to_string()
}

fn default_version_table() -> String {
    DEFAULT_VERSION_TABLE.to_string()
}

/// Where the desired schema comes from
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModelsConfig {
    /// Glob patterns of table definition files (`.toml`, `.json`, `.yaml`, `.yml`)
    #[serde(default)]
    pub paths: Vec<String>,
    /// Tables whose differences are reported but never emitted
    #[serde(default)]
    pub reference_only: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = parse(
            r#"
            [database]
            driver = "sqlite"
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();
        assert!(!config.autogenerate.remove_tables);
        assert!(config.autogenerate.compare_type);
        assert_eq!(config.autogenerate.model_prefix, "sa.");
        assert_eq!(config.autogenerate.version_table, "schema_autogen_version");
        assert!(config.models.paths.is_empty());
        assert!(config.logging.is_none());
    }

    #[test]
    fn loads_full_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [database]
            driver = "postgres"
            url = "postgres://localhost/app"
            schema = "public"

            [autogenerate]
            remove_tables = true
            include_schemas = true
            op_prefix = "migrate."

            [models]
            paths = ["schema/*.toml"]
            reference_only = ["legacy_users"]

            [logging]
            level = "debug"
            format = "json"
            "#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.database.schema.as_deref(), Some("public"));
        assert!(config.autogenerate.remove_tables);
        assert_eq!(config.autogenerate.op_prefix, "migrate.");
        assert_eq!(config.models.reference_only, vec!["legacy_users".to_string()]);
        assert_eq!(config.logging.unwrap().format, "json");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_file("/nonexistent/schema_autogen.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
