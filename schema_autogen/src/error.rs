//! Error types for schema_autogen

use thiserror::Error;

/// Result type for schema_autogen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for schema_autogen
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Can't proceed with autogenerate: no target metadata was provided to the context")]
    MissingTargetMetadata,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Schema analysis error: {0}")]
    SchemaAnalysisError(String),

    /// The backend cannot reflect the requested capability (e.g. unique constraints).
    #[error("Introspection not supported: {0}")]
    NotSupported(String),

    #[error("No such table: {0}")]
    NoSuchTable(String),

    #[error("Type parse error: {0}")]
    TypeParseError(String),

    #[error("Model registration error: {0}")]
    ModelRegistrationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// TOML is only used for configuration and definition files
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
