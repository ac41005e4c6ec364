//! schema_autogen: compare declared tables against a live database and render the difference
//! as reversible migration operations
//!
//! Desired tables come from `#[derive(Model)]` structs or definition files collected by the
//! [`ModelRegistry`]. The live schema is captured once by the [`SchemaAnalyzer`] into a
//! [`ReflectedSchema`] snapshot; [`autogen::compare_metadata`] diffs the two and
//! [`autogen::produce_migration_diffs`] renders apply and revert blocks.

pub mod autogen;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;

pub use autogen::{compare_metadata, produce_migration_diffs, AutogenOptions};
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use error::{Error, Result};
pub use models::registry::{Model, ModelRegistry};
pub use schema::analyzer::SchemaAnalyzer;
pub use schema::diff::{SchemaChange, SchemaDiff};
pub use schema::generator::{MigrationDiffs, MigrationGenerator};
pub use schema::inspector::{Inspector, ReflectedSchema};
pub use schema_autogen_macros::Model;

/// Load the configuration file, install logging and connect
pub async fn init(config_path: &str) -> Result<AutogenClient> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(&config.logging)?;
    AutogenClient::new(config).await
}

/// The main client: configuration, connection, model registry and analyzer
pub struct AutogenClient {
    config: Config,
    connection: DatabaseConnection,
    model_registry: ModelRegistry,
    schema_analyzer: SchemaAnalyzer,
}

impl AutogenClient {
    /// Create a new client from configuration
    pub async fn new(config: Config) -> Result<Self> {
        let connection = DatabaseConnection::connect(&config.database).await?;
        let model_registry = ModelRegistry::new(&config.models);
        let schema_analyzer = SchemaAnalyzer::new(connection.clone(), config.database.schema.clone());

        Ok(Self {
            config,
            connection,
            model_registry,
            schema_analyzer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Register a derive model
    pub fn register<T: Model>(&mut self) -> Result<()> {
        self.model_registry.register::<T>()
    }

    /// Load the definition files named by `models.paths`
    pub fn register_models(&mut self) -> Result<usize> {
        self.model_registry.scan_and_register()
    }

    /// Capture the live schema
    pub async fn snapshot(&self) -> Result<ReflectedSchema> {
        self.schema_analyzer
            .analyze(self.config.autogenerate.include_schemas)
            .await
    }

    /// Options built from configuration, targeting the registered models
    pub fn options(&self) -> Result<AutogenOptions> {
        let metadata = self.model_registry.to_metadata(None)?;
        Ok(AutogenOptions::from_config(&self.config)?
            .dialect(self.connection.dialect())
            .target_metadata(metadata))
    }

    /// Compare the registered models against the database
    pub async fn compare(&self) -> Result<Vec<SchemaChange>> {
        let snapshot = self.snapshot().await?;
        compare_metadata(&self.options()?, &snapshot)
    }

    /// Compare and render apply/revert blocks
    pub async fn produce_migration_diffs(&self) -> Result<MigrationDiffs> {
        let snapshot = self.snapshot().await?;
        produce_migration_diffs(&self.options()?, &snapshot)
    }
}
