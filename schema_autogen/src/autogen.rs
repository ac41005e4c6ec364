//! Autogenerate entry points
//!
//! [`AutogenOptions`] gathers everything a diff pass needs besides the live database:
//! the target metadata, filters, the render override and behavior switches.
//! [`compare_metadata`] returns the raw change list and [`produce_migration_diffs`]
//! renders it into apply/revert blocks.

use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::schema::compare::CompareOptions;
use crate::schema::diff::{DiffOptions, SchemaChange, SchemaDiff, DEFAULT_VERSION_TABLE};
use crate::schema::filter::{IncludeSymbol, ObjectFilter, ObjectKind, SchemaObject};
use crate::schema::generator::{self, MigrationDiffs, RenderContext, RenderItem, RenderItemFn};
use crate::schema::inspector::Inspector;
use crate::schema::sqltype::Dialect;
use crate::schema::types::MetaData;

/// Configuration surface of an autogenerate run
pub struct AutogenOptions {
    /// Desired schema; required
    pub target_metadata: Option<MetaData>,
    pub remove_tables: bool,
    pub include_schemas: bool,
    pub model_prefix: String,
    pub op_prefix: String,
    pub dialect: Dialect,
    pub version_table: String,
    pub compare_type: bool,
    pub compare_server_default: bool,
    include_symbol: Option<IncludeSymbol>,
    object_filters: Vec<ObjectFilter>,
    render_item: Option<Box<RenderItemFn>>,
}

impl Default for AutogenOptions {
    fn default() -> Self {
        Self {
            target_metadata: None,
            remove_tables: false,
            include_schemas: false,
            model_prefix: "sa.".to_string(),
            op_prefix: "op.".to_string(),
            dialect: Dialect::Generic,
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            compare_type: true,
            compare_server_default: true,
            include_symbol: None,
            object_filters: Vec::new(),
            render_item: None,
        }
    }
}

impl AutogenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from the `[database]` and `[autogenerate]` configuration sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = &config.autogenerate;
        Ok(Self {
            remove_tables: settings.remove_tables,
            include_schemas: settings.include_schemas,
            model_prefix: settings.model_prefix.clone(),
            op_prefix: settings.op_prefix.clone(),
            dialect: Dialect::from_driver(&config.database.driver)?,
            version_table: settings.version_table.clone(),
            compare_type: settings.compare_type,
            compare_server_default: settings.compare_server_default,
            ..Self::default()
        })
    }

    pub fn target_metadata(mut self, metadata: MetaData) -> Self {
        self.target_metadata = Some(metadata);
        self
    }

    /// Restrict comparison to tables for which `include(name, schema)` holds
    pub fn include_symbol<F>(mut self, include: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> bool + 'static,
    {
        self.include_symbol = Some(Box::new(include));
        self
    }

    /// Add a filter; an object is compared only if every filter accepts it
    pub fn object_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(SchemaObject<'_>, &str, ObjectKind, bool, Option<SchemaObject<'_>>) -> bool + 'static,
    {
        self.object_filters.push(Box::new(filter));
        self
    }

    /// Override rendering of individual items; returning `None` keeps the default rendering
    pub fn render_item<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderItem<'_>, &RenderContext<'_>) -> Option<String> + 'static,
    {
        self.render_item = Some(Box::new(render));
        self
    }

    pub fn remove_tables(mut self, remove_tables: bool) -> Self {
        self.remove_tables = remove_tables;
        self
    }

    pub fn include_schemas(mut self, include_schemas: bool) -> Self {
        self.include_schemas = include_schemas;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn model_prefix(mut self, prefix: &str) -> Self {
        self.model_prefix = prefix.to_string();
        self
    }

    pub fn op_prefix(mut self, prefix: &str) -> Self {
        self.op_prefix = prefix.to_string();
        self
    }

    pub fn version_table(mut self, name: &str) -> Self {
        self.version_table = name.to_string();
        self
    }

    pub fn compare_type(mut self, compare_type: bool) -> Self {
        self.compare_type = compare_type;
        self
    }

    pub fn compare_server_default(mut self, compare_server_default: bool) -> Self {
        self.compare_server_default = compare_server_default;
        self
    }

    fn metadata(&self) -> Result<&MetaData> {
        self.target_metadata
            .as_ref()
            .ok_or(Error::MissingTargetMetadata)
    }

    /// Render settings borrowed from these options
    pub fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            dialect: self.dialect,
            model_prefix: self.model_prefix.clone(),
            op_prefix: self.op_prefix.clone(),
            metadata_schema: self.target_metadata.as_ref().and_then(|m| m.schema.clone()),
            render_item: self.render_item.as_deref(),
        }
    }

    fn diff_options(&self) -> DiffOptions<'_> {
        DiffOptions {
            include_symbol: self.include_symbol.as_ref(),
            object_filters: &self.object_filters,
            remove_tables: self.remove_tables,
            include_schemas: self.include_schemas,
            version_table: &self.version_table,
            compare: CompareOptions {
                compare_type: self.compare_type,
                compare_server_default: self.compare_server_default,
            },
        }
    }
}

/// Compare the target metadata against the live database
pub fn compare_metadata(options: &AutogenOptions, inspector: &dyn Inspector) -> Result<Vec<SchemaChange>> {
    let metadata = options.metadata()?;
    let ctx = options.render_context();
    let diff_options = options.diff_options();
    let changes = SchemaDiff::generate(metadata, inspector, &diff_options, &ctx)?;
    info!(changes = changes.len(), tables = metadata.len(), "Compared target metadata");
    Ok(changes)
}

/// Compare and render the apply/revert blocks
pub fn produce_migration_diffs(options: &AutogenOptions, inspector: &dyn Inspector) -> Result<MigrationDiffs> {
    let changes = compare_metadata(options, inspector)?;
    Ok(render_changes(options, &changes))
}

/// Render an already computed change list
pub fn render_changes(options: &AutogenOptions, changes: &[SchemaChange]) -> MigrationDiffs {
    let ctx = options.render_context();
    generator::produce_migration_diffs(&ctx, changes)
}
