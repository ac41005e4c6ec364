//! Model registry for schema_autogen
//!
//! Collects the desired tables from derive models and from table definition files, then
//! produces the [`MetaData`] the diff engine compares against the live database.

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::schema::sqltype::SqlType;
use crate::schema::types::{
    CheckConstraint, Column, ForeignKey, Index, MetaData, Table, TableKey, UniqueConstraint,
};

/// A Rust type that declares a table, usually through `#[derive(Model)]`
pub trait Model {
    /// Build the table definition
    fn table() -> Result<Table>;
}

/// Registry of desired tables
pub struct ModelRegistry {
    tables: IndexMap<TableKey, Table>,
    config: ModelsConfig,
}

impl ModelRegistry {
    /// Create a new model registry
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            tables: IndexMap::new(),
            config: config.clone(),
        }
    }

    /// Register a derive model
    pub fn register<T: Model>(&mut self) -> Result<()> {
        self.register_table(T::table()?)
    }

    /// Register a table; a second table with the same identity is rejected
    pub fn register_table(&mut self, table: Table) -> Result<()> {
        let key = table.key();
        if self.tables.contains_key(&key) {
            return Err(Error::ModelRegistrationError(format!(
                "Table '{}' is registered twice",
                key
            )));
        }
        debug!(table = %key, columns = table.columns.len(), "Registered table");
        self.tables.insert(key, table);
        Ok(())
    }

    /// Load the definition files matched by the configured `models.paths` patterns
    pub fn scan_and_register(&mut self) -> Result<usize> {
        let patterns = self.config.paths.clone();
        self.load_files(&patterns)
    }

    /// Load every definition file matched by the glob `patterns`; returns the table count
    pub fn load_files(&mut self, patterns: &[String]) -> Result<usize> {
        let mut loaded = 0;
        for pattern in patterns {
            let paths = glob::glob(pattern).map_err(|e| {
                Error::ConfigError(format!("Invalid model path pattern '{}': {}", pattern, e))
            })?;
            for entry in paths {
                let path = entry.map_err(|e| {
                    Error::ConfigError(format!(
                        "Unreadable model path '{}': {}",
                        e.path().display(),
                        e.error()
                    ))
                })?;
                if path.is_file() {
                    loaded += self.load_file(&path)?;
                }
            }
        }
        info!(tables = loaded, "Loaded table definitions");
        Ok(loaded)
    }

    /// Load one definition file, picking the format from its extension
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let file: DefinitionFile = match extension.as_str() {
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            other => {
                return Err(Error::ModelRegistrationError(format!(
                    "Unsupported definition file type '{}': {}",
                    other,
                    path.display()
                )))
            }
        };

        let count = file.tables.len();
        for definition in file.tables {
            let table = definition.into_table(file.schema.as_deref())?;
            self.register_table(table)?;
        }
        debug!(path = %path.display(), tables = count, "Loaded definition file");
        Ok(count)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Build the target metadata; `models.reference_only` names are marked reference-only
    pub fn to_metadata(&self, schema: Option<&str>) -> Result<MetaData> {
        let mut metadata = match schema {
            Some(schema) => MetaData::with_schema(schema),
            None => MetaData::new(),
        };
        for (key, table) in &self.tables {
            let mut table = table.clone();
            let qualified = key.to_string();
            if self
                .config
                .reference_only
                .iter()
                .any(|name| *name == table.name || *name == qualified)
            {
                table.reference_only = true;
            }
            metadata.add_table(table)?;
        }
        Ok(metadata)
    }
}

/// Contents of a table definition file
#[derive(Debug, Deserialize)]
struct DefinitionFile {
    /// Schema applied to tables that do not name one
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    tables: Vec<TableDefinition>,
}

#[derive(Debug, Deserialize)]
struct TableDefinition {
    name: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    reference_only: bool,
    #[serde(default)]
    columns: Vec<ColumnDefinition>,
    #[serde(default)]
    indexes: Vec<IndexDefinition>,
    #[serde(default)]
    unique_constraints: Vec<UniqueDefinition>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeyDefinition>,
    #[serde(default)]
    check_constraints: Vec<CheckDefinition>,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ColumnDefinition {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    primary_key: bool,
    /// Defaults to `true` unless the column is part of the primary key
    nullable: Option<bool>,
    server_default: Option<String>,
    autoincrement: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct IndexDefinition {
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    unique: bool,
}

#[derive(Debug, Deserialize)]
struct UniqueDefinition {
    name: Option<String>,
    columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ForeignKeyDefinition {
    name: Option<String>,
    columns: Vec<String>,
    references: Vec<String>,
    on_delete: Option<String>,
    on_update: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckDefinition {
    name: Option<String>,
    sql: String,
}

impl TableDefinition {
    fn into_table(self, file_schema: Option<&str>) -> Result<Table> {
        let mut table = Table::new(&self.name);
        table.schema = self.schema.or_else(|| file_schema.map(str::to_string));
        table.reference_only = self.reference_only;
        table.options = self.options;

        for column in self.columns {
            let data_type = SqlType::parse(&column.data_type).map_err(|e| {
                Error::ModelRegistrationError(format!(
                    "Column '{}.{}': {}",
                    self.name, column.name, e
                ))
            })?;
            let mut built = Column::new(&column.name, data_type);
            if column.primary_key {
                built = built.primary_key();
            }
            if let Some(nullable) = column.nullable {
                built = built.nullable(nullable);
            }
            if let Some(default) = &column.server_default {
                built = built.server_default(default);
            }
            if let Some(autoincrement) = column.autoincrement {
                built = built.autoincrement(autoincrement);
            }
            table.add_column(built);
        }

        for index in self.indexes {
            table.indexes.push(Index {
                name: index.name,
                columns: index.columns,
                unique: index.unique,
            });
        }
        for unique in self.unique_constraints {
            table.unique_constraints.push(UniqueConstraint {
                name: unique.name,
                columns: unique.columns,
            });
        }
        for fk in self.foreign_keys {
            if fk.columns.len() != fk.references.len() {
                return Err(Error::ModelRegistrationError(format!(
                    "Foreign key on '{}' lists {} columns but {} references",
                    self.name,
                    fk.columns.len(),
                    fk.references.len()
                )));
            }
            table.foreign_keys.push(ForeignKey {
                name: fk.name,
                columns: fk.columns,
                ref_columns: fk.references,
                on_update: fk.on_update,
                on_delete: fk.on_delete,
                initially: None,
                deferrable: None,
            });
        }
        for check in self.check_constraints {
            table
                .check_constraints
                .push(CheckConstraint::new(check.name.as_deref(), &check.sql));
        }
        Ok(table)
    }
}
