//! Live schema introspection
//!
//! The diff engine never talks to a database directly. It reads structured records through
//! the [`Inspector`] trait; [`ReflectedSchema`] is the immutable in-memory snapshot the
//! analyzers fill from a connection, and it is also what tests build by hand.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::sqltype::SqlType;
use crate::schema::types::{Column, ForeignKey, Index, PrimaryKey, ServerDefault, Table, TableKey};

/// A column as reported by the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: SqlType,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default = "default_true")]
    pub autoincrement: bool,
}

fn default_true() -> bool {
    true
}

impl ReflectedColumn {
    pub fn new(name: &str, data_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
            default: None,
            autoincrement: true,
        }
    }

    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    /// Synthesize a schema column from the reflected record
    pub fn to_column(&self) -> Column {
        Column {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            server_default: self.default.as_ref().map(|d| ServerDefault::Text(d.clone())),
            autoincrement: self.autoincrement,
            primary_key: false,
        }
    }
}

/// A named unique constraint as reported by the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectedUnique {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Read access to the live database structure
pub trait Inspector {
    /// Name of the schema used when none is given, if the backend has one
    fn default_schema_name(&self) -> Option<&str>;

    fn schema_names(&self) -> Result<BTreeSet<String>>;

    fn table_names(&self, schema: Option<&str>) -> Result<BTreeSet<String>>;

    /// Columns in ordinal order
    fn columns(&self, table: &str, schema: Option<&str>) -> Result<Vec<ReflectedColumn>>;

    fn indexes(&self, table: &str, schema: Option<&str>) -> Result<Vec<Index>>;

    /// Optional capability; backends that cannot reflect unique constraints return
    /// [`Error::NotSupported`].
    fn unique_constraints(&self, table: &str, _schema: Option<&str>) -> Result<Vec<ReflectedUnique>> {
        Err(Error::NotSupported(format!(
            "unique constraint reflection for table '{}'",
            table
        )))
    }

    fn primary_key(&self, _table: &str, _schema: Option<&str>) -> Result<Option<PrimaryKey>> {
        Ok(None)
    }

    fn foreign_keys(&self, _table: &str, _schema: Option<&str>) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }
}

/// Build a [`Table`] from reflection: columns, primary key and foreign keys.
///
/// Indexes and unique constraints are reflected separately by the comparison steps so that
/// an unsupported capability only skips that step.
pub fn reflect_table(inspector: &dyn Inspector, key: &TableKey) -> Result<Table> {
    let schema = key.schema.as_deref();
    let mut table = Table::new(&key.name);
    table.schema = key.schema.clone();

    for column in inspector.columns(&key.name, schema)? {
        table.add_column(column.to_column());
    }
    if let Some(pk) = inspector.primary_key(&key.name, schema)? {
        for column in table.columns.iter_mut() {
            column.primary_key = pk.columns.contains(&column.name);
        }
        table.primary_key = pk;
    }
    table.foreign_keys = inspector
        .foreign_keys(&key.name, schema)?
        .into_iter()
        .map(|fk| qualify_references(fk, schema))
        .collect();
    Ok(table)
}

/// Two-part `table.column` targets of a reflected table live in that table's schema
fn qualify_references(mut fk: ForeignKey, schema: Option<&str>) -> ForeignKey {
    if let Some(schema) = schema {
        for spec in fk.ref_columns.iter_mut() {
            if spec.split('.').count() == 2 {
                *spec = format!("{}.{}", schema, spec);
            }
        }
    }
    fk
}

/// A reflected table inside a [`ReflectedSchema`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectedTable {
    pub columns: Vec<ReflectedColumn>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// `None` when the backend cannot reflect unique constraints
    #[serde(default)]
    pub unique_constraints: Option<Vec<ReflectedUnique>>,
}

impl ReflectedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, column: ReflectedColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKey {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Record a unique constraint; this also marks the capability as supported
    pub fn unique(mut self, name: Option<&str>, columns: &[&str]) -> Self {
        self.unique_constraints
            .get_or_insert_with(Vec::new)
            .push(ReflectedUnique {
                name: name.map(str::to_string),
                columns: columns.iter().map(|c| c.to_string()).collect(),
            });
        self
    }

    /// Mark unique constraint reflection as supported even with no constraints
    pub fn uniques_supported(mut self) -> Self {
        self.unique_constraints.get_or_insert_with(Vec::new);
        self
    }
}

/// Immutable snapshot of a live database, keyed by `schema -> table`.
///
/// The empty-string schema key holds tables of the default namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectedSchema {
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default)]
    pub schemas: BTreeMap<String, BTreeMap<String, ReflectedTable>>,
}

impl ReflectedSchema {
    pub fn new(default_schema: Option<&str>) -> Self {
        Self {
            default_schema: default_schema.map(str::to_string),
            schemas: BTreeMap::new(),
        }
    }

    /// Add a table to the default namespace
    pub fn table(self, name: &str, table: ReflectedTable) -> Self {
        self.schema_table(None, name, table)
    }

    /// Add a table to the given namespace
    pub fn schema_table(mut self, schema: Option<&str>, name: &str, table: ReflectedTable) -> Self {
        self.insert(schema, name, table);
        self
    }

    pub fn insert(&mut self, schema: Option<&str>, name: &str, table: ReflectedTable) {
        self.schemas
            .entry(schema_slot(schema).to_string())
            .or_default()
            .insert(name.to_string(), table);
    }

    fn lookup(&self, table: &str, schema: Option<&str>) -> Result<&ReflectedTable> {
        self.schemas
            .get(schema_slot(schema))
            .and_then(|tables| tables.get(table))
            .ok_or_else(|| Error::NoSuchTable(TableKey::new(schema, table).to_string()))
    }
}

fn schema_slot(schema: Option<&str>) -> &str {
    schema.unwrap_or("")
}

impl Inspector for ReflectedSchema {
    fn default_schema_name(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    fn schema_names(&self) -> Result<BTreeSet<String>> {
        let mut names: BTreeSet<String> = self
            .schemas
            .keys()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect();
        if let Some(default) = &self.default_schema {
            names.insert(default.clone());
        }
        Ok(names)
    }

    fn table_names(&self, schema: Option<&str>) -> Result<BTreeSet<String>> {
        Ok(self
            .schemas
            .get(schema_slot(schema))
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn columns(&self, table: &str, schema: Option<&str>) -> Result<Vec<ReflectedColumn>> {
        Ok(self.lookup(table, schema)?.columns.clone())
    }

    fn indexes(&self, table: &str, schema: Option<&str>) -> Result<Vec<Index>> {
        Ok(self.lookup(table, schema)?.indexes.clone())
    }

    fn unique_constraints(&self, table: &str, schema: Option<&str>) -> Result<Vec<ReflectedUnique>> {
        self.lookup(table, schema)?
            .unique_constraints
            .clone()
            .ok_or_else(|| {
                Error::NotSupported(format!("unique constraint reflection for table '{}'", table))
            })
    }

    fn primary_key(&self, table: &str, schema: Option<&str>) -> Result<Option<PrimaryKey>> {
        Ok(self.lookup(table, schema)?.primary_key.clone())
    }

    fn foreign_keys(&self, table: &str, schema: Option<&str>) -> Result<Vec<ForeignKey>> {
        Ok(self.lookup(table, schema)?.foreign_keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ReflectedSchema {
        ReflectedSchema::new(Some("main"))
            .table(
                "user",
                ReflectedTable::new()
                    .column(ReflectedColumn::new("id", SqlType::parse("INTEGER").unwrap(), false))
                    .column(
                        ReflectedColumn::new("name", SqlType::parse("VARCHAR(50)").unwrap(), true)
                            .default("'anon'"),
                    )
                    .primary_key(&["id"]),
            )
            .schema_table(Some("audit"), "log", ReflectedTable::new().uniques_supported())
    }

    #[test]
    fn reflect_table_builds_columns_and_primary_key() {
        let table = reflect_table(&snapshot(), &TableKey::new(None, "user")).unwrap();
        assert_eq!(table.primary_key.columns, vec!["id".to_string()]);
        assert!(table.columns[0].primary_key);
        assert_eq!(
            table.columns[1].server_default,
            Some(ServerDefault::Text("'anon'".to_string()))
        );
    }

    #[test]
    fn same_schema_references_take_the_table_schema() {
        let inspector = snapshot().schema_table(
            Some("audit"),
            "entry",
            ReflectedTable::new()
                .foreign_key(ForeignKey::new(&["log_id"], &["log.id"]))
                .foreign_key(ForeignKey::new(&["uid"], &["main.user.id"])),
        );
        let table = reflect_table(&inspector, &TableKey::new(Some("audit"), "entry")).unwrap();
        assert_eq!(table.foreign_keys[0].ref_columns, vec!["audit.log.id".to_string()]);
        assert_eq!(table.foreign_keys[1].ref_columns, vec!["main.user.id".to_string()]);
        assert_eq!(
            table.referenced_tables(None),
            vec![TableKey::new(Some("audit"), "log"), TableKey::new(Some("main"), "user")]
        );
    }

    #[test]
    fn missing_tables_report_no_such_table() {
        let err = snapshot().indexes("nope", None).unwrap_err();
        assert!(matches!(err, Error::NoSuchTable(name) if name == "nope"));
    }

    #[test]
    fn unique_reflection_capability_is_per_table() {
        let inspector = snapshot();
        assert!(matches!(
            inspector.unique_constraints("user", None),
            Err(Error::NotSupported(_))
        ));
        assert!(inspector.unique_constraints("log", Some("audit")).unwrap().is_empty());
    }

    #[test]
    fn schema_names_include_default() {
        let names = snapshot().schema_names().unwrap();
        assert!(names.contains("main"));
        assert!(names.contains("audit"));
        assert_eq!(names.len(), 2);
    }
}
