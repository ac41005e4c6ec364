//! Type definitions for schema objects

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::sqltype::{Dialect, SqlType};

/// Identity of a table: optional schema namespace plus name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub schema: Option<String>,
    pub name: String,
}

impl TableKey {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Resolve a foreign key column spec (`table.column` or `schema.table.column`) to the
    /// referenced table, falling back to `default_schema` when the spec has no schema.
    pub fn from_colspec(colspec: &str, default_schema: Option<&str>) -> Option<Self> {
        let tokens: Vec<&str> = colspec.split('.').collect();
        match tokens.as_slice() {
            [table, _column] => Some(Self::new(default_schema, table)),
            [schema, table, _column] => Some(Self::new(Some(schema), table)),
            _ => None,
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// The desired schema: tables in declaration order
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    /// Schema applied to foreign key specs that do not name one
    pub schema: Option<String>,
    tables: IndexMap<TableKey, Table>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata whose foreign key specs default to `schema`
    pub fn with_schema(schema: &str) -> Self {
        Self {
            schema: Some(schema.to_string()),
            tables: IndexMap::new(),
        }
    }

    /// Add a table; a second table with the same identity is rejected
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        let key = table.key();
        if self.tables.contains_key(&key) {
            return Err(Error::ModelRegistrationError(format!(
                "Table '{}' is already defined",
                key
            )));
        }
        self.tables.insert(key, table);
        Ok(())
    }

    /// Builder form of [`MetaData::add_table`]
    pub fn table(mut self, table: Table) -> Result<Self> {
        self.add_table(table)?;
        Ok(self)
    }

    pub fn get(&self, key: &TableKey) -> Option<&Table> {
        self.tables.get(key)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TableKey> {
        self.tables.keys()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Represents a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub check_constraints: Vec<CheckConstraint>,
    /// Dialect keyword options such as `mysql_engine`
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Not owned by migration generation: differences are detected but never emitted
    #[serde(default)]
    pub reference_only: bool,
}

impl Table {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: None,
            columns: Vec::new(),
            primary_key: PrimaryKey::default(),
            indexes: Vec::new(),
            unique_constraints: Vec::new(),
            foreign_keys: Vec::new(),
            check_constraints: Vec::new(),
            options: BTreeMap::new(),
            reference_only: false,
        }
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(self.schema.as_deref(), &self.name)
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn reference_only(mut self) -> Self {
        self.reference_only = true;
        self
    }

    /// Add a column; primary key columns are appended to the table's primary key
    pub fn column(mut self, column: Column) -> Self {
        self.add_column(column);
        self
    }

    pub fn add_column(&mut self, column: Column) {
        if column.primary_key && !self.primary_key.columns.contains(&column.name) {
            self.primary_key.columns.push(column.name.clone());
        }
        self.columns.push(column);
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn unique(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn check(mut self, check: CheckConstraint) -> Self {
        self.check_constraints.push(check);
        self
    }

    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Tables referenced by this table's foreign keys, excluding itself
    pub fn referenced_tables(&self, default_schema: Option<&str>) -> Vec<TableKey> {
        let own = self.key();
        let mut referenced = Vec::new();
        for fk in &self.foreign_keys {
            for spec in &fk.ref_columns {
                if let Some(key) = TableKey::from_colspec(spec, default_schema) {
                    if key != own && !referenced.contains(&key) {
                        referenced.push(key);
                    }
                }
            }
        }
        referenced
    }
}

/// Represents a database column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: SqlType,
    pub nullable: bool,
    #[serde(default)]
    pub server_default: Option<ServerDefault>,
    #[serde(default = "default_true")]
    pub autoincrement: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Create a new nullable column with the given name and type
    pub fn new(name: &str, data_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: true,
            server_default: None,
            autoincrement: true,
            primary_key: false,
        }
    }

    /// Mark as primary key; primary key columns are never nullable
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a literal server default
    pub fn server_default(mut self, default: &str) -> Self {
        self.server_default = Some(ServerDefault::Text(default.to_string()));
        self
    }

    /// Set an expression server default
    pub fn server_default_expr(mut self, expr: SqlExpr) -> Self {
        self.server_default = Some(ServerDefault::Expression(expr));
        self
    }

    pub fn autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }
}

/// A server-side column default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerDefault {
    /// Literal default text, possibly wrapped in single quotes by the database
    Text(String),
    /// SQL expression compiled against the target dialect
    Expression(SqlExpr),
}

impl ServerDefault {
    /// Textual form of the default for `dialect`
    pub fn compile(&self, dialect: Dialect) -> String {
        match self {
            ServerDefault::Text(text) => text.clone(),
            ServerDefault::Expression(expr) => expr.compile(dialect).to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ServerDefault::Text(text) => text.is_empty(),
            ServerDefault::Expression(expr) => expr.sql.is_empty(),
        }
    }
}

/// A SQL expression with optional per-dialect spellings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlExpr {
    pub sql: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dialects: BTreeMap<Dialect, String>,
}

impl SqlExpr {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            dialects: BTreeMap::new(),
        }
    }

    pub fn now() -> Self {
        Self::new("now()").on(Dialect::Sqlite, "CURRENT_TIMESTAMP")
    }

    /// Spell the expression differently on `dialect`
    pub fn on(mut self, dialect: Dialect, sql: &str) -> Self {
        self.dialects.insert(dialect, sql.to_string());
        self
    }

    pub fn compile(&self, dialect: Dialect) -> &str {
        self.dialects.get(&dialect).unwrap_or(&self.sql)
    }
}

/// Represents a primary key constraint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Represents an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Represents a unique constraint; anonymous constraints are never diffed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

impl UniqueConstraint {
    pub fn new(name: Option<&str>, columns: &[&str]) -> Self {
        Self {
            name: name.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Represents a foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    /// Referenced columns as `table.column` or `schema.table.column`
    pub ref_columns: Vec<String>,
    #[serde(default)]
    pub on_update: Option<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
    #[serde(default)]
    pub initially: Option<String>,
    #[serde(default)]
    pub deferrable: Option<bool>,
}

impl ForeignKey {
    pub fn new(columns: &[&str], ref_columns: &[&str]) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
            on_update: None,
            on_delete: None,
            initially: None,
            deferrable: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn on_delete(mut self, action: &str) -> Self {
        self.on_delete = Some(action.to_string());
        self
    }

    pub fn on_update(mut self, action: &str) -> Self {
        self.on_update = Some(action.to_string());
        self
    }
}

/// Represents a check constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    #[serde(default)]
    pub name: Option<String>,
    pub sql: String,
    /// Generated by a column type (e.g. a boolean check); rendered with the type, not the table
    #[serde(default)]
    pub type_bound: bool,
}

impl CheckConstraint {
    pub fn new(name: Option<&str>, sql: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            sql: sql.to_string(),
            type_bound: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_columns_are_collected() {
        let table = Table::new("user")
            .column(Column::new("id", SqlType::integer()).primary_key())
            .column(Column::new("name", SqlType::string(Some(50))));

        assert_eq!(table.primary_key.columns, vec!["id".to_string()]);
        assert!(!table.columns[0].nullable);
        assert!(table.columns[1].nullable);
    }

    #[test]
    fn colspec_resolution() {
        assert_eq!(
            TableKey::from_colspec("user.id", None),
            Some(TableKey::new(None, "user"))
        );
        assert_eq!(
            TableKey::from_colspec("user.id", Some("app")),
            Some(TableKey::new(Some("app"), "user"))
        );
        assert_eq!(
            TableKey::from_colspec("other.user.id", Some("app")),
            Some(TableKey::new(Some("other"), "user"))
        );
        assert_eq!(TableKey::from_colspec("id", None), None);
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let mut metadata = MetaData::new();
        metadata.add_table(Table::new("user")).unwrap();
        assert!(metadata.add_table(Table::new("user")).is_err());
        assert!(metadata.add_table(Table::new("user").schema("other")).is_ok());
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn self_references_are_not_dependencies() {
        let table = Table::new("node")
            .column(Column::new("id", SqlType::integer()).primary_key())
            .column(Column::new("parent_id", SqlType::integer()))
            .foreign_key(ForeignKey::new(&["parent_id"], &["node.id"]));
        assert!(table.referenced_tables(None).is_empty());
    }
}
