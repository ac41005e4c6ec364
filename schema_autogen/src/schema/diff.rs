//! Schema difference calculator
//!
//! This module compares the desired [`MetaData`] against the live database read through an
//! [`Inspector`] and produces an ordered list of [`SchemaChange`] entries.
//!
//! Ordering of the list: table additions (parents first), table removals (children first),
//! then for each matched table in sorted order its column additions, column removals, column
//! modifications, unique constraint changes and index changes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema::compare::{compare_column, ColumnDiff, CompareOptions};
use crate::schema::dependency::{creation_order, removal_order};
use crate::schema::filter::{run_filters, IncludeSymbol, ObjectFilter, SchemaObject};
use crate::schema::generator::{render_server_default, RenderContext};
use crate::schema::inspector::{reflect_table, Inspector};
use crate::schema::sqltype::SqlType;
use crate::schema::types::{Column, Index, MetaData, ServerDefault, Table, TableKey, UniqueConstraint};

/// Default name of the bookkeeping table excluded from comparison
pub const DEFAULT_VERSION_TABLE: &str = "schema_autogen_version";

/// A before/after pair; `old` is the live value, `new` the desired one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

impl<T: Clone> Change<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    pub fn swapped(&self) -> Self {
        Self {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Column attributes before the change, rendered as `existing_*` arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingColumn {
    #[serde(rename = "type")]
    pub data_type: SqlType,
    pub nullable: bool,
    pub server_default: Option<ServerDefault>,
}

/// Every simultaneous difference on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnModification {
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
    pub type_change: Option<Change<SqlType>>,
    pub nullable_change: Option<Change<bool>>,
    pub default_change: Option<Change<Option<ServerDefault>>>,
    pub existing: ExistingColumn,
}

impl ColumnModification {
    /// The same modification in the opposite direction
    pub fn inverse(&self) -> Self {
        let mut existing = self.existing.clone();
        if let Some(change) = &self.type_change {
            existing.data_type = change.new.clone();
        }
        if let Some(change) = &self.nullable_change {
            existing.nullable = change.new;
        }
        if let Some(change) = &self.default_change {
            existing.server_default = change.new.clone();
        }
        Self {
            schema: self.schema.clone(),
            table: self.table.clone(),
            column: self.column.clone(),
            type_change: self.type_change.as_ref().map(Change::swapped),
            nullable_change: self.nullable_change.as_ref().map(Change::swapped),
            default_change: self.default_change.as_ref().map(Change::swapped),
            existing,
        }
    }
}

/// One detected structural difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaChange {
    AddTable(Table),
    RemoveTable(Table),
    AddColumn {
        schema: Option<String>,
        table: String,
        column: Column,
    },
    RemoveColumn {
        schema: Option<String>,
        table: String,
        column: Column,
    },
    ModifyColumn(ColumnModification),
    AddIndex {
        schema: Option<String>,
        table: String,
        index: Index,
    },
    RemoveIndex {
        schema: Option<String>,
        table: String,
        index: Index,
    },
    AddConstraint {
        schema: Option<String>,
        table: String,
        constraint: UniqueConstraint,
    },
    RemoveConstraint {
        schema: Option<String>,
        table: String,
        constraint: UniqueConstraint,
    },
}

impl SchemaChange {
    /// The change that undoes this one. Applying `inverse` twice gives back the original.
    pub fn inverse(&self) -> Self {
        match self.clone() {
            SchemaChange::AddTable(table) => SchemaChange::RemoveTable(table),
            SchemaChange::RemoveTable(table) => SchemaChange::AddTable(table),
            SchemaChange::AddColumn { schema, table, column } => {
                SchemaChange::RemoveColumn { schema, table, column }
            }
            SchemaChange::RemoveColumn { schema, table, column } => {
                SchemaChange::AddColumn { schema, table, column }
            }
            SchemaChange::ModifyColumn(modification) => {
                SchemaChange::ModifyColumn(modification.inverse())
            }
            SchemaChange::AddIndex { schema, table, index } => {
                SchemaChange::RemoveIndex { schema, table, index }
            }
            SchemaChange::RemoveIndex { schema, table, index } => {
                SchemaChange::AddIndex { schema, table, index }
            }
            SchemaChange::AddConstraint { schema, table, constraint } => {
                SchemaChange::RemoveConstraint { schema, table, constraint }
            }
            SchemaChange::RemoveConstraint { schema, table, constraint } => {
                SchemaChange::AddConstraint { schema, table, constraint }
            }
        }
    }

    /// Identity of the table the change applies to
    pub fn table_key(&self) -> TableKey {
        match self {
            SchemaChange::AddTable(table) | SchemaChange::RemoveTable(table) => table.key(),
            SchemaChange::AddColumn { schema, table, .. }
            | SchemaChange::RemoveColumn { schema, table, .. }
            | SchemaChange::AddIndex { schema, table, .. }
            | SchemaChange::RemoveIndex { schema, table, .. }
            | SchemaChange::AddConstraint { schema, table, .. }
            | SchemaChange::RemoveConstraint { schema, table, .. } => {
                TableKey::new(schema.as_deref(), table)
            }
            SchemaChange::ModifyColumn(modification) => {
                TableKey::new(modification.schema.as_deref(), &modification.table)
            }
        }
    }
}

/// Settings of one diff pass
pub struct DiffOptions<'a> {
    pub include_symbol: Option<&'a IncludeSymbol>,
    pub object_filters: &'a [ObjectFilter],
    pub remove_tables: bool,
    pub include_schemas: bool,
    pub version_table: &'a str,
    pub compare: CompareOptions,
}

/// A single comparison pass over immutable inputs
pub struct SchemaDiff<'a> {
    metadata: &'a MetaData,
    inspector: &'a dyn Inspector,
    options: &'a DiffOptions<'a>,
    ctx: &'a RenderContext<'a>,
    changes: Vec<SchemaChange>,
}

impl<'a> SchemaDiff<'a> {
    /// Compare `metadata` against the database behind `inspector`
    pub fn generate(
        metadata: &'a MetaData,
        inspector: &'a dyn Inspector,
        options: &'a DiffOptions<'a>,
        ctx: &'a RenderContext<'a>,
    ) -> Result<Vec<SchemaChange>> {
        let mut diff = Self {
            metadata,
            inspector,
            options,
            ctx,
            changes: Vec::new(),
        };
        diff.compare_tables()?;
        Ok(diff.changes)
    }

    fn include(&self, key: &TableKey) -> bool {
        match self.options.include_symbol {
            Some(include) => include(&key.name, key.schema.as_deref()),
            None => true,
        }
    }

    /// Live table identities across the inspected schemas
    fn live_table_keys(&self) -> Result<BTreeSet<TableKey>> {
        let schemas: Vec<Option<String>> = if self.options.include_schemas {
            let mut names = self.inspector.schema_names()?;
            names.remove("information_schema");
            if let Some(default) = self.inspector.default_schema_name() {
                names.remove(default);
            }
            std::iter::once(None).chain(names.into_iter().map(Some)).collect()
        } else {
            vec![None]
        };

        let mut keys = BTreeSet::new();
        for schema in &schemas {
            for name in self.inspector.table_names(schema.as_deref())? {
                if name != self.options.version_table {
                    keys.insert(TableKey::new(schema.as_deref(), &name));
                }
            }
        }
        Ok(keys.into_iter().filter(|key| self.include(key)).collect())
    }

    fn compare_tables(&mut self) -> Result<()> {
        let metadata = self.metadata;
        let inspector = self.inspector;
        let live_keys = self.live_table_keys()?;
        let desired_keys: Vec<&TableKey> = metadata
            .keys()
            .filter(|key| self.include(key))
            .collect();
        let desired_set: BTreeSet<&TableKey> = desired_keys.iter().copied().collect();

        let added: Vec<&Table> = desired_keys
            .iter()
            .filter(|key| !live_keys.contains(**key))
            .filter_map(|key| metadata.get(key))
            .collect();
        for table in creation_order(added, metadata.schema.as_deref()) {
            self.add_table(table);
        }

        let removed: Vec<&TableKey> = live_keys
            .iter()
            .filter(|key| !desired_set.contains(key))
            .collect();
        if self.options.remove_tables {
            let reflected = removed
                .iter()
                .map(|key| reflect_table(inspector, key))
                .collect::<Result<Vec<Table>>>()?;
            for table in removal_order(reflected.iter().collect(), None) {
                self.remove_table(table)?;
            }
        } else {
            for key in removed {
                info!(table = %key, "Detected removed table; retained because table removal is disabled");
            }
        }

        let matched: Vec<&TableKey> = live_keys
            .iter()
            .filter(|key| desired_set.contains(key))
            .collect();
        for key in matched {
            let Some(desired) = metadata.get(key) else {
                continue;
            };
            let live = reflect_table(inspector, key)?;
            if !run_filters(
                self.options.object_filters,
                SchemaObject::Table(desired),
                &key.name,
                false,
                Some(SchemaObject::Table(&live)),
            ) {
                continue;
            }
            debug!(table = %key, "Comparing table");
            self.compare_columns(key, desired, &live);
            self.compare_uniques_and_indexes(key, desired)?;
        }
        Ok(())
    }

    fn add_table(&mut self, table: &Table) {
        let key = table.key();
        if !run_filters(
            self.options.object_filters,
            SchemaObject::Table(table),
            &table.name,
            false,
            None,
        ) {
            return;
        }
        if table.reference_only {
            info!(table = %key, "Skipped added table");
            return;
        }
        info!(table = %key, "Detected added table");
        self.changes.push(SchemaChange::AddTable(table.clone()));
        let filters = self.options.object_filters;
        for index in &table.indexes {
            if !run_filters(filters, SchemaObject::Index(index), &index.name, false, None) {
                continue;
            }
            info!(table = %key, index = %index.name, "Detected added index");
            self.changes.push(SchemaChange::AddIndex {
                schema: table.schema.clone(),
                table: table.name.clone(),
                index: index.clone(),
            });
        }
    }

    fn remove_table(&mut self, table: &Table) -> Result<()> {
        let key = table.key();
        if !run_filters(
            self.options.object_filters,
            SchemaObject::Table(table),
            &table.name,
            true,
            None,
        ) {
            return Ok(());
        }
        let schema = key.schema.as_deref();
        let mut removed = table.clone();
        removed.unique_constraints = match self.inspector.unique_constraints(&key.name, schema) {
            Ok(reflected) => reflected
                .into_iter()
                .map(|u| UniqueConstraint {
                    name: u.name,
                    columns: u.columns,
                })
                .collect(),
            Err(Error::NotSupported(_)) | Err(Error::NoSuchTable(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let constraint_names: BTreeSet<&str> = removed
            .unique_constraints
            .iter()
            .filter_map(|u| u.name.as_deref())
            .collect();

        let filters = self.options.object_filters;
        for index in or_empty(self.inspector.indexes(&key.name, schema))? {
            if constraint_names.contains(index.name.as_str())
                || !run_filters(filters, SchemaObject::Index(&index), &index.name, true, None)
            {
                continue;
            }
            info!(table = %key, index = %index.name, "Detected removed index");
            self.changes.push(SchemaChange::RemoveIndex {
                schema: table.schema.clone(),
                table: table.name.clone(),
                index,
            });
        }
        info!(table = %key, "Detected removed table");
        self.changes.push(SchemaChange::RemoveTable(removed));
        Ok(())
    }

    fn compare_columns(&mut self, key: &TableKey, desired: &Table, live: &Table) {
        let desired_columns: BTreeMap<&str, &Column> =
            desired.columns.iter().map(|c| (c.name.as_str(), c)).collect();
        let live_columns: BTreeMap<&str, &Column> =
            live.columns.iter().map(|c| (c.name.as_str(), c)).collect();
        let filters = self.options.object_filters;

        for (name, column) in &desired_columns {
            if live_columns.contains_key(name)
                || !run_filters(filters, SchemaObject::Column(column), name, false, None)
            {
                continue;
            }
            if desired.reference_only {
                info!(table = %key, column = %name, "Skipped added column");
                continue;
            }
            info!(table = %key, column = %name, "Detected added column");
            self.changes.push(SchemaChange::AddColumn {
                schema: key.schema.clone(),
                table: key.name.clone(),
                column: (*column).clone(),
            });
        }

        for (name, column) in &live_columns {
            if desired_columns.contains_key(name)
                || !run_filters(filters, SchemaObject::Column(column), name, true, None)
            {
                continue;
            }
            if desired.reference_only {
                info!(table = %key, column = %name, "Skipped removed column");
                continue;
            }
            info!(table = %key, column = %name, "Detected removed column");
            self.changes.push(SchemaChange::RemoveColumn {
                schema: key.schema.clone(),
                table: key.name.clone(),
                column: Column {
                    primary_key: false,
                    ..(*column).clone()
                },
            });
        }

        for (name, column) in &desired_columns {
            let Some(live_column) = live_columns.get(name) else {
                continue;
            };
            if !run_filters(
                filters,
                SchemaObject::Column(column),
                name,
                false,
                Some(SchemaObject::Column(live_column)),
            ) {
                continue;
            }
            let diff = compare_column(self.ctx, self.options.compare, &key.name, column, live_column);
            if diff.is_empty() {
                continue;
            }
            self.log_column_diff(key, name, &diff, desired.reference_only);
            if desired.reference_only {
                continue;
            }
            self.changes.push(SchemaChange::ModifyColumn(ColumnModification {
                schema: key.schema.clone(),
                table: key.name.clone(),
                column: name.to_string(),
                type_change: diff.type_change,
                nullable_change: diff.nullable_change,
                default_change: diff.default_change,
                existing: ExistingColumn {
                    data_type: live_column.data_type.clone(),
                    nullable: live_column.nullable,
                    server_default: live_column.server_default.clone(),
                },
            }));
        }
    }

    fn log_column_diff(&self, key: &TableKey, column: &str, diff: &ColumnDiff, skipped: bool) {
        let verdict = if skipped { "Skipped" } else { "Detected" };
        if let Some(change) = &diff.type_change {
            info!(
                table = %key,
                column = column,
                from = %change.old,
                to = %change.new,
                "{} type change",
                verdict
            );
        }
        if let Some(change) = &diff.nullable_change {
            let label = if change.new { "NULL" } else { "NOT NULL" };
            info!(table = %key, column = column, "{} {} on column", verdict, label);
        }
        if let Some(change) = &diff.default_change {
            info!(
                table = %key,
                column = column,
                default = %render_server_default(self.ctx, change.new.as_ref()),
                "{} server default change",
                verdict
            );
        }
    }

    fn compare_uniques_and_indexes(&mut self, key: &TableKey, desired: &Table) -> Result<()> {
        let schema = key.schema.as_deref();
        let filters = self.options.object_filters;
        let skipped = desired.reference_only;

        let desired_uniques: BTreeMap<String, &UniqueConstraint> = desired
            .unique_constraints
            .iter()
            .filter_map(|u| u.name.clone().map(|name| (name, u)))
            .collect();

        let live_uniques: Option<BTreeMap<String, UniqueConstraint>> =
            match self.inspector.unique_constraints(&key.name, schema) {
                Ok(reflected) => Some(
                    reflected
                        .into_iter()
                        .filter_map(|u| {
                            u.name.clone().map(|name| {
                                (name, UniqueConstraint {
                                    name: u.name,
                                    columns: u.columns,
                                })
                            })
                        })
                        .collect(),
                ),
                Err(Error::NotSupported(reason)) => {
                    info!(table = %key, reason = %reason, "Unique constraint reflection not supported; skipping");
                    None
                }
                Err(Error::NoSuchTable(_)) => Some(BTreeMap::new()),
                Err(e) => return Err(e),
            };

        let dedup_names: BTreeSet<String> = match &live_uniques {
            Some(live) => {
                self.diff_uniques(key, &desired_uniques, live, skipped);
                live.keys().cloned().collect()
            }
            None => desired_uniques.keys().cloned().collect(),
        };

        let desired_indexes: BTreeMap<&str, &Index> = desired
            .indexes
            .iter()
            .filter(|i| !dedup_names.contains(&i.name))
            .map(|i| (i.name.as_str(), i))
            .collect();
        let live_index_list = or_empty(self.inspector.indexes(&key.name, schema))?;
        let live_indexes: BTreeMap<&str, &Index> = live_index_list
            .iter()
            .filter(|i| !dedup_names.contains(&i.name))
            .map(|i| (i.name.as_str(), i))
            .collect();

        for (name, index) in &desired_indexes {
            let counterpart = live_indexes.get(name).map(|i| SchemaObject::Index(i));
            if live_indexes.contains_key(name)
                || !run_filters(filters, SchemaObject::Index(index), name, false, counterpart)
            {
                continue;
            }
            self.push_index(key, SchemaChange::AddIndex {
                schema: key.schema.clone(),
                table: key.name.clone(),
                index: (*index).clone(),
            }, "added", skipped);
        }

        for (name, index) in &live_indexes {
            if desired_indexes.contains_key(name)
                || !run_filters(filters, SchemaObject::Index(index), name, true, None)
            {
                continue;
            }
            self.push_index(key, SchemaChange::RemoveIndex {
                schema: key.schema.clone(),
                table: key.name.clone(),
                index: (*index).clone(),
            }, "removed", skipped);
        }

        for (name, index) in &desired_indexes {
            let Some(live_index) = live_indexes.get(name) else {
                continue;
            };
            if !run_filters(
                filters,
                SchemaObject::Index(index),
                name,
                false,
                Some(SchemaObject::Index(live_index)),
            ) {
                continue;
            }
            if index.unique == live_index.unique && index.columns == live_index.columns {
                continue;
            }
            let verdict = if skipped { "Skipped" } else { "Detected" };
            info!(
                table = %key,
                index = %name,
                from = ?live_index.columns,
                to = ?index.columns,
                "{} changed index",
                verdict
            );
            if skipped {
                continue;
            }
            self.changes.push(SchemaChange::RemoveIndex {
                schema: key.schema.clone(),
                table: key.name.clone(),
                index: (*live_index).clone(),
            });
            self.changes.push(SchemaChange::AddIndex {
                schema: key.schema.clone(),
                table: key.name.clone(),
                index: (*index).clone(),
            });
        }
        Ok(())
    }

    fn push_index(&mut self, key: &TableKey, change: SchemaChange, action: &str, skipped: bool) {
        let name = match &change {
            SchemaChange::AddIndex { index, .. } | SchemaChange::RemoveIndex { index, .. } => {
                index.name.clone()
            }
            _ => String::new(),
        };
        if skipped {
            info!(table = %key, index = %name, "Skipped {} index", action);
            return;
        }
        info!(table = %key, index = %name, "Detected {} index", action);
        self.changes.push(change);
    }

    fn diff_uniques(
        &mut self,
        key: &TableKey,
        desired: &BTreeMap<String, &UniqueConstraint>,
        live: &BTreeMap<String, UniqueConstraint>,
        skipped: bool,
    ) {
        let filters = self.options.object_filters;
        let verdict = if skipped { "Skipped" } else { "Detected" };
        let add = |constraint: &UniqueConstraint| SchemaChange::AddConstraint {
            schema: key.schema.clone(),
            table: key.name.clone(),
            constraint: constraint.clone(),
        };
        let remove = |constraint: &UniqueConstraint| SchemaChange::RemoveConstraint {
            schema: key.schema.clone(),
            table: key.name.clone(),
            constraint: constraint.clone(),
        };

        for (name, constraint) in desired {
            if live.contains_key(name)
                || !run_filters(filters, SchemaObject::UniqueConstraint(constraint), name, false, None)
            {
                continue;
            }
            info!(table = %key, constraint = %name, "{} added unique constraint", verdict);
            if !skipped {
                self.changes.push(add(*constraint));
            }
        }

        for (name, constraint) in live {
            if desired.contains_key(name)
                || !run_filters(filters, SchemaObject::UniqueConstraint(constraint), name, true, None)
            {
                continue;
            }
            info!(table = %key, constraint = %name, "{} removed unique constraint", verdict);
            if !skipped {
                self.changes.push(remove(constraint));
            }
        }

        for (name, constraint) in desired {
            let Some(live_constraint) = live.get(name) else {
                continue;
            };
            if constraint.columns == live_constraint.columns
                || !run_filters(
                    filters,
                    SchemaObject::UniqueConstraint(constraint),
                    name,
                    false,
                    Some(SchemaObject::UniqueConstraint(live_constraint)),
                )
            {
                continue;
            }
            info!(
                table = %key,
                constraint = %name,
                from = ?live_constraint.columns,
                to = ?constraint.columns,
                "{} changed unique constraint",
                verdict
            );
            if !skipped {
                self.changes.push(remove(live_constraint));
                self.changes.push(add(*constraint));
            }
        }
    }
}

/// A table that disappeared between listing and reflection has no indexes
fn or_empty<T>(result: Result<Vec<T>>) -> Result<Vec<T>> {
    match result {
        Err(Error::NoSuchTable(_)) => Ok(Vec::new()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modification() -> ColumnModification {
        ColumnModification {
            schema: Some("app".to_string()),
            table: "user".to_string(),
            column: "name".to_string(),
            type_change: Some(Change::new(SqlType::string(Some(40)), SqlType::string(Some(50)))),
            nullable_change: None,
            default_change: Some(Change::new(None, Some(ServerDefault::Text("x".to_string())))),
            existing: ExistingColumn {
                data_type: SqlType::string(Some(40)),
                nullable: true,
                server_default: None,
            },
        }
    }

    #[test]
    fn inverse_is_an_involution() {
        let change = SchemaChange::ModifyColumn(modification());
        assert_eq!(change.inverse().inverse(), change);

        let table = SchemaChange::AddTable(Table::new("user"));
        assert_eq!(table.inverse(), SchemaChange::RemoveTable(Table::new("user")));
        assert_eq!(table.inverse().inverse(), table);
    }

    #[test]
    fn inverse_moves_changed_attributes_into_existing() {
        let SchemaChange::ModifyColumn(inverted) = SchemaChange::ModifyColumn(modification()).inverse()
        else {
            panic!("expected a column modification");
        };
        assert_eq!(inverted.existing.data_type, SqlType::string(Some(50)));
        assert_eq!(
            inverted.existing.server_default,
            Some(ServerDefault::Text("x".to_string()))
        );
        assert!(inverted.existing.nullable);
        assert_eq!(inverted.type_change.unwrap().new, SqlType::string(Some(40)));
    }

    #[test]
    fn changes_serialize_with_an_operation_tag() {
        let change = SchemaChange::RemoveIndex {
            schema: None,
            table: "user".to_string(),
            index: Index::new("ix_user_name", &["name"]),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["op"], "remove_index");
        assert_eq!(json["index"]["columns"][0], "name");
        assert_eq!(change.table_key(), TableKey::new(None, "user"));
    }
}
