//! Migration command renderer
//!
//! This module turns an ordered change list into the apply (upgrade) and revert (downgrade)
//! command blocks. Rendering is direction-aware only through [`SchemaChange::inverse`]: the
//! revert block is the reversed list of inverted changes rendered by the same functions.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::diff::{ColumnModification, SchemaChange};
use crate::schema::sqltype::{Dialect, SqlType};
use crate::schema::types::{
    CheckConstraint, Column, ForeignKey, Index, PrimaryKey, ServerDefault, Table, UniqueConstraint,
};
use crate::utils::repr::{boolean, quote, quoted_list};

static WRAPPING_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'|'$").expect("valid quote regex"));
static LINE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^").expect("valid line regex"));

const HEADER: &str = "### commands auto generated by schema_autogen - please adjust! ###";
const FOOTER: &str = "### end schema_autogen commands ###";
const ALTER_INDENT: &str = "           ";

/// An item offered to the render override before the built-in rendering
#[derive(Debug, Clone, Copy)]
pub enum RenderItem<'a> {
    Table(&'a Table),
    Column(&'a Column),
    ServerDefault(Option<&'a ServerDefault>),
    Check(&'a CheckConstraint),
    ForeignKey(&'a ForeignKey),
    PrimaryKey(&'a PrimaryKey),
    Unique(&'a UniqueConstraint),
}

/// Render override: returning `Some` replaces the built-in rendering of the item
pub type RenderItemFn = dyn Fn(&RenderItem<'_>, &RenderContext<'_>) -> Option<String>;

/// Immutable settings shared by every render function
pub struct RenderContext<'a> {
    pub dialect: Dialect,
    /// Prefix of model constructs such as `Column`
    pub model_prefix: String,
    /// Prefix of migration operations such as `create_table`
    pub op_prefix: String,
    /// Schema prepended to two-token foreign key specs
    pub metadata_schema: Option<String>,
    pub render_item: Option<&'a RenderItemFn>,
}

impl<'a> RenderContext<'a> {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            model_prefix: "sa.".to_string(),
            op_prefix: "op.".to_string(),
            metadata_schema: None,
            render_item: None,
        }
    }

    fn user_defined(&self, item: RenderItem<'_>) -> Option<String> {
        self.render_item.and_then(|render| render(&item, self))
    }
}

/// Table-level constraint, rendered through a single dispatch
#[derive(Debug, Clone, Copy)]
pub enum ConstraintRef<'a> {
    PrimaryKey(&'a PrimaryKey),
    ForeignKey(&'a ForeignKey),
    Unique(&'a UniqueConstraint),
    Check(&'a CheckConstraint),
}

/// Rendered apply/revert blocks plus the imports they need
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDiffs {
    pub upgrades: String,
    pub downgrades: String,
    pub imports: BTreeSet<String>,
}

impl MigrationDiffs {
    /// Imports as sorted lines
    pub fn imports_text(&self) -> String {
        self.imports.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Render both blocks for `changes`, each wrapped and indented
pub fn produce_migration_diffs(ctx: &RenderContext<'_>, changes: &[SchemaChange]) -> MigrationDiffs {
    let mut generator = MigrationGenerator::new(ctx);
    let upgrades = indent(&generator.render_upgrade(changes));
    let downgrades = indent(&generator.render_downgrade(changes));
    MigrationDiffs {
        upgrades,
        downgrades,
        imports: generator.into_imports(),
    }
}

/// Wrap a command block in the header/footer and indent every line
pub fn indent(text: &str) -> String {
    let wrapped = format!("{}\n{}\n{}", HEADER, text, FOOTER);
    LINE_START.replace_all(&wrapped, "    ").trim().to_string()
}

/// Render a server default, or `None` when absent
pub fn render_server_default(ctx: &RenderContext<'_>, default: Option<&ServerDefault>) -> String {
    if let Some(rendered) = ctx.user_defined(RenderItem::ServerDefault(default)) {
        return rendered;
    }
    match default {
        Some(default) => {
            let text = default.compile(ctx.dialect);
            quote(&WRAPPING_QUOTE.replace_all(&text, ""))
        }
        None => "None".to_string(),
    }
}

/// Renders change entries and collects the imports the rendered text needs
pub struct MigrationGenerator<'a> {
    ctx: &'a RenderContext<'a>,
    imports: BTreeSet<String>,
}

impl<'a> MigrationGenerator<'a> {
    pub fn new(ctx: &'a RenderContext<'a>) -> Self {
        Self {
            ctx,
            imports: BTreeSet::new(),
        }
    }

    /// Imports collected so far
    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    pub fn into_imports(self) -> BTreeSet<String> {
        self.imports
    }

    /// Apply block: changes rendered in order, `pass` when empty
    pub fn render_upgrade(&mut self, changes: &[SchemaChange]) -> String {
        let commands: Vec<String> = changes.iter().map(|c| self.render_change(c)).collect();
        join_commands(commands)
    }

    /// Revert block: inverted changes rendered in reverse order, `pass` when empty
    pub fn render_downgrade(&mut self, changes: &[SchemaChange]) -> String {
        let commands: Vec<String> = changes
            .iter()
            .rev()
            .map(|c| self.render_change(&c.inverse()))
            .collect();
        join_commands(commands)
    }

    /// Render one change in its forward direction
    pub fn render_change(&mut self, change: &SchemaChange) -> String {
        match change {
            SchemaChange::AddTable(table) => self.render_add_table(table),
            SchemaChange::RemoveTable(table) => self.render_drop_table(table),
            SchemaChange::AddColumn { schema, table, column } => {
                self.render_add_column(schema.as_deref(), table, column)
            }
            SchemaChange::RemoveColumn { schema, table, column } => {
                self.render_drop_column(schema.as_deref(), table, column)
            }
            SchemaChange::ModifyColumn(modification) => self.render_alter_column(modification),
            SchemaChange::AddIndex { schema, table, index } => {
                self.render_create_index(schema.as_deref(), table, index)
            }
            SchemaChange::RemoveIndex { schema, table, index } => {
                self.render_drop_index(schema.as_deref(), table, index)
            }
            SchemaChange::AddConstraint { schema, table, constraint } => {
                self.render_create_unique(schema.as_deref(), table, constraint)
            }
            SchemaChange::RemoveConstraint { schema, table, constraint } => {
                self.render_drop_unique(schema.as_deref(), table, constraint)
            }
        }
    }

    pub fn render_add_table(&mut self, table: &Table) -> String {
        if let Some(rendered) = self.ctx.user_defined(RenderItem::Table(table)) {
            return rendered;
        }

        let mut args: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.render_column(column))
            .filter(|rendered| !rendered.is_empty())
            .collect();

        let mut constraints: Vec<String> = table_constraints(table)
            .into_iter()
            .filter_map(|constraint| self.render_constraint(constraint))
            .collect();
        constraints.sort();
        args.extend(constraints);

        let mut text = format!(
            "{}create_table({},\n{}",
            self.ctx.op_prefix,
            quote(&table.name),
            args.join(",\n")
        );
        if let Some(schema) = &table.schema {
            text.push_str(&format!(",\nschema={}", quote(schema)));
        }
        for (key, value) in &table.options {
            text.push_str(&format!(",\n{}={}", key.replace(' ', "_"), quote(value)));
        }
        text.push_str("\n)");
        text
    }

    pub fn render_drop_table(&mut self, table: &Table) -> String {
        let mut text = format!("{}drop_table({}", self.ctx.op_prefix, quote(&table.name));
        push_schema(&mut text, table.schema.as_deref());
        text.push(')');
        text
    }

    pub fn render_add_column(&mut self, schema: Option<&str>, table: &str, column: &Column) -> String {
        let mut text = format!(
            "{}add_column({}, {}",
            self.ctx.op_prefix,
            quote(table),
            self.render_column(column)
        );
        push_schema(&mut text, schema);
        text.push(')');
        text
    }

    pub fn render_drop_column(&mut self, schema: Option<&str>, table: &str, column: &Column) -> String {
        let mut text = format!(
            "{}drop_column({}, {}",
            self.ctx.op_prefix,
            quote(table),
            quote(&column.name)
        );
        push_schema(&mut text, schema);
        text.push(')');
        text
    }

    pub fn render_create_index(&mut self, schema: Option<&str>, table: &str, index: &Index) -> String {
        let mut text = format!(
            "{}create_index({}, {}, {}, unique={}",
            self.ctx.op_prefix,
            quote(&index.name),
            quote(table),
            quoted_list(&index.columns),
            boolean(index.unique)
        );
        push_schema(&mut text, schema);
        text.push(')');
        text
    }

    pub fn render_drop_index(&mut self, schema: Option<&str>, table: &str, index: &Index) -> String {
        let mut text = format!(
            "{}drop_index({}, {}",
            self.ctx.op_prefix,
            quote(&index.name),
            quote(table)
        );
        push_schema(&mut text, schema);
        text.push(')');
        text
    }

    pub fn render_create_unique(
        &mut self,
        schema: Option<&str>,
        table: &str,
        constraint: &UniqueConstraint,
    ) -> String {
        let mut text = format!(
            "{}create_unique_constraint({}, {}, {}",
            self.ctx.op_prefix,
            optional_name(constraint.name.as_deref()),
            quote(table),
            quoted_list(&constraint.columns)
        );
        push_schema(&mut text, schema);
        text.push(')');
        text
    }

    pub fn render_drop_unique(
        &mut self,
        schema: Option<&str>,
        table: &str,
        constraint: &UniqueConstraint,
    ) -> String {
        let mut text = format!(
            "{}drop_constraint({}, {}, type_='unique'",
            self.ctx.op_prefix,
            optional_name(constraint.name.as_deref()),
            quote(table)
        );
        push_schema(&mut text, schema);
        text.push(')');
        text
    }

    /// `alter_column` with one keyword per line
    pub fn render_alter_column(&mut self, modification: &ColumnModification) -> String {
        let existing = &modification.existing;
        let existing_type = modification
            .type_change
            .as_ref()
            .map(|change| &change.old)
            .unwrap_or(&existing.data_type);

        let mut text = format!(
            "{}alter_column({}, {}",
            self.ctx.op_prefix,
            quote(&modification.table),
            quote(&modification.column)
        );
        let keyword = |text: &mut String, name: &str, value: String| {
            text.push_str(&format!(",\n{}{}={}", ALTER_INDENT, name, value));
        };

        let existing_type = self.render_type(existing_type);
        keyword(&mut text, "existing_type", existing_type);
        if let Some(change) = &modification.default_change {
            keyword(
                &mut text,
                "server_default",
                render_server_default(self.ctx, change.new.as_ref()),
            );
        }
        if let Some(change) = &modification.type_change {
            let rendered = self.render_type(&change.new);
            keyword(&mut text, "type_", rendered);
        }
        match &modification.nullable_change {
            Some(change) => keyword(&mut text, "nullable", boolean(change.new).to_string()),
            None => keyword(
                &mut text,
                "existing_nullable",
                boolean(existing.nullable).to_string(),
            ),
        }
        if modification.default_change.is_none() {
            if let Some(default) = existing.server_default.as_ref().filter(|d| !d.is_empty()) {
                keyword(
                    &mut text,
                    "existing_server_default",
                    render_server_default(self.ctx, Some(default)),
                );
            }
        }
        if let Some(schema) = &modification.schema {
            keyword(&mut text, "schema", quote(schema));
        }
        text.push(')');
        text
    }

    /// `sa.Column('name', sa.Type(), ...)`
    pub fn render_column(&mut self, column: &Column) -> String {
        if let Some(rendered) = self.ctx.user_defined(RenderItem::Column(column)) {
            return rendered;
        }

        let mut opts = Vec::new();
        if column.server_default.is_some() {
            opts.push(format!(
                "server_default={}",
                render_server_default(self.ctx, column.server_default.as_ref())
            ));
        }
        if !column.autoincrement {
            opts.push("autoincrement=False".to_string());
        }
        opts.push(format!("nullable={}", boolean(column.nullable)));

        format!(
            "{}Column({}, {}, {})",
            self.ctx.model_prefix,
            quote(&column.name),
            self.render_type(&column.data_type),
            opts.join(", ")
        )
    }

    /// Dialect-specific types are qualified by their dialect module, which is recorded as an
    /// import; everything else takes the model prefix.
    pub fn render_type(&mut self, data_type: &SqlType) -> String {
        match data_type.dialect.and_then(Dialect::module_name) {
            Some(module) => {
                self.imports
                    .insert(format!("from sqlalchemy.dialects import {}", module));
                format!("{}.{}", module, data_type.repr())
            }
            None => format!("{}{}", self.ctx.model_prefix, data_type.repr()),
        }
    }

    /// `None` when the constraint is not rendered with its table
    pub fn render_constraint(&mut self, constraint: ConstraintRef<'_>) -> Option<String> {
        match constraint {
            ConstraintRef::PrimaryKey(pk) => self.render_primary_key(pk),
            ConstraintRef::ForeignKey(fk) => Some(self.render_foreign_key(fk)),
            ConstraintRef::Unique(unique) => Some(self.render_unique(unique)),
            ConstraintRef::Check(check) => self.render_check(check),
        }
    }

    fn render_primary_key(&self, pk: &PrimaryKey) -> Option<String> {
        if let Some(rendered) = self.ctx.user_defined(RenderItem::PrimaryKey(pk)) {
            return Some(rendered);
        }
        if pk.columns.is_empty() {
            return None;
        }
        let mut args: Vec<String> = pk.columns.iter().map(|c| quote(c)).collect();
        if let Some(name) = &pk.name {
            args.push(format!("name={}", quote(name)));
        }
        Some(format!("{}PrimaryKeyConstraint({})", self.ctx.model_prefix, args.join(", ")))
    }

    fn render_foreign_key(&self, fk: &ForeignKey) -> String {
        if let Some(rendered) = self.ctx.user_defined(RenderItem::ForeignKey(fk)) {
            return rendered;
        }

        let mut opts = Vec::new();
        if let Some(name) = &fk.name {
            opts.push(format!("name={}", quote(name)));
        }
        if let Some(action) = &fk.on_update {
            opts.push(format!("onupdate={}", quote(action)));
        }
        if let Some(action) = &fk.on_delete {
            opts.push(format!("ondelete={}", quote(action)));
        }
        if let Some(initially) = &fk.initially {
            opts.push(format!("initially={}", quote(initially)));
        }
        if let Some(deferrable) = fk.deferrable {
            opts.push(format!("deferrable={}", boolean(deferrable)));
        }

        let cols: Vec<String> = fk.columns.iter().map(|c| quote(c)).collect();
        let refcols: Vec<String> = fk
            .ref_columns
            .iter()
            .map(|spec| quote(&self.fk_colspec(spec)))
            .collect();
        format!(
            "{}ForeignKeyConstraint([{}], [{}], {})",
            self.ctx.model_prefix,
            cols.join(", "),
            refcols.join(", "),
            opts.join(", ")
        )
    }

    /// Two-token specs get the metadata schema prepended
    fn fk_colspec(&self, spec: &str) -> String {
        match &self.ctx.metadata_schema {
            Some(schema) if spec.split('.').count() == 2 => format!("{}.{}", schema, spec),
            _ => spec.to_string(),
        }
    }

    fn render_unique(&self, unique: &UniqueConstraint) -> String {
        if let Some(rendered) = self.ctx.user_defined(RenderItem::Unique(unique)) {
            return rendered;
        }
        let cols: Vec<String> = unique.columns.iter().map(|c| quote(c)).collect();
        let opts = match &unique.name {
            Some(name) => format!(", name={}", quote(name)),
            None => String::new(),
        };
        format!(
            "{}UniqueConstraint({}{})",
            self.ctx.model_prefix,
            cols.join(","),
            opts
        )
    }

    fn render_check(&self, check: &CheckConstraint) -> Option<String> {
        if let Some(rendered) = self.ctx.user_defined(RenderItem::Check(check)) {
            return Some(rendered);
        }
        // Type-generated checks are emitted with the column type.
        if check.type_bound {
            return None;
        }
        let mut args = vec![quote(&check.sql)];
        if let Some(name) = &check.name {
            args.push(format!("name={}", quote(name)));
        }
        Some(format!("{}CheckConstraint({})", self.ctx.model_prefix, args.join(", ")))
    }
}

/// Every table-level constraint rendered inside `create_table`
fn table_constraints(table: &Table) -> Vec<ConstraintRef<'_>> {
    let mut constraints = vec![ConstraintRef::PrimaryKey(&table.primary_key)];
    constraints.extend(table.foreign_keys.iter().map(ConstraintRef::ForeignKey));
    constraints.extend(table.unique_constraints.iter().map(ConstraintRef::Unique));
    constraints.extend(table.check_constraints.iter().map(ConstraintRef::Check));
    constraints
}

fn join_commands(commands: Vec<String>) -> String {
    if commands.is_empty() {
        "pass".to_string()
    } else {
        commands.join("\n")
    }
}

fn push_schema(text: &mut String, schema: Option<&str>) {
    if let Some(schema) = schema {
        text.push_str(&format!(", schema={}", quote(schema)));
    }
}

fn optional_name(name: Option<&str>) -> String {
    name.map(quote).unwrap_or_else(|| "None".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::diff::{Change, ExistingColumn};
    use crate::schema::types::SqlExpr;
    use pretty_assertions::assert_eq;

    fn ctx<'a>() -> RenderContext<'a> {
        RenderContext::new(Dialect::Sqlite)
    }

    #[test]
    fn renders_column_options() {
        let ctx = ctx();
        let mut generator = MigrationGenerator::new(&ctx);
        let column = Column::new("a1", SqlType::text())
            .server_default("'x'")
            .autoincrement(false)
            .nullable(false);
        assert_eq!(
            generator.render_column(&column),
            "sa.Column('a1', sa.Text(), server_default='x', autoincrement=False, nullable=False)"
        );
    }

    #[test]
    fn expression_defaults_compile_for_the_dialect() {
        let ctx = ctx();
        let default = ServerDefault::Expression(SqlExpr::now());
        assert_eq!(render_server_default(&ctx, Some(&default)), "'CURRENT_TIMESTAMP'");
        let pg = RenderContext::new(Dialect::Postgres);
        assert_eq!(render_server_default(&pg, Some(&default)), "'now()'");
        assert_eq!(render_server_default(&pg, None), "None");
    }

    #[test]
    fn dialect_types_record_imports() {
        let ctx = ctx();
        let mut generator = MigrationGenerator::new(&ctx);
        let column = Column::new("body", SqlType::medium_text());
        assert_eq!(
            generator.render_column(&column),
            "sa.Column('body', mysql.MEDIUMTEXT(), nullable=True)"
        );
        assert!(generator
            .imports()
            .contains("from sqlalchemy.dialects import mysql"));
    }

    #[test]
    fn renders_create_table_with_sorted_constraints() {
        let ctx = ctx();
        let mut generator = MigrationGenerator::new(&ctx);
        let table = Table::new("item")
            .column(Column::new("id", SqlType::integer()).primary_key())
            .column(Column::new("order_id", SqlType::integer()))
            .foreign_key(ForeignKey::new(&["order_id"], &["order.order_id"]))
            .check(CheckConstraint::new(Some("ck_positive"), "id > 0"))
            .option("mysql_engine", "InnoDB");
        assert_eq!(
            generator.render_add_table(&table),
            "op.create_table('item',\n\
             sa.Column('id', sa.Integer(), nullable=False),\n\
             sa.Column('order_id', sa.Integer(), nullable=True),\n\
             sa.CheckConstraint('id > 0', name='ck_positive'),\n\
             sa.ForeignKeyConstraint(['order_id'], ['order.order_id'], ),\n\
             sa.PrimaryKeyConstraint('id'),\n\
             mysql_engine='InnoDB'\n\
             )"
        );
    }

    #[test]
    fn foreign_keys_take_the_metadata_schema() {
        let mut ctx = ctx();
        ctx.metadata_schema = Some("app".to_string());
        let generator = MigrationGenerator::new(&ctx);
        let fk = ForeignKey::new(&["uid"], &["user.id"]).name("fk_uid").on_delete("CASCADE");
        assert_eq!(
            generator.render_foreign_key(&fk),
            "sa.ForeignKeyConstraint(['uid'], ['app.user.id'], name='fk_uid', ondelete='CASCADE')"
        );
    }

    #[test]
    fn type_bound_checks_are_not_rendered() {
        let ctx = ctx();
        let mut generator = MigrationGenerator::new(&ctx);
        let mut check = CheckConstraint::new(None, "flag IN (0, 1)");
        check.type_bound = true;
        assert_eq!(generator.render_constraint(ConstraintRef::Check(&check)), None);
    }

    #[test]
    fn alter_column_lists_keywords_in_order() {
        let ctx = ctx();
        let mut generator = MigrationGenerator::new(&ctx);
        let modification = ColumnModification {
            schema: None,
            table: "user".to_string(),
            column: "name".to_string(),
            type_change: None,
            nullable_change: Some(Change::new(true, false)),
            default_change: None,
            existing: ExistingColumn {
                data_type: SqlType::parse("VARCHAR(50)").unwrap(),
                nullable: true,
                server_default: Some(ServerDefault::Text("'anon'".to_string())),
            },
        };
        assert_eq!(
            generator.render_alter_column(&modification),
            "op.alter_column('user', 'name',\n\
             \x20          existing_type=sa.VARCHAR(length=50),\n\
             \x20          nullable=False,\n\
             \x20          existing_server_default='anon')"
        );
    }

    #[test]
    fn render_override_is_consulted_first() {
        fn hook(item: &RenderItem<'_>, _: &RenderContext<'_>) -> Option<String> {
            match item {
                RenderItem::Column(column) if column.name == "secret" => {
                    Some("custom.Secret()".to_string())
                }
                _ => None,
            }
        }
        let mut ctx = ctx();
        ctx.render_item = Some(&hook);
        let mut generator = MigrationGenerator::new(&ctx);
        assert_eq!(
            generator.render_column(&Column::new("secret", SqlType::text())),
            "custom.Secret()"
        );
        assert_eq!(
            generator.render_column(&Column::new("plain", SqlType::text())),
            "sa.Column('plain', sa.Text(), nullable=True)"
        );
    }

    #[test]
    fn empty_change_list_renders_pass() {
        let diffs = produce_migration_diffs(&ctx(), &[]);
        assert_eq!(
            diffs.upgrades,
            "### commands auto generated by schema_autogen - please adjust! ###\n    pass\n    ### end schema_autogen commands ###"
        );
        assert_eq!(diffs.upgrades, diffs.downgrades);
        assert!(diffs.imports.is_empty());
    }
}
