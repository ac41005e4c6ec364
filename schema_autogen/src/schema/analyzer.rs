//! Database schema analyzer
//!
//! This module reads the live structure of a database through sqlx and captures it as a
//! [`ReflectedSchema`] snapshot. The diff engine only ever sees the snapshot, so every query
//! runs before comparison starts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{FromRow, MySql, Pool, Postgres, Row, Sqlite};
use tracing::{debug, warn};

use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};
use crate::schema::inspector::{ReflectedColumn, ReflectedSchema, ReflectedTable, ReflectedUnique};
use crate::schema::sqltype::SqlType;
use crate::schema::types::{ForeignKey, Index, PrimaryKey};

static SQLITE_NAMED_UNIQUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)CONSTRAINT\s+["`\[]?(\w+)["`\]]?\s+UNIQUE\s*\(([^)]+)\)"#)
        .expect("valid unique constraint regex")
});

/// Schema analyzer trait, implemented once per backend
#[async_trait]
pub trait Analyzer {
    /// Name of the schema tables live in when none is given
    async fn default_schema(&self) -> Result<Option<String>>;

    /// All schema names visible on the connection
    async fn schema_names(&self) -> Result<Vec<String>>;

    /// Reflect every table of `schema` (`None` is the default schema)
    async fn analyze_tables(&self, schema: Option<&str>) -> Result<BTreeMap<String, ReflectedTable>>;
}

/// Schema analyzer for database schema introspection
pub struct SchemaAnalyzer {
    connection: DatabaseConnection,
    schema: Option<String>,
}

impl SchemaAnalyzer {
    /// Create a new schema analyzer; `schema` overrides the connection's default schema
    pub fn new(connection: DatabaseConnection, schema: Option<String>) -> Self {
        Self { connection, schema }
    }

    /// Snapshot the live database
    pub async fn analyze(&self, include_schemas: bool) -> Result<ReflectedSchema> {
        match &self.connection {
            DatabaseConnection::Postgres(pool) => {
                let analyzer = PostgresAnalyzer {
                    pool,
                    schema: self.schema.as_deref(),
                };
                snapshot(&analyzer, include_schemas).await
            }
            DatabaseConnection::MySql(pool) => {
                let analyzer = MySqlAnalyzer {
                    pool,
                    schema: self.schema.as_deref(),
                };
                snapshot(&analyzer, include_schemas).await
            }
            DatabaseConnection::Sqlite(pool) => snapshot(&SqliteAnalyzer { pool }, include_schemas).await,
        }
    }
}

async fn snapshot(analyzer: &(dyn Analyzer + Sync), include_schemas: bool) -> Result<ReflectedSchema> {
    let default_schema = analyzer.default_schema().await?;
    let mut reflected = ReflectedSchema::new(default_schema.as_deref());

    for (name, table) in analyzer.analyze_tables(None).await? {
        reflected.insert(None, &name, table);
    }

    if include_schemas {
        for schema in analyzer.schema_names().await? {
            if schema == "information_schema" || Some(&schema) == default_schema.as_ref() {
                continue;
            }
            for (name, table) in analyzer.analyze_tables(Some(&schema)).await? {
                reflected.insert(Some(&schema), &name, table);
            }
        }
    }

    debug!(
        schemas = reflected.schemas.len(),
        default_schema = ?reflected.default_schema,
        "Captured live schema snapshot"
    );
    Ok(reflected)
}

/// Resolve a reflected type name; unknown spellings are kept as untyped
fn reflected_type(raw: &str) -> SqlType {
    match SqlType::parse(raw) {
        Ok(parsed) => parsed.sql_spelling(),
        Err(e) => {
            warn!(type_name = raw, error = %e, "Couldn't parse reflected type");
            SqlType::null()
        }
    }
}

/// `table.column` within the same schema, `schema.table.column` otherwise
fn ref_colspec(own_schema: Option<&str>, ref_schema: Option<&str>, table: &str, column: &str) -> String {
    match ref_schema {
        Some(schema) if Some(schema) != own_schema => format!("{}.{}.{}", schema, table, column),
        _ => format!("{}.{}", table, column),
    }
}

fn referential_action(rule: Option<String>) -> Option<String> {
    rule.filter(|r| !r.eq_ignore_ascii_case("NO ACTION"))
}

fn group_foreign_key(foreign_keys: &mut BTreeMap<String, ForeignKey>, row: ForeignKeyRow, colspec: String) {
    let fk = foreign_keys
        .entry(row.constraint_name.clone())
        .or_insert_with(|| ForeignKey {
            name: Some(row.constraint_name.clone()),
            columns: Vec::new(),
            ref_columns: Vec::new(),
            on_update: referential_action(row.update_rule.clone()),
            on_delete: referential_action(row.delete_rule.clone()),
            initially: None,
            deferrable: None,
        });
    if !fk.columns.contains(&row.column_name) {
        fk.columns.push(row.column_name);
        fk.ref_columns.push(colspec);
    }
}

// Row types shared by the information_schema backends
#[derive(FromRow)]
struct NameRow {
    name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: String,
    column_default: Option<String>,
    character_maximum_length: Option<i64>,
    numeric_precision: Option<i64>,
    numeric_scale: Option<i64>,
    extra: Option<String>,
}

#[derive(FromRow)]
struct KeyColumnRow {
    constraint_name: String,
    column_name: String,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    column_name: String,
    is_unique: i64,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    column_name: String,
    ref_schema: Option<String>,
    ref_table: String,
    ref_column: String,
    delete_rule: Option<String>,
    update_rule: Option<String>,
}

fn information_schema_column(col: ColumnRow, mysql: bool) -> ReflectedColumn {
    let upper = col.data_type.to_uppercase();
    let type_name = match (upper.as_str(), col.character_maximum_length) {
        ("CHARACTER VARYING" | "VARCHAR", Some(length)) => format!("VARCHAR({})", length),
        ("CHARACTER" | "CHAR", Some(length)) => format!("CHAR({})", length),
        ("NUMERIC" | "DECIMAL", _) => match (col.numeric_precision, col.numeric_scale) {
            (Some(p), Some(s)) => format!("NUMERIC({}, {})", p, s),
            _ => "NUMERIC".to_string(),
        },
        _ => col.data_type.clone(),
    };
    let autoincrement = if mysql {
        col.extra
            .as_deref()
            .map(|e| e.to_lowercase().contains("auto_increment"))
            .unwrap_or(false)
    } else {
        col.column_default
            .as_deref()
            .map(|d| d.starts_with("nextval("))
            .unwrap_or(false)
    };

    ReflectedColumn {
        name: col.column_name,
        data_type: reflected_type(&type_name),
        nullable: col.is_nullable == "YES",
        default: col.column_default,
        autoincrement,
    }
}

/// PostgreSQL schema analyzer
struct PostgresAnalyzer<'a> {
    pool: &'a Pool<Postgres>,
    schema: Option<&'a str>,
}

impl PostgresAnalyzer<'_> {
    async fn resolve_schema(&self, schema: Option<&str>) -> Result<String> {
        match schema.or(self.schema) {
            Some(schema) => Ok(schema.to_string()),
            None => Ok(sqlx::query_scalar::<_, String>("SELECT current_schema()")
                .fetch_one(self.pool)
                .await?),
        }
    }

    async fn analyze_table(&self, schema: &str, table_name: &str, own_schema: Option<&str>) -> Result<ReflectedTable> {
        let mut table = ReflectedTable::new();

        let sql = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                character_maximum_length::bigint AS character_maximum_length,
                numeric_precision::bigint AS numeric_precision,
                numeric_scale::bigint AS numeric_scale,
                NULL::text AS extra
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;
        let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(schema)
            .bind(table_name)
            .fetch_all(self.pool)
            .await?;
        table.columns = column_rows
            .into_iter()
            .map(|col| information_schema_column(col, false))
            .collect();

        let sql = r#"
            SELECT
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = $3
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY tc.constraint_name, kcu.ordinal_position
        "#;
        let pk_rows = sqlx::query_as::<_, KeyColumnRow>(sql)
            .bind(schema)
            .bind(table_name)
            .bind("PRIMARY KEY")
            .fetch_all(self.pool)
            .await?;
        if let Some(first) = pk_rows.first() {
            table.primary_key = Some(PrimaryKey {
                name: Some(first.constraint_name.clone()),
                columns: pk_rows.iter().map(|r| r.column_name.clone()).collect(),
            });
        }

        let unique_rows = sqlx::query_as::<_, KeyColumnRow>(sql)
            .bind(schema)
            .bind(table_name)
            .bind("UNIQUE")
            .fetch_all(self.pool)
            .await?;
        table.unique_constraints = Some(group_uniques(unique_rows));

        let sql = r#"
            SELECT
                i.relname::text AS index_name,
                a.attname::text AS column_name,
                (CASE WHEN ix.indisunique THEN 1 ELSE 0 END)::bigint AS is_unique
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE t.relname = $1
                AND n.nspname = $2
                AND NOT ix.indisprimary
            ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)
        "#;
        let index_rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(table_name)
            .bind(schema)
            .fetch_all(self.pool)
            .await?;
        table.indexes = group_indexes(index_rows);

        let sql = r#"
            SELECT
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name,
                ccu.table_schema::text AS ref_schema,
                ccu.table_name::text AS ref_table,
                ccu.column_name::text AS ref_column,
                rc.delete_rule::text AS delete_rule,
                rc.update_rule::text AS update_rule
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.constraint_schema = tc.table_schema
            JOIN information_schema.referential_constraints rc
                ON tc.constraint_name = rc.constraint_name
                AND tc.table_schema = rc.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY tc.constraint_name, kcu.ordinal_position
        "#;
        let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(schema)
            .bind(table_name)
            .fetch_all(self.pool)
            .await?;
        let mut foreign_keys = BTreeMap::new();
        for row in fk_rows {
            let own = own_schema.unwrap_or(schema);
            let colspec = ref_colspec(Some(own), row.ref_schema.as_deref(), &row.ref_table, &row.ref_column);
            group_foreign_key(&mut foreign_keys, row, colspec);
        }
        table.foreign_keys = foreign_keys.into_values().collect();

        Ok(table)
    }
}

#[async_trait]
impl Analyzer for PostgresAnalyzer<'_> {
    async fn default_schema(&self) -> Result<Option<String>> {
        Ok(Some(self.resolve_schema(None).await?))
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT schema_name::text AS name
            FROM information_schema.schemata
            WHERE schema_name NOT LIKE 'pg_%'
            ORDER BY schema_name
        "#;
        let rows = sqlx::query_as::<_, NameRow>(sql).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn analyze_tables(&self, schema: Option<&str>) -> Result<BTreeMap<String, ReflectedTable>> {
        let resolved = self.resolve_schema(schema).await?;
        let sql = r#"
            SELECT table_name::text AS name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
        "#;
        let table_rows = sqlx::query_as::<_, NameRow>(sql)
            .bind(&resolved)
            .fetch_all(self.pool)
            .await?;

        let mut tables = BTreeMap::new();
        for row in table_rows {
            let table = self.analyze_table(&resolved, &row.name, schema).await?;
            tables.insert(row.name, table);
        }
        Ok(tables)
    }
}

/// MySQL schema analyzer
struct MySqlAnalyzer<'a> {
    pool: &'a Pool<MySql>,
    schema: Option<&'a str>,
}

impl MySqlAnalyzer<'_> {
    async fn resolve_schema(&self, schema: Option<&str>) -> Result<String> {
        match schema.or(self.schema) {
            Some(schema) => Ok(schema.to_string()),
            None => {
                let current: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
                    .fetch_one(self.pool)
                    .await?;
                current.ok_or_else(|| {
                    Error::SchemaAnalysisError(
                        "No database selected; set database.schema or name one in the URL".to_string(),
                    )
                })
            }
        }
    }

    async fn analyze_table(&self, schema: &str, table_name: &str, own_schema: Option<&str>) -> Result<ReflectedTable> {
        let mut table = ReflectedTable::new();

        let sql = r#"
            SELECT
                column_name AS column_name,
                column_type AS data_type,
                is_nullable AS is_nullable,
                column_default AS column_default,
                NULL AS character_maximum_length,
                NULL AS numeric_precision,
                NULL AS numeric_scale,
                extra AS extra
            FROM information_schema.columns
            WHERE table_schema = ? AND table_name = ?
            ORDER BY ordinal_position
        "#;
        let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(schema)
            .bind(table_name)
            .fetch_all(self.pool)
            .await?;
        table.columns = column_rows
            .into_iter()
            .map(|col| information_schema_column(col, true))
            .collect();

        let sql = r#"
            SELECT k.constraint_name AS constraint_name, k.column_name AS column_name
            FROM information_schema.table_constraints t
            JOIN information_schema.key_column_usage k
                ON t.constraint_name = k.constraint_name
                AND t.table_schema = k.table_schema
                AND t.table_name = k.table_name
            WHERE t.table_schema = ? AND t.table_name = ?
                AND t.constraint_type = ?
            ORDER BY k.constraint_name, k.ordinal_position
        "#;
        let pk_rows = sqlx::query_as::<_, KeyColumnRow>(sql)
            .bind(schema)
            .bind(table_name)
            .bind("PRIMARY KEY")
            .fetch_all(self.pool)
            .await?;
        if let Some(first) = pk_rows.first() {
            table.primary_key = Some(PrimaryKey {
                name: Some(first.constraint_name.clone()),
                columns: pk_rows.iter().map(|r| r.column_name.clone()).collect(),
            });
        }

        let unique_rows = sqlx::query_as::<_, KeyColumnRow>(sql)
            .bind(schema)
            .bind(table_name)
            .bind("UNIQUE")
            .fetch_all(self.pool)
            .await?;
        table.unique_constraints = Some(group_uniques(unique_rows));

        let sql = r#"
            SELECT
                index_name AS index_name,
                column_name AS column_name,
                CAST(non_unique = 0 AS SIGNED) AS is_unique
            FROM information_schema.statistics
            WHERE table_schema = ? AND table_name = ? AND index_name <> 'PRIMARY'
            ORDER BY index_name, seq_in_index
        "#;
        let index_rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(schema)
            .bind(table_name)
            .fetch_all(self.pool)
            .await?;
        table.indexes = group_indexes(index_rows);

        let sql = r#"
            SELECT
                kcu.constraint_name AS constraint_name,
                kcu.column_name AS column_name,
                kcu.referenced_table_schema AS ref_schema,
                kcu.referenced_table_name AS ref_table,
                kcu.referenced_column_name AS ref_column,
                rc.delete_rule AS delete_rule,
                rc.update_rule AS update_rule
            FROM information_schema.key_column_usage kcu
            JOIN information_schema.referential_constraints rc
                ON rc.constraint_name = kcu.constraint_name
                AND rc.constraint_schema = kcu.table_schema
            WHERE kcu.table_schema = ? AND kcu.table_name = ?
                AND kcu.referenced_table_name IS NOT NULL
            ORDER BY kcu.constraint_name, kcu.ordinal_position
        "#;
        let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(schema)
            .bind(table_name)
            .fetch_all(self.pool)
            .await?;
        let mut foreign_keys = BTreeMap::new();
        for row in fk_rows {
            let own = own_schema.unwrap_or(schema);
            let colspec = ref_colspec(Some(own), row.ref_schema.as_deref(), &row.ref_table, &row.ref_column);
            group_foreign_key(&mut foreign_keys, row, colspec);
        }
        table.foreign_keys = foreign_keys.into_values().collect();

        Ok(table)
    }
}

#[async_trait]
impl Analyzer for MySqlAnalyzer<'_> {
    async fn default_schema(&self) -> Result<Option<String>> {
        Ok(Some(self.resolve_schema(None).await?))
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT schema_name AS name
            FROM information_schema.schemata
            WHERE schema_name NOT IN ('mysql', 'performance_schema', 'sys')
            ORDER BY schema_name
        "#;
        let rows = sqlx::query_as::<_, NameRow>(sql).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn analyze_tables(&self, schema: Option<&str>) -> Result<BTreeMap<String, ReflectedTable>> {
        let resolved = self.resolve_schema(schema).await?;
        let sql = r#"
            SELECT table_name AS name
            FROM information_schema.tables
            WHERE table_schema = ? AND table_type = 'BASE TABLE'
        "#;
        let table_rows = sqlx::query_as::<_, NameRow>(sql)
            .bind(&resolved)
            .fetch_all(self.pool)
            .await?;

        let mut tables = BTreeMap::new();
        for row in table_rows {
            let table = self.analyze_table(&resolved, &row.name, schema).await?;
            tables.insert(row.name, table);
        }
        Ok(tables)
    }
}

fn group_uniques(rows: Vec<KeyColumnRow>) -> Vec<ReflectedUnique> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.constraint_name).or_default().push(row.column_name);
    }
    grouped
        .into_iter()
        .map(|(name, columns)| ReflectedUnique {
            name: Some(name),
            columns,
        })
        .collect()
}

fn group_indexes(rows: Vec<IndexRow>) -> Vec<Index> {
    let mut grouped: BTreeMap<String, Index> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.index_name.clone())
            .or_insert_with(|| Index {
                name: row.index_name.clone(),
                columns: Vec::new(),
                unique: row.is_unique != 0,
            })
            .columns
            .push(row.column_name);
    }
    grouped.into_values().collect()
}

/// SQLite schema analyzer
struct SqliteAnalyzer<'a> {
    pool: &'a Pool<Sqlite>,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn pragma(schema: Option<&str>, name: &str, arg: &str) -> String {
    match schema {
        Some(schema) => format!("PRAGMA {}.{}({})", quote_ident(schema), name, quote_ident(arg)),
        None => format!("PRAGMA {}({})", name, quote_ident(arg)),
    }
}

impl SqliteAnalyzer<'_> {
    async fn analyze_table(&self, schema: Option<&str>, table_name: &str, create_sql: &str) -> Result<ReflectedTable> {
        let mut table = ReflectedTable::new();

        let columns = sqlx::query(&pragma(schema, "table_info", table_name))
            .fetch_all(self.pool)
            .await?;
        let mut pk_columns: Vec<(i64, String)> = Vec::new();
        for col in columns {
            let name: String = col.try_get("name")?;
            let data_type: String = col.try_get("type")?;
            let notnull: i64 = col.try_get("notnull")?;
            let dflt_value: Option<String> = col.try_get("dflt_value")?;
            let pk: i64 = col.try_get("pk")?;

            if pk > 0 {
                pk_columns.push((pk, name.clone()));
            }
            table.columns.push(ReflectedColumn {
                name,
                data_type: reflected_type(&data_type),
                nullable: notnull == 0 && pk == 0,
                default: dflt_value,
                autoincrement: true,
            });
        }
        if !pk_columns.is_empty() {
            pk_columns.sort();
            table.primary_key = Some(PrimaryKey {
                name: None,
                columns: pk_columns.into_iter().map(|(_, name)| name).collect(),
            });
        }

        let index_list = sqlx::query(&pragma(schema, "index_list", table_name))
            .fetch_all(self.pool)
            .await?;
        for row in index_list {
            let origin: String = row.try_get("origin")?;
            // Only explicitly created indexes; `u`/`pk` back constraints
            if origin != "c" {
                continue;
            }
            let name: String = row.try_get("name")?;
            let unique: i64 = row.try_get("unique")?;
            let info = sqlx::query(&pragma(schema, "index_info", &name))
                .fetch_all(self.pool)
                .await?;
            let mut columns: Vec<(i64, String)> = Vec::new();
            for column in info {
                let seqno: i64 = column.try_get("seqno")?;
                let column_name: Option<String> = column.try_get("name")?;
                if let Some(column_name) = column_name {
                    columns.push((seqno, column_name));
                }
            }
            columns.sort();
            table.indexes.push(Index {
                name,
                columns: columns.into_iter().map(|(_, c)| c).collect(),
                unique: unique != 0,
            });
        }

        table.unique_constraints = Some(
            SQLITE_NAMED_UNIQUE
                .captures_iter(create_sql)
                .map(|caps| ReflectedUnique {
                    name: Some(caps[1].to_string()),
                    columns: caps[2]
                        .split(',')
                        .map(|c| c.trim().trim_matches(|ch| ch == '"' || ch == '`' || ch == '[' || ch == ']').to_string())
                        .collect(),
                })
                .collect(),
        );

        let fk_rows = sqlx::query(&pragma(schema, "foreign_key_list", table_name))
            .fetch_all(self.pool)
            .await?;
        let mut foreign_keys: BTreeMap<i64, ForeignKey> = BTreeMap::new();
        for row in fk_rows {
            let id: i64 = row.try_get("id")?;
            let ref_table: String = row.try_get("table")?;
            let from: String = row.try_get("from")?;
            let to: Option<String> = row.try_get("to")?;
            let on_update: Option<String> = row.try_get("on_update")?;
            let on_delete: Option<String> = row.try_get("on_delete")?;

            let to = match to {
                Some(to) => to,
                None => self.first_pk_column(schema, &ref_table).await?,
            };
            let fk = foreign_keys.entry(id).or_insert_with(|| ForeignKey {
                name: None,
                columns: Vec::new(),
                ref_columns: Vec::new(),
                on_update: referential_action(on_update),
                on_delete: referential_action(on_delete),
                initially: None,
                deferrable: None,
            });
            fk.columns.push(from);
            fk.ref_columns.push(format!("{}.{}", ref_table, to));
        }
        table.foreign_keys = foreign_keys.into_values().collect();

        Ok(table)
    }

    /// Column an implicit foreign key reference points at
    async fn first_pk_column(&self, schema: Option<&str>, table_name: &str) -> Result<String> {
        let columns = sqlx::query(&pragma(schema, "table_info", table_name))
            .fetch_all(self.pool)
            .await?;
        for col in columns {
            let pk: i64 = col.try_get("pk")?;
            if pk == 1 {
                return Ok(col.try_get("name")?);
            }
        }
        Ok("rowid".to_string())
    }
}

#[async_trait]
impl Analyzer for SqliteAnalyzer<'_> {
    async fn default_schema(&self) -> Result<Option<String>> {
        Ok(Some("main".to_string()))
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("PRAGMA database_list").fetch_all(self.pool).await?;
        rows.into_iter()
            .map(|row| Ok(row.try_get::<String, _>("name")?))
            .collect()
    }

    async fn analyze_tables(&self, schema: Option<&str>) -> Result<BTreeMap<String, ReflectedTable>> {
        let master = match schema {
            Some(schema) => format!("{}.sqlite_master", quote_ident(schema)),
            None => "sqlite_master".to_string(),
        };
        let sql = format!(
            "SELECT name, sql FROM {} WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            master
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool).await?;

        let mut tables = BTreeMap::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let create_sql: Option<String> = row.try_get("sql")?;
            let table = self
                .analyze_table(schema, &name, create_sql.as_deref().unwrap_or_default())
                .await?;
            tables.insert(name, table);
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::schema::inspector::Inspector;
    use crate::schema::sqltype::TypeKind;

    async fn sqlite_memory() -> DatabaseConnection {
        let config = DatabaseConfig {
            driver: "sqlite".to_string(),
            url: "sqlite::memory:".to_string(),
            pool_size: Some(1),
            timeout_seconds: Some(5),
            schema: None,
        };
        DatabaseConnection::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn sqlite_snapshot_captures_structure() {
        let connection = sqlite_memory().await;
        for statement in [
            "CREATE TABLE user (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL, a1 TEXT DEFAULT 'x', CONSTRAINT uq_user_name UNIQUE (name))",
            "CREATE TABLE \"order\" (order_id INTEGER PRIMARY KEY, amount NUMERIC(8, 2), user_id INTEGER REFERENCES user(id) ON DELETE CASCADE)",
            "CREATE INDEX ix_order_amount ON \"order\" (amount, user_id)",
        ] {
            let DatabaseConnection::Sqlite(pool) = &connection else {
                unreachable!("sqlite url");
            };
            sqlx::query(statement).execute(pool).await.unwrap();
        }

        let snapshot = SchemaAnalyzer::new(connection, None).analyze(false).await.unwrap();
        assert_eq!(snapshot.default_schema_name(), Some("main"));
        assert_eq!(
            snapshot.table_names(None).unwrap().into_iter().collect::<Vec<_>>(),
            vec!["order".to_string(), "user".to_string()]
        );

        let columns = snapshot.columns("user", None).unwrap();
        assert_eq!(columns[1].data_type.repr(), "VARCHAR(length=50)");
        assert!(!columns[1].nullable);
        assert_eq!(columns[2].default.as_deref(), Some("'x'"));
        assert!(!columns[0].nullable);

        let uniques = snapshot.unique_constraints("user", None).unwrap();
        assert_eq!(uniques[0].name.as_deref(), Some("uq_user_name"));
        assert_eq!(uniques[0].columns, vec!["name".to_string()]);

        let amount = &snapshot.columns("order", None).unwrap()[1];
        assert_eq!(
            amount.data_type.kind,
            TypeKind::Numeric {
                precision: Some(8),
                scale: Some(2)
            }
        );

        let indexes = snapshot.indexes("order", None).unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].columns, vec!["amount".to_string(), "user_id".to_string()]);

        let fks = snapshot.foreign_keys("order", None).unwrap();
        assert_eq!(fks[0].ref_columns, vec!["user.id".to_string()]);
        assert_eq!(fks[0].on_delete.as_deref(), Some("CASCADE"));
        assert_eq!(
            snapshot.primary_key("order", None).unwrap().unwrap().columns,
            vec!["order_id".to_string()]
        );
    }

    #[test]
    fn colspecs_name_foreign_schemas_only() {
        assert_eq!(ref_colspec(Some("public"), Some("public"), "user", "id"), "user.id");
        assert_eq!(ref_colspec(Some("public"), Some("audit"), "log", "id"), "audit.log.id");
        assert_eq!(ref_colspec(None, None, "user", "id"), "user.id");
    }

    #[test]
    fn unparseable_types_become_untyped() {
        assert_eq!(reflected_type("(10)").kind, TypeKind::Null);
        assert_eq!(reflected_type("Text").class_name(), "TEXT");
    }
}
