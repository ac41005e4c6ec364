//! Schema module for schema_autogen
//!
//! This module holds the schema model, live-schema reflection, comparison and rendering.

pub mod analyzer;
pub mod compare;
pub mod dependency;
pub mod diff;
pub mod filter;
pub mod generator;
pub mod inspector;
pub mod sqltype;
pub mod types;

pub use analyzer::SchemaAnalyzer;
pub use compare::CompareOptions;
pub use diff::{Change, ColumnModification, ExistingColumn, SchemaChange, SchemaDiff};
pub use filter::{ObjectKind, SchemaObject};
pub use generator::{MigrationDiffs, MigrationGenerator, RenderContext, RenderItem};
pub use inspector::{Inspector, ReflectedColumn, ReflectedSchema, ReflectedTable};
pub use sqltype::{Dialect, SqlType, TypeKind};
pub use types::{
    CheckConstraint, Column, ForeignKey, Index, MetaData, PrimaryKey, ServerDefault, SqlExpr,
    Table, TableKey, UniqueConstraint,
};
