//! Object filters consulted before any schema object is diffed

use std::fmt;

use crate::schema::types::{Column, Index, Table, UniqueConstraint};

/// Kind of schema object handed to a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    UniqueConstraint,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Table => "table",
            ObjectKind::Column => "column",
            ObjectKind::Index => "index",
            ObjectKind::UniqueConstraint => "unique_constraint",
        })
    }
}

/// Borrowed schema object
#[derive(Debug, Clone, Copy)]
pub enum SchemaObject<'a> {
    Table(&'a Table),
    Column(&'a Column),
    Index(&'a Index),
    UniqueConstraint(&'a UniqueConstraint),
}

impl SchemaObject<'_> {
    pub fn kind(&self) -> ObjectKind {
        match self {
            SchemaObject::Table(_) => ObjectKind::Table,
            SchemaObject::Column(_) => ObjectKind::Column,
            SchemaObject::Index(_) => ObjectKind::Index,
            SchemaObject::UniqueConstraint(_) => ObjectKind::UniqueConstraint,
        }
    }
}

/// `(object, name, kind, is_reflected, counterpart) -> accept`
///
/// `is_reflected` is true when the object comes from the live database; `counterpart` is the
/// object on the other side when both sides have it.
pub type ObjectFilter =
    Box<dyn Fn(SchemaObject<'_>, &str, ObjectKind, bool, Option<SchemaObject<'_>>) -> bool>;

/// `(table_name, schema) -> accept`, applied to table identities on both sides
pub type IncludeSymbol = Box<dyn Fn(&str, Option<&str>) -> bool>;

/// Box a closure as an [`ObjectFilter`]
pub fn object_filter<F>(filter: F) -> ObjectFilter
where
    F: Fn(SchemaObject<'_>, &str, ObjectKind, bool, Option<SchemaObject<'_>>) -> bool + 'static,
{
    Box::new(filter)
}

/// An object is diffed only if every filter accepts it
pub fn run_filters(
    filters: &[ObjectFilter],
    object: SchemaObject<'_>,
    name: &str,
    is_reflected: bool,
    counterpart: Option<SchemaObject<'_>>,
) -> bool {
    let kind = object.kind();
    filters
        .iter()
        .all(|filter| filter(object, name, kind, is_reflected, counterpart))
}
