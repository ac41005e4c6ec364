//! Column type descriptors
//!
//! A [`SqlType`] is resolved once into a closed [`TypeKind`] when it is constructed or parsed,
//! so comparison and rendering never re-derive the category from a type name.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_ ]*?)?\s*(?:\((.*)\))?\s*$").expect("valid type regex")
});

/// Target database dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Generic,
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    /// Resolve a dialect from a configured driver name
    pub fn from_driver(driver: &str) -> Result<Self> {
        match driver.to_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "generic" | "default" => Ok(Dialect::Generic),
            other => Err(Error::ConfigError(format!(
                "Unsupported database driver: {}",
                other
            ))),
        }
    }

    /// Module name used to qualify dialect-specific types in rendered text
    pub fn module_name(self) -> Option<&'static str> {
        match self {
            Dialect::Generic => None,
            Dialect::Sqlite => Some("sqlite"),
            Dialect::Postgres => Some("postgresql"),
            Dialect::MySql => Some("mysql"),
        }
    }
}

/// Closed set of type categories understood by the comparator and renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Integer,
    SmallInteger,
    BigInteger,
    Numeric {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Float {
        precision: Option<u32>,
    },
    String {
        length: Option<u32>,
    },
    Char {
        length: Option<u32>,
    },
    Text,
    MediumText,
    Boolean,
    Date,
    DateTime,
    Time,
    Timestamp,
    LargeBinary,
    Pickle,
    /// Untyped: the affinity cannot be determined
    Null,
    /// A type outside the known categories, kept verbatim
    Named {
        name: String,
        args: Option<String>,
    },
}

/// How a type is spelled when rendered.
///
/// Declared types use the generic model spelling (`Integer`, `String`), reflected types use the
/// SQL spelling the database reports (`INTEGER`, `VARCHAR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spelling {
    #[default]
    Generic,
    Sql,
}

/// Storage affinity of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Numeric,
    String,
    Boolean,
    Temporal,
    Binary,
    Null,
    Other,
}

/// A column type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlType {
    #[serde(flatten)]
    pub kind: TypeKind,
    #[serde(default)]
    pub spelling: Spelling,
    /// Set when the type only exists on one dialect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    /// Type used in place of this one on a given dialect
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<Dialect, SqlType>,
}

impl SqlType {
    /// Create a type with the generic model spelling
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            spelling: Spelling::Generic,
            dialect: None,
            variants: BTreeMap::new(),
        }
    }

    /// Create a type with the SQL spelling reported by reflection
    pub fn reflected(kind: TypeKind) -> Self {
        Self {
            spelling: Spelling::Sql,
            ..Self::new(kind)
        }
    }

    pub fn integer() -> Self {
        Self::new(TypeKind::Integer)
    }

    pub fn big_integer() -> Self {
        Self::new(TypeKind::BigInteger)
    }

    pub fn small_integer() -> Self {
        Self::new(TypeKind::SmallInteger)
    }

    pub fn numeric(precision: u32, scale: u32) -> Self {
        Self::new(TypeKind::Numeric {
            precision: Some(precision),
            scale: Some(scale),
        })
    }

    pub fn float() -> Self {
        Self::new(TypeKind::Float { precision: None })
    }

    pub fn string(length: Option<u32>) -> Self {
        Self::new(TypeKind::String { length })
    }

    pub fn char(length: Option<u32>) -> Self {
        Self::new(TypeKind::Char { length })
    }

    pub fn text() -> Self {
        Self::new(TypeKind::Text)
    }

    /// MySQL's `MEDIUMTEXT`
    pub fn medium_text() -> Self {
        Self::new(TypeKind::MediumText).for_dialect(Dialect::MySql)
    }

    pub fn boolean() -> Self {
        Self::new(TypeKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(TypeKind::Date)
    }

    pub fn datetime() -> Self {
        Self::new(TypeKind::DateTime)
    }

    pub fn large_binary() -> Self {
        Self::new(TypeKind::LargeBinary)
    }

    pub fn pickle() -> Self {
        Self::new(TypeKind::Pickle)
    }

    pub fn null() -> Self {
        Self::new(TypeKind::Null)
    }

    /// Switch to the SQL spelling
    pub fn sql_spelling(mut self) -> Self {
        self.spelling = Spelling::Sql;
        self
    }

    /// Mark the type as specific to one dialect
    pub fn for_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Use `variant` in place of this type on `dialect`
    pub fn with_variant(mut self, dialect: Dialect, variant: SqlType) -> Self {
        self.variants.insert(dialect, variant);
        self
    }

    /// The type actually used on `dialect`
    pub fn dialect_impl(&self, dialect: Dialect) -> &SqlType {
        self.variants.get(&dialect).unwrap_or(self)
    }

    pub fn affinity(&self) -> Affinity {
        match self.kind {
            TypeKind::Integer | TypeKind::SmallInteger | TypeKind::BigInteger => Affinity::Integer,
            TypeKind::Numeric { .. } | TypeKind::Float { .. } => Affinity::Numeric,
            TypeKind::String { .. }
            | TypeKind::Char { .. }
            | TypeKind::Text
            | TypeKind::MediumText => Affinity::String,
            TypeKind::Boolean => Affinity::Boolean,
            TypeKind::Date | TypeKind::DateTime | TypeKind::Time | TypeKind::Timestamp => {
                Affinity::Temporal
            }
            TypeKind::LargeBinary | TypeKind::Pickle => Affinity::Binary,
            TypeKind::Null => Affinity::Null,
            TypeKind::Named { .. } => Affinity::Other,
        }
    }

    /// Class name as rendered, e.g. `Integer` or `VARCHAR`
    pub fn class_name(&self) -> &str {
        let sql = self.spelling == Spelling::Sql;
        match &self.kind {
            TypeKind::Integer => pick(sql, "Integer", "INTEGER"),
            TypeKind::SmallInteger => pick(sql, "SmallInteger", "SMALLINT"),
            TypeKind::BigInteger => pick(sql, "BigInteger", "BIGINT"),
            TypeKind::Numeric { .. } => pick(sql, "Numeric", "NUMERIC"),
            TypeKind::Float { .. } => pick(sql, "Float", "FLOAT"),
            TypeKind::String { .. } => pick(sql, "String", "VARCHAR"),
            TypeKind::Char { .. } => "CHAR",
            TypeKind::Text => pick(sql, "Text", "TEXT"),
            TypeKind::MediumText => "MEDIUMTEXT",
            TypeKind::Boolean => pick(sql, "Boolean", "BOOLEAN"),
            TypeKind::Date => pick(sql, "Date", "DATE"),
            TypeKind::DateTime => pick(sql, "DateTime", "DATETIME"),
            TypeKind::Time => pick(sql, "Time", "TIME"),
            TypeKind::Timestamp => "TIMESTAMP",
            TypeKind::LargeBinary => pick(sql, "LargeBinary", "BLOB"),
            TypeKind::Pickle => "PickleType",
            TypeKind::Null => "NullType",
            TypeKind::Named { name, .. } => name,
        }
    }

    /// Constructor arguments, e.g. `precision=10, scale=2`
    pub fn args(&self) -> String {
        match &self.kind {
            TypeKind::Numeric { precision, scale } => {
                let mut args = Vec::new();
                if let Some(p) = precision {
                    args.push(format!("precision={}", p));
                }
                if let Some(s) = scale {
                    args.push(format!("scale={}", s));
                }
                args.join(", ")
            }
            TypeKind::Float { precision: Some(p) } => format!("precision={}", p),
            TypeKind::String { length: Some(l) } | TypeKind::Char { length: Some(l) } => {
                format!("length={}", l)
            }
            TypeKind::Named { args: Some(args), .. } => args.clone(),
            _ => String::new(),
        }
    }

    /// Textual representation such as `Numeric(precision=10, scale=2)`
    pub fn repr(&self) -> String {
        format!("{}({})", self.class_name(), self.args())
    }

    /// Parse a declared or reflected type string.
    ///
    /// Accepts positional (`String(50)`) and keyword (`VARCHAR(length=50)`) arguments. An
    /// empty string is the untyped [`TypeKind::Null`].
    pub fn parse(input: &str) -> Result<Self> {
        let caps = TYPE_PATTERN
            .captures(input)
            .ok_or_else(|| Error::TypeParseError(format!("Unrecognized type: {:?}", input)))?;
        let raw_name = caps
            .get(1)
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let raw_args = caps.get(2).map(|m| m.as_str().trim().to_string());
        if raw_name.is_empty() && raw_args.is_some() {
            return Err(Error::TypeParseError(format!(
                "Type arguments without a name: {:?}",
                input
            )));
        }

        let numbers = match &raw_args {
            Some(args) if !args.is_empty() => parse_numeric_args(args),
            _ => Vec::new(),
        };
        let arg = |i: usize| numbers.get(i).copied().flatten();

        let upper = raw_name.to_uppercase();
        let mut dialect = None;
        let kind = match upper.as_str() {
            "" | "NULL" | "NULLTYPE" => TypeKind::Null,
            "INTEGER" | "INT" | "INT4" | "MEDIUMINT" => TypeKind::Integer,
            "SMALLINTEGER" | "SMALLINT" | "INT2" | "TINYINT" => TypeKind::SmallInteger,
            "BIGINTEGER" | "BIGINT" | "INT8" => TypeKind::BigInteger,
            "NUMERIC" | "DECIMAL" => TypeKind::Numeric {
                precision: arg(0),
                scale: arg(1),
            },
            "FLOAT" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT4" | "FLOAT8" => {
                TypeKind::Float { precision: arg(0) }
            }
            "STRING" | "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" | "VARCHAR2" => {
                TypeKind::String { length: arg(0) }
            }
            "CHAR" | "CHARACTER" | "NCHAR" | "BPCHAR" => TypeKind::Char { length: arg(0) },
            "TEXT" | "CLOB" => TypeKind::Text,
            "MEDIUMTEXT" => {
                dialect = Some(Dialect::MySql);
                TypeKind::MediumText
            }
            "BOOLEAN" | "BOOL" => TypeKind::Boolean,
            "DATE" => TypeKind::Date,
            "DATETIME" => TypeKind::DateTime,
            "TIME" | "TIME WITHOUT TIME ZONE" => TypeKind::Time,
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => TypeKind::Timestamp,
            "LARGEBINARY" | "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => TypeKind::LargeBinary,
            "PICKLETYPE" => TypeKind::Pickle,
            _ => TypeKind::Named {
                name: upper.clone(),
                args: raw_args.filter(|a| !a.is_empty()),
            },
        };

        let spelling = if GENERIC_NAMES.contains(&raw_name.as_str()) {
            Spelling::Generic
        } else {
            Spelling::Sql
        };

        Ok(Self {
            kind,
            spelling,
            dialect,
            variants: BTreeMap::new(),
        })
    }
}

/// Names spelled exactly like the generic model types
const GENERIC_NAMES: &[&str] = &[
    "Integer",
    "SmallInteger",
    "BigInteger",
    "Numeric",
    "Float",
    "String",
    "Text",
    "Boolean",
    "Date",
    "DateTime",
    "Time",
    "LargeBinary",
    "PickleType",
];

fn pick<'a>(sql: bool, generic: &'a str, sql_name: &'a str) -> &'a str {
    if sql {
        sql_name
    } else {
        generic
    }
}

fn parse_numeric_args(args: &str) -> Vec<Option<u32>> {
    args.split(',')
        .map(|part| {
            let value = match part.split_once('=') {
                Some((_, value)) => value,
                None => part,
            };
            value.trim().parse::<u32>().ok()
        })
        .collect()
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl std::str::FromStr for SqlType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SqlType::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Integer", "Integer()")]
    #[case("INTEGER", "INTEGER()")]
    #[case("int", "INTEGER()")]
    #[case("String(50)", "String(length=50)")]
    #[case("VARCHAR(length=50)", "VARCHAR(length=50)")]
    #[case("character varying(20)", "VARCHAR(length=20)")]
    #[case("Numeric(10, 2)", "Numeric(precision=10, scale=2)")]
    #[case("NUMERIC(8,2)", "NUMERIC(precision=8, scale=2)")]
    #[case("DECIMAL(8, 2)", "NUMERIC(precision=8, scale=2)")]
    #[case("CHAR", "CHAR()")]
    #[case("Text", "Text()")]
    #[case("DOUBLE PRECISION", "FLOAT()")]
    #[case("UUID", "UUID()")]
    #[case("", "NullType()")]
    fn parses_and_renders(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(SqlType::parse(input).unwrap().repr(), expected);
    }

    #[test]
    fn medium_text_is_mysql_specific() {
        let ty = SqlType::parse("MEDIUMTEXT").unwrap();
        assert_eq!(ty.kind, TypeKind::MediumText);
        assert_eq!(ty.dialect, Some(Dialect::MySql));
    }

    #[test]
    fn named_types_keep_arguments() {
        let ty = SqlType::parse("geometry(POINT, 4326)").unwrap();
        assert_eq!(ty.repr(), "GEOMETRY(POINT, 4326)");
        assert_eq!(ty.affinity(), Affinity::Other);
    }

    #[test]
    fn variant_is_used_for_its_dialect_only() {
        let ty = SqlType::char(Some(32)).with_variant(Dialect::Sqlite, SqlType::integer());
        assert_eq!(ty.dialect_impl(Dialect::Sqlite).kind, TypeKind::Integer);
        assert_eq!(
            ty.dialect_impl(Dialect::Postgres).kind,
            TypeKind::Char { length: Some(32) }
        );
    }

    #[test]
    fn untyped_has_null_affinity() {
        assert_eq!(SqlType::null().affinity(), Affinity::Null);
        assert_eq!(SqlType::parse("NULL").unwrap().affinity(), Affinity::Null);
    }

    #[test]
    fn rejects_arguments_without_name() {
        assert!(SqlType::parse("(10)").is_err());
    }
}
