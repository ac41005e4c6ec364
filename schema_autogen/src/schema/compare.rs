//! Column equivalence checks: type, nullability and server default

use tracing::info;

use crate::schema::diff::Change;
use crate::schema::generator::{render_server_default, RenderContext};
use crate::schema::sqltype::{Affinity, SqlType, TypeKind};
use crate::schema::types::{Column, ServerDefault};

/// Which column attributes take part in the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    pub compare_type: bool,
    pub compare_server_default: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            compare_type: true,
            compare_server_default: true,
        }
    }
}

/// Differences found on one column; `old` is the live value, `new` the desired one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDiff {
    pub type_change: Option<Change<SqlType>>,
    pub nullable_change: Option<Change<bool>>,
    pub default_change: Option<Change<Option<ServerDefault>>>,
}

impl ColumnDiff {
    pub fn is_empty(&self) -> bool {
        self.type_change.is_none() && self.nullable_change.is_none() && self.default_change.is_none()
    }
}

/// Compare a desired column against the live one
pub fn compare_column(
    ctx: &RenderContext<'_>,
    options: CompareOptions,
    table: &str,
    desired: &Column,
    live: &Column,
) -> ColumnDiff {
    let mut diff = ColumnDiff::default();

    if options.compare_type && type_differs(ctx, table, desired, live) {
        diff.type_change = Some(Change::new(live.data_type.clone(), desired.data_type.clone()));
    }

    if live.nullable != desired.nullable {
        diff.nullable_change = Some(Change::new(live.nullable, desired.nullable));
    }

    if options.compare_server_default
        && (live.server_default.is_some() || desired.server_default.is_some())
    {
        let rendered_live = render_server_default(ctx, live.server_default.as_ref());
        let rendered_desired = render_server_default(ctx, desired.server_default.as_ref());
        if rendered_live != rendered_desired {
            diff.default_change = Some(Change::new(
                live.server_default.clone(),
                desired.server_default.clone(),
            ));
        }
    }

    diff
}

fn type_differs(ctx: &RenderContext<'_>, table: &str, desired: &Column, live: &Column) -> bool {
    if live.data_type.affinity() == Affinity::Null {
        info!(
            table = table,
            column = %live.name,
            "Couldn't determine database type for column; can't compare"
        );
        return false;
    }
    let desired_type = desired.data_type.dialect_impl(ctx.dialect);
    if desired_type.affinity() == Affinity::Null {
        info!(
            table = table,
            column = %desired.name,
            "Column has no type within the model; can't compare"
        );
        return false;
    }

    if is_never_different(desired_type) || is_never_different(&live.data_type) {
        return false;
    }

    type_signature(desired_type).to_uppercase() != type_signature(&live.data_type).to_uppercase()
}

/// Boolean storage and MySQL `MEDIUMTEXT` are reported inconsistently by reflection
fn is_never_different(data_type: &SqlType) -> bool {
    data_type.affinity() == Affinity::Boolean || data_type.kind == TypeKind::MediumText
}

/// Normalized spelling used for type equivalence
pub fn type_signature(data_type: &SqlType) -> String {
    match &data_type.kind {
        TypeKind::String { length } => format!("VARCHAR({})", length_arg(*length)),
        TypeKind::Char { length } => format!("CHAR({})", length_arg(*length)),
        TypeKind::Numeric { .. } => format!("Numeric({})", data_type.args()),
        TypeKind::Integer => "INTEGER()".to_string(),
        TypeKind::Pickle | TypeKind::LargeBinary => "BLOB()".to_string(),
        _ => data_type.repr(),
    }
}

fn length_arg(length: Option<u32>) -> String {
    length.map(|l| format!("length={}", l)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::sqltype::Dialect;
    use rstest::rstest;

    fn ctx<'a>() -> RenderContext<'a> {
        RenderContext::new(Dialect::Sqlite)
    }

    fn live(data_type: &str) -> Column {
        Column::new("c", SqlType::parse(data_type).unwrap())
    }

    #[rstest]
    #[case(SqlType::string(Some(50)), "VARCHAR(50)", false)]
    #[case(SqlType::string(Some(50)), "VARCHAR(40)", true)]
    #[case(SqlType::numeric(10, 2), "NUMERIC(10, 2)", false)]
    #[case(SqlType::numeric(10, 2), "NUMERIC(8, 2)", true)]
    #[case(SqlType::integer(), "INTEGER", false)]
    #[case(SqlType::integer(), "BIGINT", true)]
    #[case(SqlType::pickle(), "BLOB", false)]
    #[case(SqlType::text(), "TEXT", false)]
    #[case(SqlType::boolean(), "INTEGER", false)]
    #[case(SqlType::medium_text(), "TEXT", false)]
    #[case(SqlType::char(Some(3)), "CHAR(3)", false)]
    fn type_equivalence(#[case] desired: SqlType, #[case] reflected: &str, #[case] differs: bool) {
        let diff = compare_column(
            &ctx(),
            CompareOptions::default(),
            "t",
            &Column::new("c", desired),
            &live(reflected),
        );
        assert_eq!(diff.type_change.is_some(), differs);
    }

    #[test]
    fn null_affinity_short_circuits() {
        let diff = compare_column(
            &ctx(),
            CompareOptions::default(),
            "t",
            &Column::new("c", SqlType::integer()),
            &live(""),
        );
        assert!(diff.is_empty());

        let diff = compare_column(
            &ctx(),
            CompareOptions::default(),
            "t",
            &Column::new("c", SqlType::null()),
            &live("VARCHAR(10)"),
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn desired_type_resolves_its_dialect_variant() {
        let desired = SqlType::char(Some(32)).with_variant(Dialect::Sqlite, SqlType::integer());
        let diff = compare_column(
            &ctx(),
            CompareOptions::default(),
            "t",
            &Column::new("c", desired),
            &live("INTEGER"),
        );
        assert!(diff.type_change.is_none());
    }

    #[test]
    fn quoted_and_bare_defaults_are_equal() {
        let desired = Column::new("c", SqlType::text()).server_default("x");
        let reflected = live("TEXT").server_default("'x'");
        let diff = compare_column(&ctx(), CompareOptions::default(), "t", &desired, &reflected);
        assert!(diff.default_change.is_none());
    }

    #[test]
    fn added_default_is_a_change() {
        let desired = Column::new("c", SqlType::text()).server_default("x");
        let diff = compare_column(&ctx(), CompareOptions::default(), "t", &desired, &live("TEXT"));
        assert_eq!(
            diff.default_change,
            Some(Change::new(None, Some(ServerDefault::Text("x".to_string()))))
        );
    }

    #[test]
    fn disabled_comparisons_report_nothing() {
        let options = CompareOptions {
            compare_type: false,
            compare_server_default: false,
        };
        let desired = Column::new("c", SqlType::integer()).server_default("1");
        let diff = compare_column(&ctx(), options, "t", &desired, &live("VARCHAR(5)"));
        assert!(diff.is_empty());
    }

    #[test]
    fn nullable_difference_carries_both_sides() {
        let desired = Column::new("c", SqlType::integer()).nullable(false);
        let diff = compare_column(&ctx(), CompareOptions::default(), "t", &desired, &live("INTEGER"));
        assert_eq!(diff.nullable_change, Some(Change::new(true, false)));
    }
}
