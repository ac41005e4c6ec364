use pretty_assertions::assert_eq;

use schema_autogen::autogen::{compare_metadata, AutogenOptions};
use schema_autogen::config::ModelsConfig;
use schema_autogen::schema::types::{ServerDefault, TableKey};
use schema_autogen::schema::TypeKind;
use schema_autogen::{Model, ModelRegistry, ReflectedSchema, SchemaChange};

#[allow(dead_code)]
#[derive(Model)]
#[model(table = "user")]
struct User {
    #[column(primary_key)]
    id: i32,
    #[column(type = "String(50)", unique)]
    name: String,
    #[column(server_default = "x")]
    a1: Option<String>,
    active: bool,
}

#[allow(dead_code)]
#[derive(Model)]
#[model(schema = "sales")]
struct OrderLine {
    #[column(primary_key, autoincrement = false)]
    line_id: i64,
    #[column(foreign_key = "user.id", index)]
    user_id: Option<i32>,
    #[column(name = "qty", nullable = true)]
    quantity: i16,
    #[column(type = "Numeric(10, 2)")]
    amount: f64,
}

#[allow(dead_code)]
#[derive(Model)]
#[model(reference_only)]
struct Legacy {
    #[column(primary_key)]
    id: i32,
}

#[test]
fn derive_builds_columns_and_constraints() {
    let table = <User as schema_autogen::models::Model>::table().unwrap();
    assert_eq!(table.name, "user");
    assert_eq!(table.primary_key.columns, vec!["id".to_string()]);

    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "a1", "active"]);
    assert!(!table.columns[0].nullable);
    assert_eq!(table.columns[1].data_type.kind, TypeKind::String { length: Some(50) });
    assert!(!table.columns[1].nullable);
    assert!(table.columns[2].nullable);
    assert_eq!(
        table.columns[2].server_default,
        Some(ServerDefault::Text("x".to_string()))
    );
    assert_eq!(table.columns[3].data_type.kind, TypeKind::Boolean);
    assert_eq!(
        table.unique_constraints[0].name.as_deref(),
        Some("uq_user_name")
    );
}

#[test]
fn derive_applies_table_and_column_options() {
    let table = <OrderLine as schema_autogen::models::Model>::table().unwrap();
    assert_eq!(table.key(), TableKey::new(Some("sales"), "order_line"));
    assert!(!table.columns[0].autoincrement);
    assert_eq!(table.columns[0].data_type.kind, TypeKind::BigInteger);
    assert!(table.columns[1].nullable);
    assert_eq!(table.columns[2].name, "qty");
    assert!(table.columns[2].nullable);
    assert_eq!(table.columns[2].data_type.kind, TypeKind::SmallInteger);
    assert_eq!(
        table.columns[3].data_type.kind,
        TypeKind::Numeric {
            precision: Some(10),
            scale: Some(2)
        }
    );
    assert_eq!(table.indexes[0].name, "ix_order_line_user_id");
    assert_eq!(table.foreign_keys[0].ref_columns, vec!["user.id".to_string()]);

    let legacy = <Legacy as schema_autogen::models::Model>::table().unwrap();
    assert!(legacy.reference_only);
}

#[test]
fn registered_models_drive_the_comparison() {
    let mut registry = ModelRegistry::new(&ModelsConfig::default());
    registry.register::<User>().unwrap();
    registry.register::<Legacy>().unwrap();

    let options = AutogenOptions::new().target_metadata(registry.to_metadata(None).unwrap());
    let changes = compare_metadata(&options, &ReflectedSchema::default()).unwrap();
    assert_eq!(changes.len(), 1);
    assert!(matches!(&changes[0], SchemaChange::AddTable(t) if t.name == "user"));
}
