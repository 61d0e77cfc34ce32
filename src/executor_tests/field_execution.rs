use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    DataLoaderRegistry, DispatchCoordinator, Field, FieldDefinition, FieldType, Object,
    ObjectType, Resolved, Schema, Value, execute_sync,
};

fn schema() -> Arc<Schema> {
    let query = ObjectType::new("Query")
        .field(FieldDefinition::new("a", FieldType::Scalar).resolve_with(|_| Resolved::ok("Apple".into())))
        .field(
            FieldDefinition::new("pic", FieldType::Scalar).resolve_with(|ex| {
                let size = ex.argument("size").and_then(Value::as_int_value).unwrap_or(50);
                Resolved::ok(format!("Pic of size: {size}").into())
            }),
        )
        .field(
            FieldDefinition::new("deep", FieldType::object("Deep"))
                .resolve_with(|_| Resolved::ok(Value::object(Object::default()))),
        )
        .field(FieldDefinition::new("root", FieldType::Scalar));
    let deep = ObjectType::new("Deep")
        .field(FieldDefinition::new("b", FieldType::Scalar).resolve_with(|_| Resolved::ok("Boring".into())))
        .field(
            FieldDefinition::new("c", FieldType::list(FieldType::Scalar)).resolve_with(|_| {
                Resolved::ok(Value::list(vec![
                    "Contrived".into(),
                    Value::null(),
                    "Confusing".into(),
                ]))
            }),
        )
        .field(
            FieldDefinition::new("deeper", FieldType::list(FieldType::object("Deep")))
                .resolve_with(|_| {
                    Resolved::ok(Value::list(vec![
                        Value::object(Object::default()),
                        Value::null(),
                    ]))
                }),
        );
    Arc::new(Schema::new(query).with_type(deep))
}

fn run(selection: &[Field], root: Value) -> (Value, Vec<crate::ExecutionError>) {
    let coordinator = DispatchCoordinator::new(DataLoaderRegistry::new());
    execute_sync(&schema(), selection, root, &coordinator).unwrap()
}

#[test]
fn resolves_nested_selections_in_order() {
    let (data, errs) = run(
        &[
            Field::new("a"),
            Field::new("pic").alias("small").argument("size", Value::scalar(10)),
            Field::new("pic"),
            Field::new("deep").selection([
                Field::new("c"),
                Field::new("b"),
                Field::new("deeper").selection([Field::new("b")]),
            ]),
        ],
        Value::null(),
    );

    assert_eq!(errs, []);
    assert_eq!(
        data.to_string(),
        r#"{"a": "Apple", "small": "Pic of size: 10", "pic": "Pic of size: 50", "deep": {"c": ["Contrived", null, "Confusing"], "b": "Boring", "deeper": [{"b": "Boring"}, null]}}"#,
    );
}

#[test]
fn default_resolver_reads_root_properties() {
    let root: Object = [("root", Value::scalar(true))].into_iter().collect();

    let (data, errs) = run(&[Field::new("root")], Value::object(root));

    assert_eq!(errs, []);
    assert_eq!(
        data.as_object_value().and_then(|o| o.get_field_value("root")),
        Some(&Value::scalar(true)),
    );
}

#[test]
fn empty_selection_yields_empty_object() {
    let (data, errs) = run(&[], Value::null());

    assert_eq!(errs, []);
    assert_eq!(data, Value::object(Object::default()));
}
