use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    DataLoaderRegistry, DeferredValue, DispatchCoordinator, ExecutionError, Field,
    FieldDefinition, FieldError, FieldType, Object, ObjectType, PathSegment, Resolved, Schema,
    Value, execute_sync,
};

fn schema() -> Arc<Schema> {
    let query = ObjectType::new("Query")
        .field(FieldDefinition::new("ok", FieldType::Scalar).resolve_with(|_| Resolved::ok(1.into())))
        .field(FieldDefinition::new("fails", FieldType::Scalar).resolve_with(|_| Resolved::err("boom")))
        .field(FieldDefinition::new("panics", FieldType::Scalar).resolve_with(|_| panic!("kaboom")))
        .field(
            FieldDefinition::new("failsLater", FieldType::Scalar).resolve_with(|_| {
                Resolved::Async(DeferredValue::failed(FieldError::from("later")))
            }),
        )
        .field(
            FieldDefinition::new("required", FieldType::non_null(FieldType::Scalar))
                .resolve_with(|_| Resolved::err("missing")),
        )
        .field(
            FieldDefinition::new("items", FieldType::list(FieldType::non_null(FieldType::Scalar)))
                .resolve_with(|_| Resolved::ok(Value::list(vec![1.into(), Value::null()]))),
        )
        .field(
            FieldDefinition::new("user", FieldType::object("User")).resolve_with(|_| {
                let user: Object = [("name", Value::null())].into_iter().collect();
                Resolved::ok(Value::object(user))
            }),
        );
    let user = ObjectType::new("User")
        .field(FieldDefinition::new("name", FieldType::non_null(FieldType::Scalar)));
    Arc::new(Schema::new(query).with_type(user))
}

fn run(selection: &[Field]) -> (Value, Vec<ExecutionError>) {
    let coordinator = DispatchCoordinator::new(DataLoaderRegistry::new());
    execute_sync(&schema(), selection, Value::null(), &coordinator).unwrap()
}

fn field(name: &str) -> PathSegment {
    PathSegment::Field(name.into())
}

fn messages(errs: &[ExecutionError]) -> Vec<&str> {
    errs.iter().map(|e| e.error().message()).collect()
}

#[test]
fn resolver_error_nulls_the_field() {
    let (data, errs) = run(&[Field::new("ok"), Field::new("fails")]);

    assert_eq!(data.to_string(), r#"{"ok": 1, "fails": null}"#);
    assert_eq!(
        errs,
        [ExecutionError::new(vec![field("fails")], FieldError::from("boom"))],
    );
}

#[test]
fn panic_is_reported_as_error() {
    let (data, errs) = run(&[Field::new("panics"), Field::new("ok")]);

    assert_eq!(data.to_string(), r#"{"panics": null, "ok": 1}"#);
    assert_eq!(messages(&errs), ["Panicked: kaboom"]);
}

#[test]
fn async_failure_reports_root_cause() {
    let (data, errs) = run(&[Field::new("failsLater")]);

    assert_eq!(data.to_string(), r#"{"failsLater": null}"#);
    assert_eq!(messages(&errs), ["later"]);
}

#[test]
fn null_propagates_to_nullable_parent() {
    let (data, errs) = run(&[
        Field::new("user").selection([Field::new("name")]),
        Field::new("items"),
        Field::new("ok"),
    ]);

    assert_eq!(data.to_string(), r#"{"user": null, "items": null, "ok": 1}"#);
    assert_eq!(errs.len(), 2);
    assert_eq!(errs[0].path(), [field("items"), PathSegment::Index(1)]);
    assert_eq!(errs[1].path(), [field("user"), field("name")]);
    assert_eq!(
        messages(&errs),
        [
            "Cannot return null for non-nullable field",
            "Cannot return null for non-nullable field",
        ],
    );
}

#[test]
fn non_null_root_field_nulls_everything() {
    let (data, errs) = run(&[Field::new("ok"), Field::new("required")]);

    assert_eq!(data, Value::null());
    assert_eq!(
        errs,
        [ExecutionError::new(vec![field("required")], FieldError::from("missing"))],
    );
}

#[test]
fn errors_are_sorted_by_path() {
    let (_, errs) = run(&[Field::new("nope"), Field::new("fails"), Field::new("failsLater")]);

    assert_eq!(
        messages(&errs),
        ["boom", "later", "Unknown field `nope` on type `Query`"],
    );
}
