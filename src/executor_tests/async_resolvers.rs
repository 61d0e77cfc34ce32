use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use pretty_assertions::assert_eq;

use crate::{
    DataLoader, DataLoaderRegistry, DeferredValue, DispatchCoordinator, Field, FieldDefinition,
    FieldType, ObjectType, Resolved, Schema, Value, execute, execute_sync,
};

fn schema() -> Arc<Schema> {
    let query = ObjectType::new("Query")
        .field(
            FieldDefinition::new("supplied", FieldType::Scalar).resolve_with(|ex| {
                ex.supply_async(|| {
                    thread::sleep(Duration::from_millis(5));
                    Ok(Value::from("supplied"))
                })
                .into()
            }),
        )
        .field(
            FieldDefinition::new("spawned", FieldType::non_null(FieldType::Scalar)).resolve_with(
                |ex| {
                    ex.coordinator()
                        .spawn(ex.resolution(), async { Ok(Value::scalar(42)) })
                        .into()
                },
            ),
        )
        .field(
            // Loads by the id a supplied computation comes up with.
            FieldDefinition::new("chained", FieldType::Scalar).resolve_with(|ex| {
                let scope = ex.scope();
                ex.supply_async(|| Ok(7))
                    .and_then(move |id| scope.load::<i32, Value>("tens", *id).into_deferred())
                    .into()
            }),
        )
        .field(
            FieldDefinition::new("stuck", FieldType::Scalar).resolve_with(|_| {
                DeferredValue::<Value>::new()
                    .or_timeout(Duration::from_millis(10))
                    .into()
            }),
        )
        .field(
            FieldDefinition::new("defaulted", FieldType::Scalar).resolve_with(|_| {
                DeferredValue::new()
                    .complete_on_timeout(Value::from("fallback"), Duration::from_millis(10))
                    .into()
            }),
        );
    Arc::new(Schema::new(query))
}

fn coordinator(calls: &Arc<Mutex<Vec<Vec<i32>>>>) -> Arc<DispatchCoordinator> {
    let calls = Arc::clone(calls);
    DispatchCoordinator::new(DataLoaderRegistry::new().register(
        "tens",
        DataLoader::from_fn(move |keys: &[i32]| {
            calls.lock().unwrap().push(keys.to_vec());
            keys.iter().map(|k| Ok(Value::scalar(k * 10))).collect()
        }),
    ))
}

#[test]
fn completes_supplied_and_spawned_values() {
    let calls = Arc::default();

    let (data, errs) = execute_sync(
        &schema(),
        &[Field::new("supplied"), Field::new("spawned")],
        Value::null(),
        &coordinator(&calls),
    )
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(data.to_string(), r#"{"supplied": "supplied", "spawned": 42}"#);
}

#[test]
fn dispatches_loads_of_continuations() {
    let calls = Arc::default();

    let (data, errs) = execute_sync(
        &schema(),
        &[Field::new("chained"), Field::new("chained").alias("again")],
        Value::null(),
        &coordinator(&calls),
    )
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(data.to_string(), r#"{"chained": 70, "again": 70}"#);
    assert_eq!(calls.lock().unwrap().concat(), [7]);
}

#[test]
fn times_out_stuck_values() {
    let calls = Arc::default();

    let (data, errs) = execute_sync(
        &schema(),
        &[Field::new("stuck"), Field::new("defaulted")],
        Value::null(),
        &coordinator(&calls),
    )
    .unwrap();

    assert_eq!(data.to_string(), r#"{"stuck": null, "defaulted": "fallback"}"#);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].error().message().contains("timed out"), "{errs:?}");
}

#[tokio::test]
async fn awaits_execution() {
    let calls = Arc::default();

    let (data, errs) = execute(
        &schema(),
        &[Field::new("spawned"), Field::new("supplied")],
        Value::null(),
        &coordinator(&calls),
    )
    .await
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(data.to_string(), r#"{"spawned": 42, "supplied": "supplied"}"#);
}
