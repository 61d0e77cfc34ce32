use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use pretty_assertions::assert_eq;
use serial_test::serial;

use crate::{
    DataLoader, DataLoaderOptions, DataLoaderRegistry, DeferredValue, DispatchConfig,
    DispatchCoordinator, Executor, Field, FieldDefinition, FieldError, FieldType, Object,
    ObjectType, PathSegment, Resolved, Schema, Value, execute_sync,
};

type Calls = Arc<Mutex<Vec<Vec<i32>>>>;

/// User `n` is named `user{n}` and befriends user `n % 3 + 1`. User `13`
/// cannot be loaded.
fn user(id: i32) -> Value {
    let user: Object = [
        ("id", Value::scalar(id)),
        ("name", format!("user{id}").into()),
        ("friendId", Value::scalar(id % 3 + 1)),
    ]
    .into_iter()
    .collect();
    Value::object(user)
}

fn loaders(calls: &Calls, options: DataLoaderOptions) -> DataLoaderRegistry {
    let calls = Arc::clone(calls);
    DataLoaderRegistry::new().register(
        "users",
        DataLoader::with_options(
            move |ids: &[i32]| {
                calls.lock().unwrap().push(ids.to_vec());
                Resolved::ok(
                    ids.iter()
                        .map(|&id| match id {
                            13 => Err(FieldError::from("user 13 is unlucky")),
                            id => Ok(user(id)),
                        })
                        .collect(),
                )
            },
            options,
        ),
    )
}

fn load_user(ex: &Executor<'_>, id: Option<i32>) -> Resolved<Value> {
    match id {
        Some(id) => ex.load::<i32, Value>("users", id).into(),
        None => Resolved::ok(Value::null()),
    }
}

fn schema() -> Arc<Schema> {
    let query = ObjectType::new("Query")
        .field(
            FieldDefinition::new("users", FieldType::list(FieldType::object("User"))).resolve_with(
                |ex| {
                    let ids = ex
                        .argument("ids")
                        .and_then(Value::as_list_value)
                        .cloned()
                        .unwrap_or_default();
                    let users = ids
                        .iter()
                        .filter_map(Value::as_int_value)
                        .map(|id| [("friendId", Value::scalar(id))].into_iter().collect())
                        .map(Value::object)
                        .collect();
                    Resolved::ok(Value::list(users))
                },
            ),
        )
        .field(
            FieldDefinition::new("user", FieldType::object("User")).resolve_with(|ex| {
                load_user(ex, ex.argument("id").and_then(Value::as_int_value))
            }),
        );
    let user = ObjectType::new("User")
        .field(FieldDefinition::new("id", FieldType::Scalar))
        .field(FieldDefinition::new("name", FieldType::non_null(FieldType::Scalar)))
        .field(
            FieldDefinition::new("friend", FieldType::object("User")).resolve_with(|ex| {
                let id = ex
                    .source()
                    .as_object_value()
                    .and_then(|o| o.get_field_value("friendId"))
                    .and_then(Value::as_int_value);
                load_user(ex, id)
            }),
        )
        .field(
            // Resolves from a thread nobody tracks, so its load arrives after
            // the field was dispatched already.
            FieldDefinition::new("lateFriend", FieldType::object("User")).resolve_with(|ex| {
                let scope = ex.scope();
                let id = ex
                    .source()
                    .as_object_value()
                    .and_then(|o| o.get_field_value("friendId"))
                    .and_then(Value::as_int_value)
                    .unwrap_or(1);
                let value = DeferredValue::new();
                let out = value.clone();
                _ = thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    let loaded = scope.load::<i32, Value>("users", id);
                    loaded.subscribe(move |outcome| _ = out.complete_with(outcome.clone()));
                });
                Resolved::Async(value)
            }),
        );
    Arc::new(Schema::new(query).with_type(user))
}

fn ids(ids: &[i32]) -> Value {
    Value::list(ids.iter().copied().map(Value::scalar).collect())
}

#[test]
fn siblings_load_in_one_batch() {
    let calls = Calls::default();
    let coordinator = DispatchCoordinator::new(loaders(&calls, DataLoaderOptions::default()));

    let (data, errs) = execute_sync(
        &schema(),
        &[
            Field::new("user").alias("a").argument("id", Value::scalar(1)).selection([Field::new("name")]),
            Field::new("user").alias("b").argument("id", Value::scalar(2)).selection([Field::new("name")]),
        ],
        Value::null(),
        &coordinator,
    )
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(data.to_string(), r#"{"a": {"name": "user1"}, "b": {"name": "user2"}}"#);
    assert_eq!(*calls.lock().unwrap(), [vec![1, 2]]);
}

#[test]
fn list_items_load_in_one_batch() {
    let calls = Calls::default();
    let coordinator = DispatchCoordinator::new(loaders(&calls, DataLoaderOptions::default()));

    let (data, errs) = execute_sync(
        &schema(),
        &[Field::new("users")
            .argument("ids", ids(&[1, 2, 3]))
            .selection([Field::new("friend").selection([
                Field::new("name"),
                Field::new("friend").selection([Field::new("id")]),
            ])])],
        Value::null(),
        &coordinator,
    )
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(
        data.to_string(),
        r#"{"users": [{"friend": {"name": "user1", "friend": {"id": 2}}}, {"friend": {"name": "user2", "friend": {"id": 3}}}, {"friend": {"name": "user3", "friend": {"id": 1}}}]}"#,
    );
    // The friends of friends are cached already.
    assert_eq!(*calls.lock().unwrap(), [vec![1, 2, 3]]);
    assert_eq!(coordinator.loaders().statistics().cache_hit_count, 3);
}

#[test]
fn each_level_loads_in_one_batch_without_cache() {
    let calls = Calls::default();
    let coordinator = DispatchCoordinator::new(loaders(
        &calls,
        DataLoaderOptions::default().caching(false),
    ));

    let (_, errs) = execute_sync(
        &schema(),
        &[Field::new("users")
            .argument("ids", ids(&[1, 2]))
            .selection([Field::new("friend").selection([
                Field::new("friend").selection([Field::new("name")]),
            ])])],
        Value::null(),
        &coordinator,
    )
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(*calls.lock().unwrap(), [vec![1, 2], vec![2, 3]]);
}

#[test]
fn failed_key_nulls_only_its_field() {
    let calls = Calls::default();
    let coordinator = DispatchCoordinator::new(loaders(&calls, DataLoaderOptions::default()));

    let (data, errs) = execute_sync(
        &schema(),
        &[
            Field::new("user").alias("lucky").argument("id", Value::scalar(12)).selection([Field::new("id")]),
            Field::new("user").alias("unlucky").argument("id", Value::scalar(13)).selection([Field::new("id")]),
        ],
        Value::null(),
        &coordinator,
    )
    .unwrap();

    assert_eq!(data.to_string(), r#"{"lucky": {"id": 12}, "unlucky": null}"#);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].path(), [PathSegment::Field("unlucky".into())]);
    assert_eq!(errs[0].error().message(), "user 13 is unlucky");
    assert_eq!(*calls.lock().unwrap(), [vec![12, 13]]);
}

#[test]
#[serial]
fn late_loads_are_batched_by_the_window() {
    let calls = Calls::default();
    // Wide enough for both late loads to land in one window.
    let coordinator = DispatchCoordinator::builder(loaders(&calls, DataLoaderOptions::default()))
        .config(DispatchConfig::default().batch_window(Duration::from_millis(200)))
        .build();

    let (data, errs) = execute_sync(
        &schema(),
        &[Field::new("users")
            .argument("ids", ids(&[4, 5]))
            .selection([Field::new("lateFriend").selection([Field::new("name")])])],
        Value::null(),
        &coordinator,
    )
    .unwrap();

    assert_eq!(errs, []);
    assert_eq!(
        data.to_string(),
        r#"{"users": [{"lateFriend": {"name": "user4"}}, {"lateFriend": {"name": "user5"}}]}"#,
    );
    let mut calls = calls.lock().unwrap().clone();
    calls.iter_mut().for_each(|batch| batch.sort_unstable());
    assert_eq!(calls, [vec![4, 5]]);
}
