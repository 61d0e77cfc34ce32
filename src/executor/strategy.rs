//! Asynchronous tree-walking execution.
//!
//! Sibling fields are resolved one after another without waiting for each
//! other. Every resolution made within one completion drain is dispatched
//! together once the drain is through, so the items of a list load their
//! children in a single batch.

use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use arcstr::ArcStr;

use crate::{
    ast::Field,
    deferred::{DeferredValue, Failure, RequestId, catch, drain},
    dispatch::{DispatchCoordinator, ResolutionContext},
    resolve::Resolved,
    schema::{FieldType, ObjectType, Schema},
    value::{Object, Value},
};

use super::{ExecutionError, Executor, FieldError, IntoFieldError as _, ResultPath};

/// Response data along with every field error raised while producing it.
pub type ExecutionOutput = (Value, Vec<ExecutionError>);

/// Completed value of a field.
///
/// `None` stands for a null that has to propagate to the nearest nullable
/// parent. Its error is recorded already.
type Completed = DeferredValue<Option<Value>>;

struct Walk {
    schema: Arc<Schema>,
    coordinator: Arc<DispatchCoordinator>,
    errors: Mutex<Vec<ExecutionError>>,
}

/// Executes `selection` against the query type of `schema`, with `root` as
/// the parent value of the top-level fields.
///
/// The returned value completes once every field completed. Field errors do
/// not fail it: they are collected next to the (partial) data instead.
pub fn execute(
    schema: &Arc<Schema>,
    selection: &[Field],
    root: Value,
    coordinator: &Arc<DispatchCoordinator>,
) -> DeferredValue<ExecutionOutput> {
    let walk = Arc::new(Walk {
        schema: Arc::clone(schema),
        coordinator: Arc::clone(coordinator),
        errors: Mutex::default(),
    });
    let output = DeferredValue::pending(Some(coordinator.request_id()));
    let selection: Arc<[Field]> = selection.into();

    let out = output.clone();
    drain(Box::new(move || {
        __span_trace!("execute", request = %walk.coordinator.request_id());

        let query = Arc::clone(walk.schema.query_type());
        let path = ResultPath::default();
        let data = walk.execute_fields(&query, &root, &selection, &path);
        data.subscribe(move |outcome| {
            let data = match outcome {
                Ok(data) => data.clone().unwrap_or_default(),
                Err(failure) => {
                    walk.record_failure(&path, failure);
                    Value::null()
                }
            };
            let mut errors = mem::take(&mut *walk.errors());
            errors.sort();
            __trace_debug!(
                "{}: execution finished with {} errors",
                walk.coordinator.request_id(),
                errors.len(),
            );
            _ = out.complete((data, errors));
        });
    }));
    output
}

/// Same as [`execute`], but blocks until the execution finished.
///
/// Must not be called from a continuation of a [`DeferredValue`].
pub fn execute_sync(
    schema: &Arc<Schema>,
    selection: &[Field],
    root: Value,
    coordinator: &Arc<DispatchCoordinator>,
) -> Result<ExecutionOutput, Failure> {
    execute(schema, selection, root, coordinator).join()
}

impl Walk {
    fn owner(&self) -> Option<RequestId> {
        Some(self.coordinator.request_id())
    }

    fn errors(&self) -> MutexGuard<'_, Vec<ExecutionError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn done(&self, value: Option<Value>) -> Completed {
        DeferredValue::resolved(self.owner(), Ok(value))
    }

    fn record(&self, path: &ResultPath, error: FieldError) {
        __trace_debug!("field `{path}` failed: {}", error.message());
        self.errors().push(ExecutionError::new(path.to_vec(), error));
    }

    fn record_failure(&self, path: &ResultPath, failure: &Failure) {
        self.record(path, failure.clone().into_field_error());
    }

    /// Null standing in for a failed field of type `ty`.
    fn null_for(ty: &FieldType) -> Option<Value> {
        (!ty.is_non_null()).then(Value::null)
    }

    fn execute_fields(
        self: &Arc<Self>,
        ty: &Arc<ObjectType>,
        source: &Value,
        selection: &Arc<[Field]>,
        path: &ResultPath,
    ) -> Completed {
        let values = selection
            .iter()
            .map(|field| {
                let path = path.field(field.response_key().clone());
                self.resolve_field(ty, source, field, path)
            })
            .collect();
        let keys: Vec<ArcStr> = selection.iter().map(|f| f.response_key().clone()).collect();

        DeferredValue::combine_all(values).map(move |values| {
            keys.iter()
                .zip(values)
                .map(|(key, value)| value.clone().map(|v| (key.clone(), v)))
                .collect::<Option<Object>>()
                .map(Value::object)
        })
    }

    fn resolve_field(
        self: &Arc<Self>,
        parent: &ObjectType,
        source: &Value,
        field: &Field,
        path: ResultPath,
    ) -> Completed {
        let Some(definition) = parent.field_by_name(field.name()) else {
            self.record(
                &path,
                FieldError::from(format!(
                    "Unknown field `{}` on type `{}`",
                    field.name(),
                    parent.name(),
                )),
            );
            return self.done(Some(Value::null()));
        };
        let ty = definition.field_type().clone();

        let resolution = ResolutionContext::new(path.to_string());
        let resolved = {
            let executor = Executor::new(source, field, &resolution, &self.coordinator);
            catch(|| definition.resolve(&executor))
        };
        self.coordinator.defer_dispatch(resolution);

        match resolved {
            Ok(Resolved::Sync(Ok(value))) => self.complete_value(&ty, field, value, path),
            Ok(Resolved::Sync(Err(e))) => {
                self.record(&path, e);
                self.done(Self::null_for(&ty))
            }
            Err(panic) => {
                self.record_failure(&path, &panic);
                self.done(Self::null_for(&ty))
            }
            Ok(Resolved::Async(value)) => {
                let completing = {
                    let walk = Arc::clone(self);
                    let (ty, field, path) = (ty.clone(), field.clone(), path.clone());
                    value.and_then(move |v| walk.complete_value(&ty, &field, v.clone(), path))
                };
                let walk = Arc::clone(self);
                completing.recover(move |failure| {
                    walk.record_failure(&path, failure);
                    Self::null_for(&ty)
                })
            }
        }
    }

    fn complete_value(
        self: &Arc<Self>,
        ty: &FieldType,
        field: &Field,
        value: Value,
        path: ResultPath,
    ) -> Completed {
        match ty {
            FieldType::NonNull(inner) => {
                let walk = Arc::clone(self);
                self.complete_inner(inner, field, value, path.clone())
                    .map(move |completed| match completed {
                        Some(v) if !v.is_null() => Some(v.clone()),
                        Some(_) => {
                            walk.record(
                                &path,
                                FieldError::from("Cannot return null for non-nullable field"),
                            );
                            None
                        }
                        None => None,
                    })
            }
            ty => self
                .complete_inner(ty, field, value, path)
                .map(|completed| Some(completed.clone().unwrap_or_default())),
        }
    }

    fn complete_inner(
        self: &Arc<Self>,
        ty: &FieldType,
        field: &Field,
        value: Value,
        path: ResultPath,
    ) -> Completed {
        if value.is_null() {
            return self.done(Some(Value::null()));
        }
        match ty {
            FieldType::NonNull(_) => self.complete_value(ty, field, value, path),
            FieldType::Scalar => self.done(Some(value)),
            FieldType::List(item) => {
                let Value::List(items) = value else {
                    self.record(&path, FieldError::from("Expected a list value"));
                    return self.done(None);
                };
                let items = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| self.complete_value(item, field, v, path.index(i)))
                    .collect();
                DeferredValue::combine_all(items).map(|items| {
                    items
                        .iter()
                        .cloned()
                        .collect::<Option<Vec<_>>>()
                        .map(Value::list)
                })
            }
            FieldType::Object(name) => match self.schema.object_type(name) {
                Some(object_type) => {
                    let object_type = Arc::clone(object_type);
                    self.execute_fields(&object_type, &value, field.selection_set(), &path)
                }
                None => {
                    self.record(&path, FieldError::from(format!("Unknown type `{name}`")));
                    self.done(None)
                }
            },
        }
    }
}
