//! Resolve the fields of a selection set against a [`Schema`].
//!
//! [`Schema`]: crate::schema::Schema

mod strategy;

use std::{borrow::Cow, cmp::Ordering, fmt, sync::Arc};

use arcstr::ArcStr;
use derive_more::with_trait::Display;

use crate::{
    ast::Field,
    dispatch::{BatchedValue, DispatchCoordinator, LoadScope, ResolutionContext},
    value::{Object, Value},
};

pub use self::strategy::{ExecutionOutput, execute, execute_sync};

/// Error type for errors that occur during field resolution.
///
/// Field errors are represented by a human-readable error message and an
/// optional `Value` structure containing additional information.
///
/// They can be converted to from any type that implements
/// [`std::fmt::Display`], which makes error chaining with the `?` operator a
/// breeze:
///
/// ```rust
/// # use juniper_deferred::FieldError;
/// fn get_string(data: Vec<u8>) -> Result<String, FieldError> {
///     let s = String::from_utf8(data)?;
///     Ok(s)
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    message: String,
    extensions: Value,
}

impl<T: Display> From<T> for FieldError {
    fn from(e: T) -> Self {
        Self {
            message: e.to_string(),
            extensions: Value::null(),
        }
    }
}

impl FieldError {
    /// Construct a new [`FieldError`] with additional data.
    ///
    /// If the argument is [`Value::Null`], then no extra data will be
    /// included.
    pub fn new<T: Display>(e: T, extensions: Value) -> Self {
        Self {
            message: e.to_string(),
            extensions,
        }
    }

    /// Returns the `"message"` field of this [`FieldError`].
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the `"extensions"` field of this [`FieldError`].
    ///
    /// If there is no `"extensions"`, then [`Value::Null`] will be returned.
    #[must_use]
    pub fn extensions(&self) -> &Value {
        &self.extensions
    }
}

/// The result of resolving the value of a field of type `T`
pub type FieldResult<T> = Result<T, FieldError>;

/// Custom error handling trait to enable error types other than
/// [`FieldError`] to be specified as return value.
///
/// Any custom error type should implement this trait to convert itself into
/// a [`FieldError`].
pub trait IntoFieldError {
    /// Performs the custom conversion into a [`FieldError`].
    #[must_use]
    fn into_field_error(self) -> FieldError;
}

impl IntoFieldError for FieldError {
    fn into_field_error(self) -> FieldError {
        self
    }
}

impl IntoFieldError for &str {
    fn into_field_error(self) -> FieldError {
        FieldError::from(self)
    }
}

impl IntoFieldError for String {
    fn into_field_error(self) -> FieldError {
        FieldError::from(self)
    }
}

impl IntoFieldError for Cow<'_, str> {
    fn into_field_error(self) -> FieldError {
        FieldError::from(self)
    }
}

/// Single step of a [`ExecutionError`] path.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PathSegment {
    /// Response key of an object field.
    #[display("{_0}")]
    Field(ArcStr),

    /// Position inside a list.
    #[display("{_0}")]
    Index(usize),
}

/// Path of a value in the response, shared cheaply between continuations.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResultPath(Option<Arc<(ResultPath, PathSegment)>>);

impl ResultPath {
    pub(crate) fn field(&self, key: ArcStr) -> Self {
        Self(Some(Arc::new((self.clone(), PathSegment::Field(key)))))
    }

    pub(crate) fn index(&self, idx: usize) -> Self {
        Self(Some(Arc::new((self.clone(), PathSegment::Index(idx)))))
    }

    pub(crate) fn to_vec(&self) -> Vec<PathSegment> {
        let mut segments = vec![];
        let mut cur = self;
        while let Some(node) = &cur.0 {
            segments.push(node.1.clone());
            cur = &node.0;
        }
        segments.reverse();
        segments
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.to_vec().iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Error type for errors that occur during query execution
///
/// All execution errors contain the path in the response to the field where
/// the error occurred, as well as the field error itself.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionError {
    path: Vec<PathSegment>,
    error: FieldError,
}

impl Eq for ExecutionError {}

impl PartialOrd for ExecutionError {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExecutionError {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.error.message.cmp(&other.error.message))
    }
}

impl ExecutionError {
    /// Construct a new execution error occurring at the given path.
    pub fn new(path: Vec<PathSegment>, error: FieldError) -> Self {
        Self { path, error }
    }

    /// The error message
    pub fn error(&self) -> &FieldError {
        &self.error
    }

    /// The path in the result set where this error occurred
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }
}

/// Context of a single field resolution, handed to its [`Resolver`].
///
/// [`Resolver`]: crate::schema::Resolver
pub struct Executor<'a> {
    source: &'a Value,
    field: &'a Field,
    resolution: &'a ResolutionContext,
    coordinator: &'a Arc<DispatchCoordinator>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        source: &'a Value,
        field: &'a Field,
        resolution: &'a ResolutionContext,
        coordinator: &'a Arc<DispatchCoordinator>,
    ) -> Self {
        Self {
            source,
            field,
            resolution,
            coordinator,
        }
    }

    /// Value of the parent object this field is resolved on.
    pub fn source(&self) -> &'a Value {
        self.source
    }

    /// Selection of the field being resolved.
    pub fn field(&self) -> &'a Field {
        self.field
    }

    /// All arguments of the field being resolved.
    pub fn arguments(&self) -> &'a Object {
        self.field.arguments()
    }

    /// Looks up a single argument by its name.
    pub fn argument(&self, name: &str) -> Option<&'a Value> {
        self.field.arguments().get_field_value(name)
    }

    /// Resolution context this field is tracked under for batched loads.
    pub fn resolution(&self) -> &'a ResolutionContext {
        self.resolution
    }

    /// Dispatch coordinator of the current request.
    pub fn coordinator(&self) -> &'a Arc<DispatchCoordinator> {
        self.coordinator
    }

    /// Requests `key` from the data loader registered as `loader`.
    ///
    /// The returned value stays pending until the execution strategy
    /// dispatches the sibling fields of this one.
    pub fn load<K, V>(&self, loader: &str, key: K) -> BatchedValue<V>
    where
        K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.coordinator.load(self.resolution, loader, key)
    }

    /// Runs `f` on the executor of the current request, tracking its result
    /// as a batched value of this field.
    pub fn supply_async<T, F>(&self, f: F) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> FieldResult<T> + Send + 'static,
    {
        self.coordinator.supply_async(self.resolution, f)
    }

    /// Owned handle for issuing loads from inside continuations, after this
    /// [`Executor`] has gone out of scope.
    pub fn scope(&self) -> LoadScope {
        LoadScope::new(Arc::clone(self.coordinator), self.resolution.clone())
    }
}
