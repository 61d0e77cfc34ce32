//! Boundary between user-supplied resolvers and the engine.

use crate::{
    deferred::{DeferredValue, Failure, RequestId},
    dispatch::BatchedValue,
    executor::{FieldError, FieldResult, IntoFieldError},
};

/// What a resolver or a batch loader hands back to the engine: either an
/// already known result, or a value that completes later.
#[derive(Debug)]
pub enum Resolved<T> {
    /// Result known at the time the resolver returns.
    Sync(FieldResult<T>),

    /// Result that completes later.
    Async(DeferredValue<T>),
}

impl<T: Send + Sync + 'static> Resolved<T> {
    /// Resolves to `value` right away.
    pub fn ok(value: T) -> Self {
        Self::Sync(Ok(value))
    }

    /// Fails right away with `error`.
    pub fn err(error: impl IntoFieldError) -> Self {
        Self::Sync(Err(error.into_field_error()))
    }

    /// Indicates whether the result is known already.
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }

    /// Converts into a [`DeferredValue`] tagged with `owner` (when one has to
    /// be created).
    pub fn into_deferred(self, owner: Option<RequestId>) -> DeferredValue<T> {
        match self {
            Self::Sync(res) => DeferredValue::resolved(owner, res.map_err(Failure::Field)),
            Self::Async(value) => value,
        }
    }

    /// Applies `f` to the eventual value.
    pub fn map<U, F>(self, f: F) -> Resolved<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        match self {
            Self::Sync(res) => Resolved::Sync(res.map(|v| f(&v))),
            Self::Async(value) => Resolved::Async(value.map(f)),
        }
    }
}

impl<T> From<FieldResult<T>> for Resolved<T> {
    fn from(res: FieldResult<T>) -> Self {
        Self::Sync(res)
    }
}

impl<T> From<FieldError> for Resolved<T> {
    fn from(e: FieldError) -> Self {
        Self::Sync(Err(e))
    }
}

impl<T> From<DeferredValue<T>> for Resolved<T> {
    fn from(value: DeferredValue<T>) -> Self {
        Self::Async(value)
    }
}

impl<T> From<BatchedValue<T>> for Resolved<T> {
    fn from(value: BatchedValue<T>) -> Self {
        Self::Async(value.into_deferred())
    }
}
