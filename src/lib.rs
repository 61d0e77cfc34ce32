#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

#[macro_use]
mod macros;
mod ast;
pub mod deferred;
pub mod dispatch;
pub mod executor;
pub mod integrations;
pub mod loader;
mod resolve;
mod schema;
mod value;

#[cfg(test)]
mod executor_tests;

pub use crate::{
    ast::Field,
    deferred::{DeferredValue, Failure, Outcome, RequestId, TaskExecutor},
    dispatch::{
        BatchedValue, DispatchConfig, DispatchCoordinator, LoadScope, ResolutionContext,
        ResolutionSet,
    },
    executor::{
        ExecutionError, ExecutionOutput, Executor, FieldError, FieldResult, IntoFieldError,
        PathSegment, execute, execute_sync,
    },
    loader::{BatchLoader, DataLoader, DataLoaderOptions, DataLoaderRegistry, Statistics},
    resolve::Resolved,
    schema::{FieldDefinition, FieldType, ObjectType, Resolver, Schema},
    value::{DefaultScalarValue, Object, Value},
};
