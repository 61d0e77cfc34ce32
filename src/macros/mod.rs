//! Crate-internal helper macros.

#[macro_use]
mod tracing;
