//! Conversions of third-party error types into field errors.

#[cfg(feature = "anyhow")]
pub mod anyhow;
