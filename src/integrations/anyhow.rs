//! [`FieldError`] conversion of [`anyhow::Error`].
//!
//! # Backtrace
//!
//! Backtrace is supported in the same way as [`anyhow`] crate does:
//! > If using the nightly channel, or stable with `features = ["backtrace"]`, a backtrace is
//! > captured and printed with the error if the underlying error type does not already provide its
//! > own. In order to see backtraces, they must be enabled through the environment variables
//! > described in [`std::backtrace`]:
//! > - If you want panics and errors to both have backtraces, set `RUST_BACKTRACE=1`;
//! > - If you want only errors to have backtraces, set `RUST_LIB_BACKTRACE=1`;
//! > - If you want only panics to have backtraces, set `RUST_BACKTRACE=1` and
//! >   `RUST_LIB_BACKTRACE=0`.
//!
//! A captured backtrace ends up in the `backtrace` extension of the error,
//! one list item per line.

use crate::{FieldError, IntoFieldError, Value};

impl IntoFieldError for anyhow::Error {
    fn into_field_error(self) -> FieldError {
        #[cfg(any(nightly, feature = "backtrace"))]
        let extensions = {
            let backtrace = self.backtrace().to_string();
            if backtrace == "disabled backtrace" {
                Value::null()
            } else {
                let mut obj = crate::value::Object::with_capacity(1);
                _ = obj.add_field(
                    "backtrace",
                    backtrace.split('\n').map(str::to_owned).collect(),
                );
                Value::object(obj)
            }
        };
        #[cfg(not(any(nightly, feature = "backtrace")))]
        let extensions = Value::null();

        FieldError::new(self, extensions)
    }
}
