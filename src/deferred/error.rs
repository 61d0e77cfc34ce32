use std::{any::Any, error::Error as StdError, sync::Arc, time::Duration};

use arcstr::ArcStr;
use derive_more::with_trait::Display;

use crate::executor::{FieldError, IntoFieldError};

/// Reason a [`DeferredValue`] completed exceptionally.
///
/// Relayed failures are wrapped exactly once in [`Failure::Upstream`]: a
/// dependent of a dependent of a failed value carries the same `Upstream`
/// as the first dependent, so [`Failure::root_cause`] is always a single
/// step away.
///
/// [`DeferredValue`]: super::DeferredValue
#[derive(Clone, Debug, Display)]
pub enum Failure {
    /// Error raised by a resolver, a batch loader or a continuation.
    #[display("{}", _0.message())]
    Field(FieldError),

    /// The value was cancelled before it completed.
    #[display("Deferred value was cancelled")]
    Cancelled,

    /// The value did not complete within the given duration.
    #[display("Deferred value timed out after {_0:?}")]
    TimedOut(Duration),

    /// A continuation or resolver panicked.
    #[display("Panicked: {_0}")]
    Panicked(ArcStr),

    /// An earlier stage failed, so this stage could not run.
    #[display("{_0}")]
    Upstream(Arc<Upstream>),
}

/// Root cause of an [`Failure::Upstream`] relay.
#[derive(Clone, Debug, Display)]
#[display("{cause}")]
pub struct Upstream {
    cause: Failure,
    suppressed: Vec<Failure>,
}

impl Upstream {
    /// The failure of the earliest stage.
    pub fn cause(&self) -> &Failure {
        &self.cause
    }

    /// Failures raised while handling `cause` that were not allowed to
    /// replace it.
    pub fn suppressed(&self) -> &[Failure] {
        &self.suppressed
    }
}

impl Failure {
    /// Constructs a [`Failure::Field`] from anything convertible into a
    /// [`FieldError`].
    pub fn field(e: impl IntoFieldError) -> Self {
        Self::Field(e.into_field_error())
    }

    /// Wraps this failure for relaying to a dependent stage.
    ///
    /// Already relayed failures are returned as they are, never nested.
    pub fn upstream(&self) -> Self {
        match self {
            Self::Upstream(_) => self.clone(),
            cause => Self::Upstream(Arc::new(Upstream {
                cause: cause.clone(),
                suppressed: vec![],
            })),
        }
    }

    /// Relays this failure with `other` attached as suppressed.
    pub(crate) fn with_suppressed(&self, other: Self) -> Self {
        let (cause, mut suppressed) = match self {
            Self::Upstream(up) => (up.cause.clone(), up.suppressed.clone()),
            cause => (cause.clone(), vec![]),
        };
        suppressed.push(other);
        Self::Upstream(Arc::new(Upstream { cause, suppressed }))
    }

    /// Failure of the stage where things went wrong in the first place.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Upstream(up) => &up.cause,
            cause => cause,
        }
    }

    /// Indicates whether the root cause is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled)
    }

    /// Indicates whether the root cause is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::TimedOut(_))
    }

    /// Builds a [`Failure::Panicked`] out of a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            ArcStr::from(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            ArcStr::from(s.as_str())
        } else {
            arcstr::literal!("Box<dyn Any>")
        };
        Self::Panicked(msg)
    }
}

impl From<FieldError> for Failure {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl IntoFieldError for Failure {
    fn into_field_error(self) -> FieldError {
        match self.root_cause() {
            Self::Field(e) => e.clone(),
            cause => FieldError::from(cause),
        }
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Upstream(up) => Some(&up.cause),
            Self::Field(_) | Self::Cancelled | Self::TimedOut(_) | Self::Panicked(_) => None,
        }
    }
}

impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Field(a), Self::Field(b)) => a == b,
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::TimedOut(a), Self::TimedOut(b)) => a == b,
            (Self::Panicked(a), Self::Panicked(b)) => a == b,
            (Self::Upstream(a), Self::Upstream(b)) => {
                Arc::ptr_eq(a, b) || (a.cause == b.cause && a.suppressed == b.suppressed)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::executor::{FieldError, IntoFieldError as _};

    use super::Failure;

    #[test]
    fn upstream_is_never_nested() {
        let root = Failure::field("boom");
        let once = root.upstream();
        let twice = once.upstream();

        assert_eq!(once, twice);
        assert_eq!(twice.root_cause(), &root);
    }

    #[test]
    fn suppressed_failures_keep_the_root_cause() {
        let root = Failure::Cancelled;
        let relayed = root.upstream().with_suppressed(Failure::field("late"));

        let Failure::Upstream(up) = &relayed else {
            panic!("expected an upstream relay, got {relayed:?}");
        };
        assert_eq!(up.cause(), &Failure::Cancelled);
        assert_eq!(up.suppressed(), [Failure::field("late")]);
        assert!(relayed.is_cancelled());
    }

    #[test]
    fn converts_into_root_field_error() {
        assert_eq!(
            Failure::field("nope").upstream().into_field_error(),
            FieldError::from("nope"),
        );
        assert_eq!(
            Failure::TimedOut(Duration::from_millis(5)).into_field_error(),
            FieldError::from("Deferred value timed out after 5ms"),
        );
    }
}
