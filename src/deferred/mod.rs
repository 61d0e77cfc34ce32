//! Single-assignment deferred values and their combinators.
//!
//! A [`DeferredValue`] is completed at most once, with either a value or a
//! [`Failure`]. Continuations registered on it fire exactly once after
//! completion: on the registering thread if the value is already complete,
//! otherwise on whichever thread completes it. Cascades of dependent
//! completions are drained iteratively, so chains of any length complete
//! without growing the stack.

mod blocking;
mod combinators;
mod error;
mod future;
mod task;
mod timer;
mod trampoline;

use std::{
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread::Thread,
};

use derive_more::with_trait::Display;
use futures::task::AtomicWaker;

pub use self::{
    combinators::{CombinedBuilder, each, each_sequentially, try_catch},
    error::{Failure, Upstream},
    task::{Inline, Task, TaskExecutor, ThreadPerTask, default_executor},
    timer::{Delayer, DelayedExecutor, ScheduledTask},
};
pub(crate) use self::{
    task::spawn_named,
    trampoline::{flush, schedule as drain},
};

/// Outcome of a completed [`DeferredValue`].
pub type Outcome<T> = Result<T, Failure>;

type Completion<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

/// Identity of the logical request a [`DeferredValue`] belongs to.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("request#{_0}")]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates a process-wide unique identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct Inner<T> {
    owner: Option<RequestId>,
    result: OnceLock<Outcome<T>>,
    /// `None` once the completing party took the registered continuations.
    completions: Mutex<Option<Vec<Completion<T>>>>,
    /// Threads blocked until completion.
    parked: Mutex<Vec<Thread>>,
}

/// Single-assignment cell holding the eventual outcome of a computation.
///
/// Cloning is cheap and every clone observes the same cell.
pub struct DeferredValue<T> {
    inner: Arc<Inner<T>>,
    /// Waker slot of this handle, registered while it is polled as a
    /// [`Future`](std::future::Future).
    waker: Option<Arc<AtomicWaker>>,
}

impl<T> Clone for DeferredValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            waker: None,
        }
    }
}

impl<T> DeferredValue<T> {
    fn from_inner(inner: Arc<Inner<T>>) -> Self {
        Self { inner, waker: None }
    }

    /// Indicates whether both handles observe the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for DeferredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DeferredValue");
        if let Some(owner) = &self.inner.owner {
            _ = s.field("owner", owner);
        }
        match self.inner.result.get() {
            Some(outcome) => s.field("result", outcome),
            None => s.field("result", &format_args!("<pending>")),
        }
        .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f`, turning a panic into a [`Failure::Panicked`].
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Outcome<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Failure::from_panic)
}

impl<T: Send + Sync + 'static> DeferredValue<T> {
    /// Creates an incomplete value tagged with `owner`.
    pub fn pending(owner: Option<RequestId>) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner,
                result: OnceLock::new(),
                completions: Mutex::new(Some(vec![])),
                parked: Mutex::default(),
            }),
            waker: None,
        }
    }

    /// Creates an incomplete value that belongs to no request.
    pub fn new() -> Self {
        Self::pending(None)
    }

    /// Creates a value that is already complete with `outcome`.
    pub fn resolved(owner: Option<RequestId>, outcome: Outcome<T>) -> Self {
        let result = OnceLock::new();
        _ = result.set(outcome);
        Self {
            inner: Arc::new(Inner {
                owner,
                result,
                completions: Mutex::new(None),
                parked: Mutex::default(),
            }),
            waker: None,
        }
    }

    /// Creates a value that is already complete with `value`.
    pub fn completed(value: T) -> Self {
        Self::resolved(None, Ok(value))
    }

    /// Creates a value that already failed with `failure`.
    pub fn failed(failure: impl Into<Failure>) -> Self {
        Self::resolved(None, Err(failure.into()))
    }

    /// Request this value belongs to, if any.
    pub fn owner(&self) -> Option<RequestId> {
        self.inner.owner
    }

    /// Creates an incomplete value with the same owner as this one.
    pub(crate) fn dependent<U: Send + Sync + 'static>(&self) -> DeferredValue<U> {
        DeferredValue::pending(self.inner.owner)
    }

    /// Outcome of this value, if it completed already.
    pub fn peek(&self) -> Option<&Outcome<T>> {
        self.inner.result.get()
    }

    /// Indicates whether this value completed in any fashion.
    pub fn is_done(&self) -> bool {
        self.inner.result.get().is_some()
    }

    /// Indicates whether this value completed with a [`Failure`].
    pub fn is_completed_exceptionally(&self) -> bool {
        matches!(self.inner.result.get(), Some(Err(_)))
    }

    /// Indicates whether this value was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.result.get(), Some(Err(Failure::Cancelled)))
    }

    /// Number of continuations still waiting for this value.
    pub fn dependent_count(&self) -> usize {
        lock(&self.inner.completions).as_ref().map_or(0, Vec::len)
    }

    /// Completes this value with `value`.
    ///
    /// Returns `false` if it was completed already, leaving the result as is.
    pub fn complete(&self, value: T) -> bool {
        self.complete_with(Ok(value))
    }

    /// Completes this value with `failure`.
    ///
    /// Returns `false` if it was completed already, leaving the result as is.
    pub fn complete_exceptionally(&self, failure: impl Into<Failure>) -> bool {
        self.complete_with(Err(failure.into()))
    }

    /// Completes this value with [`Failure::Cancelled`].
    pub fn cancel(&self) -> bool {
        self.complete_with(Err(Failure::Cancelled))
    }

    /// Completes this value with `outcome`, firing every registered
    /// continuation.
    pub fn complete_with(&self, outcome: Outcome<T>) -> bool {
        if self.inner.result.set(outcome).is_err() {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        trampoline::schedule(Box::new(move || inner.fire()));
        true
    }

    /// Registers `f` to run once with the outcome of this value.
    ///
    /// If this value is complete already, `f` runs right away on the calling
    /// thread.
    pub(crate) fn subscribe(&self, f: impl FnOnce(&Outcome<T>) + Send + 'static) {
        {
            let mut completions = lock(&self.inner.completions);
            if let Some(pending) = completions.as_mut() {
                pending.push(Box::new(f));
                return;
            }
        }
        if let Some(outcome) = self.inner.result.get() {
            f(outcome);
        }
    }
}

impl<T: Send + Sync + 'static> Default for DeferredValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inner<T> {
    fn fire(&self) {
        for waiter in mem::take(&mut *lock(&self.parked)) {
            waiter.unpark();
        }
        let Some(completions) = lock(&self.completions).take() else {
            return;
        };
        let Some(outcome) = self.result.get() else {
            return;
        };
        for f in completions {
            f(outcome);
        }
    }
}

static_assertions::assert_impl_all!(DeferredValue<crate::Value>: Clone, Send, Sync);
static_assertions::assert_impl_all!(RequestId: Copy, Send, Sync);

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use super::{DeferredValue, Failure, RequestId};

    #[test]
    fn completes_only_once() {
        let d = DeferredValue::new();

        assert!(d.complete(1));
        assert!(!d.complete(2));
        assert!(!d.complete_exceptionally(Failure::field("late")));
        assert!(!d.cancel());
        assert_eq!(d.peek(), Some(&Ok(1)));
    }

    #[test]
    fn cancel_is_an_exceptional_completion() {
        let d = DeferredValue::<i32>::new();

        assert!(d.cancel());
        assert!(d.is_done());
        assert!(d.is_cancelled());
        assert!(d.is_completed_exceptionally());
    }

    #[test]
    fn continuations_fire_exactly_once() {
        let d = DeferredValue::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fired = fired.clone();
            d.subscribe(move |_| _ = fired.fetch_add(1, Ordering::SeqCst));
        }
        assert_eq!(d.dependent_count(), 3);

        assert!(d.complete("done"));
        assert!(!d.complete("again"));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(d.dependent_count(), 0);

        let late = fired.clone();
        d.subscribe(move |_| _ = late.fetch_add(1, Ordering::SeqCst));
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn racing_completions_have_one_winner() {
        let d = DeferredValue::new();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            d.subscribe(move |_| _ = fired.fetch_add(1, Ordering::SeqCst));
        }

        let winners: usize = (0..8)
            .map(|i| {
                let d = d.clone();
                thread::spawn(move || usize::from(d.complete(i)))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();

        assert_eq!(winners, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn long_chains_do_not_overflow() {
        let head = DeferredValue::new();
        let mut tail = head.clone();
        for _ in 0..100_000 {
            tail = tail.map(|v: &u64| v + 1);
        }

        assert!(head.complete(0));
        assert_eq!(tail.peek(), Some(&Ok(100_000)));
    }

    #[test]
    fn dependents_inherit_owner() {
        let owner = RequestId::next();
        let d = DeferredValue::pending(Some(owner));

        assert_eq!(d.map(|v: &i32| v * 2).owner(), Some(owner));
        assert_eq!(DeferredValue::completed(1).owner(), None);
    }
}
