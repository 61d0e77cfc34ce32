use std::{
    thread,
    time::{Duration, Instant},
};

use super::{DeferredValue, Failure, Outcome, lock};

impl<T: Clone + Send + Sync + 'static> DeferredValue<T> {
    /// Blocks the current thread until this value completes.
    ///
    /// Returns immediately if it is complete already. Must not be called from
    /// a continuation that is itself needed to complete this value: the
    /// continuation would wait for itself.
    pub fn join(&self) -> Outcome<T> {
        if let Some(outcome) = self.peek() {
            return outcome.clone();
        }
        self.park_until_done(None);
        self.peek().cloned().unwrap_or(Err(Failure::Cancelled))
    }

    /// Blocks the current thread until this value completes or `timeout`
    /// elapses, whichever happens first.
    ///
    /// Running out of time yields [`Failure::TimedOut`] without completing
    /// this value.
    pub fn get_timeout(&self, timeout: Duration) -> Outcome<T> {
        if let Some(outcome) = self.peek() {
            return outcome.clone();
        }
        self.park_until_done(Some(Instant::now() + timeout));
        self.peek()
            .cloned()
            .unwrap_or(Err(Failure::TimedOut(timeout)))
    }

    /// Returns a clone of the outcome if this value completed already.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.peek().cloned()
    }

    fn park_until_done(&self, deadline: Option<Instant>) {
        let waiter = thread::current();
        let id = waiter.id();
        lock(&self.inner.parked).push(waiter);
        // `park` may return spuriously, so the result is re-checked each time.
        while !self.is_done() {
            match deadline {
                None => thread::park(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::park_timeout(deadline - now);
                }
            }
        }
        lock(&self.inner.parked).retain(|t| t.id() != id);
    }
}
