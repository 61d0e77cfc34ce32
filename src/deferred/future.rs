//! Interop with [`std::future::Future`].

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::task::AtomicWaker;

use super::{DeferredValue, Outcome, RequestId, TaskExecutor, default_executor};

impl<T: Clone + Send + Sync + 'static> Future for DeferredValue<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.peek() {
            return Poll::Ready(outcome.clone());
        }
        match &this.waker {
            Some(waker) => waker.register(cx.waker()),
            None => {
                let waker = Arc::new(AtomicWaker::new());
                waker.register(cx.waker());
                let wake = Arc::clone(&waker);
                this.subscribe(move |_| wake.wake());
                this.waker = Some(waker);
            }
        }
        // Completion may have raced with the registration above.
        match this.peek() {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => Poll::Pending,
        }
    }
}

impl<T: Send + Sync + 'static> DeferredValue<T> {
    /// Drives `fut` on the default executor, completing the returned value
    /// with its output.
    pub fn from_future<F>(owner: Option<RequestId>, fut: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self::spawn(owner, fut, &*default_executor())
    }

    /// Drives `fut` on `executor`, completing the returned value with its
    /// output.
    pub fn spawn<F, E>(owner: Option<RequestId>, fut: F, executor: &E) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
        E: TaskExecutor + ?Sized,
    {
        let value = Self::pending(owner);
        let d = value.clone();
        executor.spawn(Box::pin(async move {
            _ = d.complete_with(fut.await);
        }));
        value
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::deferred::{DeferredValue, Failure, Inline};

    #[tokio::test]
    async fn awaits_a_value_completed_elsewhere() {
        let d = DeferredValue::new();
        let completer = d.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            completer.complete("later")
        });

        assert_eq!(d.await, Ok("later"));
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn awaits_failures() {
        let d = DeferredValue::<i32>::failed(Failure::Cancelled);

        assert_eq!(d.await, Err(Failure::Cancelled));
    }

    #[test]
    fn wraps_futures() {
        let d = DeferredValue::spawn(None, async { Ok(5) }, &Inline);

        assert_eq!(d.join(), Ok(5));
    }

    #[test]
    fn wraps_futures_on_the_default_executor() {
        let d = DeferredValue::from_future(None, async { Err::<i32, _>(Failure::Cancelled) });

        assert!(d.join().unwrap_err().is_cancelled());
    }
}
