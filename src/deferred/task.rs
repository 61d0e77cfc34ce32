//! Executors running continuations and asynchronous resolvers.

use std::{
    sync::{Arc, LazyLock, Mutex, PoisonError},
    thread,
};

use futures::{
    executor::{ThreadPool, block_on},
    future::BoxFuture,
};

/// Unit of work submitted to a [`TaskExecutor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs [`Task`]s, usually on other threads.
pub trait TaskExecutor: Send + Sync {
    /// Submits `task` for execution.
    fn execute(&self, task: Task);

    /// Submits a future to be driven to completion.
    ///
    /// By default the future is blocked on inside a single [`Task`].
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        self.execute(Box::new(move || block_on(fut)));
    }
}

impl<E: TaskExecutor + ?Sized> TaskExecutor for Arc<E> {
    fn execute(&self, task: Task) {
        (**self).execute(task);
    }

    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        (**self).spawn(fut);
    }
}

impl TaskExecutor for ThreadPool {
    fn execute(&self, task: Task) {
        self.spawn_ok(async move { task() });
    }

    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        self.spawn_ok(fut);
    }
}

/// Runs every task on a fresh thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPerTask;

impl TaskExecutor for ThreadPerTask {
    fn execute(&self, task: Task) {
        spawn_named("juniper-deferred-task", task, &Inline);
    }
}

/// Runs `task` on a new thread named `name`.
///
/// Spawning only fails when the OS is out of resources. The task still gets
/// to run then, just on `fallback`.
pub(crate) fn spawn_named(name: &str, task: Task, fallback: &dyn TaskExecutor) {
    let slot = Arc::new(Mutex::new(Some(task)));
    let theirs = Arc::clone(&slot);
    let spawned = thread::Builder::new().name(name.into()).spawn(move || {
        if let Some(task) = take(&theirs) {
            task();
        }
    });
    if let Err(e) = spawned {
        __trace_warn!("failed to spawn `{name}` thread, using fallback: {e}");
        if let Some(task) = take(&slot) {
            fallback.execute(task);
        }
    }
}

fn take(slot: &Mutex<Option<Task>>) -> Option<Task> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Runs every task right away on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl TaskExecutor for Inline {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Returns the executor shared by everything not given one explicitly.
///
/// This is a [`ThreadPool`] with one thread per CPU, or [`ThreadPerTask`] if
/// the pool cannot be created.
pub fn default_executor() -> Arc<dyn TaskExecutor> {
    static DEFAULT: LazyLock<Arc<dyn TaskExecutor>> = LazyLock::new(|| {
        match ThreadPool::builder()
            .name_prefix("juniper-deferred-")
            .create()
        {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                __trace_error!("failed to create the default thread pool: {e}");
                Arc::new(ThreadPerTask)
            }
        }
    });
    Arc::clone(&DEFAULT)
}
