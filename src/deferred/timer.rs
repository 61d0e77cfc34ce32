//! Single-threaded delay scheduler.

use std::{
    cmp::{Ordering as CmpOrdering, Reverse},
    fmt,
    collections::BinaryHeap,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, LazyLock, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use super::{DeferredValue, Failure, Task, TaskExecutor};

/// Task slot shared by a queue entry and its [`ScheduledTask`] handle.
///
/// Emptied either by the scheduler thread running the task or by
/// [`ScheduledTask::cancel`].
type Slot = Arc<Mutex<Option<Task>>>;

fn take(slot: &Slot) -> Option<Task> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

struct Entry {
    deadline: Instant,
    seq: u64,
    task: Slot,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        (self.deadline, self.seq) == (other.deadline, other.seq)
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

#[derive(Default)]
struct Queue {
    entries: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        let mut queue = self.lock();
        loop {
            if queue.shutdown {
                return;
            }
            let now = Instant::now();
            match queue.entries.peek() {
                None => {
                    queue = self
                        .wakeup
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(Reverse(next)) if next.deadline > now => {
                    let timeout = next.deadline - now;
                    queue = self
                        .wakeup
                        .wait_timeout(queue, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                Some(_) => {
                    let Some(Reverse(entry)) = queue.entries.pop() else {
                        continue;
                    };
                    drop(queue);
                    if let Some(task) = take(&entry.task) {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            __trace_error!("scheduled task panicked");
                        }
                    }
                    queue = self.lock();
                }
            }
        }
    }
}

/// Shuts the timer thread down once the last [`Delayer`] handle is gone.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) {
        self.0.lock().shutdown = true;
        self.0.wakeup.notify_all();
    }
}

/// Runs tasks after a delay on one dedicated thread.
///
/// Tasks are meant to be short: typically they complete a value or hand the
/// real work over to a [`TaskExecutor`].
#[derive(Clone)]
pub struct Delayer {
    owner: Arc<Owner>,
}

impl Delayer {
    /// Starts a new scheduler thread named `name`.
    ///
    /// If the thread cannot be spawned, scheduled tasks never run.
    pub fn new(name: &str) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        if let Err(e) = thread::Builder::new()
            .name(name.into())
            .spawn(move || worker.run())
        {
            __trace_error!("failed to spawn delay scheduler thread: {e}");
        }
        Self {
            owner: Arc::new(Owner(shared)),
        }
    }

    /// Returns the scheduler shared by the whole process.
    pub fn shared() -> Self {
        static SHARED: LazyLock<Delayer> =
            LazyLock::new(|| Delayer::new("juniper-deferred-delayer"));
        SHARED.clone()
    }

    /// Runs `task` on the scheduler thread once `delay` elapsed.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> ScheduledTask {
        let slot: Slot = Arc::new(Mutex::new(Some(Box::new(task))));
        let shared = &self.owner.0;
        {
            let mut queue = shared.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.entries.push(Reverse(Entry {
                deadline: Instant::now() + delay,
                seq,
                task: Arc::clone(&slot),
            }));
        }
        shared.wakeup.notify_one();
        ScheduledTask {
            task: slot,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of tasks waiting for their deadline, cancelled ones included.
    pub fn queued(&self) -> usize {
        self.owner.0.lock().entries.len()
    }

    /// Returns an executor submitting every task to `executor` once `delay`
    /// elapsed.
    pub fn delayed_executor<E: TaskExecutor + 'static>(
        &self,
        delay: Duration,
        executor: E,
    ) -> DelayedExecutor {
        DelayedExecutor {
            delayer: self.clone(),
            delay,
            executor: Arc::new(executor),
        }
    }
}

/// Handle of a task scheduled on a [`Delayer`].
#[derive(Clone)]
pub struct ScheduledTask {
    task: Slot,
    cancelled: Arc<AtomicBool>,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ScheduledTask {
    /// Prevents the task from running, if it did not start yet, and drops
    /// it right away.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        drop(take(&self.task));
    }

    /// Indicates whether [`ScheduledTask::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// [`TaskExecutor`] submitting tasks to another one after a fixed delay.
#[derive(Clone)]
pub struct DelayedExecutor {
    delayer: Delayer,
    delay: Duration,
    executor: Arc<dyn TaskExecutor>,
}

impl TaskExecutor for DelayedExecutor {
    fn execute(&self, task: Task) {
        let executor = Arc::clone(&self.executor);
        _ = self
            .delayer
            .schedule(self.delay, move || executor.execute(task));
    }
}

impl<T: Send + Sync + 'static> DeferredValue<T> {
    /// Fails this value with [`Failure::TimedOut`] unless it completes within
    /// `timeout`.
    ///
    /// The timeout task is cancelled as soon as this value completes.
    pub fn or_timeout(&self, timeout: Duration) -> Self {
        self.race_timeout(timeout, move || Err(Failure::TimedOut(timeout)))
    }

    /// Completes this value with `value` unless it completes otherwise within
    /// `timeout`.
    pub fn complete_on_timeout(&self, value: T, timeout: Duration) -> Self {
        self.race_timeout(timeout, move || Ok(value))
    }

    fn race_timeout(
        &self,
        timeout: Duration,
        outcome: impl FnOnce() -> Result<T, Failure> + Send + 'static,
    ) -> Self {
        if !self.is_done() {
            let target = self.clone();
            let task = Delayer::shared().schedule(timeout, move || {
                _ = target.complete_with(outcome());
            });
            self.subscribe(move |_| task.cancel());
        }
        self.clone()
    }
}
