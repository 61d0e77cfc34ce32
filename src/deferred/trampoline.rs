//! Per-thread drain queue for completion cascades.
//!
//! Completing a value fires its continuations, which usually complete
//! dependent values, which fire their own continuations, and so on. Running
//! that recursively would grow the stack with the length of the chain, so the
//! outermost completion on a thread becomes the drainer: nested completions
//! only enqueue their fan-out, and the drainer runs it in a loop.

use std::{
    cell::RefCell,
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
};

pub(crate) type Job = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Resets the queue when the outermost drainer finishes.
struct Drainer;

impl Drop for Drainer {
    fn drop(&mut self) {
        QUEUE.with(|q| *q.borrow_mut() = None);
    }
}

/// Runs `job` now if this thread is not draining already, otherwise queues
/// it behind the jobs of the current drain.
pub(crate) fn schedule(job: Job) {
    let job = QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        match q.as_mut() {
            Some(queue) => {
                queue.push_back(job);
                None
            }
            None => {
                *q = Some(VecDeque::new());
                Some(job)
            }
        }
    });
    if let Some(job) = job {
        let _drainer = Drainer;
        run(job);
        flush();
    }
}

/// Runs `job`, containing its panic so the jobs queued behind it still run.
fn run(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        __trace_error!("completion job panicked");
    }
}

/// Runs every job queued on this thread so far, including the ones they
/// queue in turn.
///
/// Outside of a drain there is nothing queued, so this is a no-op.
pub(crate) fn flush() {
    while let Some(job) = QUEUE.with(|q| q.borrow_mut().as_mut().and_then(VecDeque::pop_front)) {
        run(job);
    }
}

/// Indicates whether the current thread is inside a completion drain.
#[cfg(test)]
pub(crate) fn is_draining() -> bool {
    QUEUE.with(|q| q.borrow().is_some())
}
