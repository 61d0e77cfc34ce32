use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// One-shot countdown latch.
#[derive(Debug)]
pub(crate) struct Latch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl Latch {
    pub(crate) fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(count),
            zero: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn count_down(&self) {
        let mut count = self.lock();
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                self.zero.notify_all();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        *self.lock()
    }

    /// Blocks until the count reaches zero.
    pub(crate) fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self.zero.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    settled: bool,
    latch: Option<Arc<Latch>>,
}

/// Connects a batched value to the latch of the dispatch pass it was drained
/// by.
///
/// The value settles once it completed and its synchronous continuations
/// ran. Attaching a latch to an already settled slot counts it down at once.
#[derive(Debug, Default)]
pub(crate) struct SettleSlot(Mutex<SlotState>);

impl SettleSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn attach(&self, latch: &Arc<Latch>) {
        let mut state = self.lock();
        if state.settled {
            drop(state);
            latch.count_down();
        } else {
            state.latch = Some(Arc::clone(latch));
        }
    }

    pub(crate) fn settle(&self) {
        let latch = {
            let mut state = self.lock();
            state.settled = true;
            state.latch.take()
        };
        if let Some(latch) = latch {
            latch.count_down();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_settled(&self) -> bool {
        self.lock().settled
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::{Latch, SettleSlot};

    #[test]
    fn latch_releases_waiter_at_zero() {
        let latch = Latch::new(2);
        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait())
        };

        latch.count_down();
        thread::sleep(Duration::from_millis(5));
        assert!(!waiter.is_finished());

        latch.count_down();
        waiter.join().unwrap();
        assert_eq!(latch.count(), 0);

        latch.count_down();
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn settled_slot_counts_down_on_attach() {
        let latch = Latch::new(2);
        let early = SettleSlot::default();
        let late = SettleSlot::default();

        early.settle();
        early.attach(&latch);
        late.attach(&latch);
        assert_eq!(latch.count(), 1);

        late.settle();
        assert!(late.is_settled());
        assert_eq!(latch.count(), 0);
    }
}
