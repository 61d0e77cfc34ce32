use std::mem;

use super::{ResolutionSet, batched::PendingEntry};

/// Buffer of batched values requested after their resolution was already
/// dispatched to completion.
///
/// Everything buffered within one window is dispatched together when the
/// window closes.
#[derive(Debug, Default)]
pub(super) struct BatchWindow {
    contexts: ResolutionSet,
    entries: Vec<PendingEntry>,
    scheduled: bool,
}

impl BatchWindow {
    /// Buffers `entry`.
    ///
    /// Returns `true` if this opened the window, so a flush has to be
    /// scheduled for it.
    pub(super) fn push(&mut self, entry: PendingEntry) -> bool {
        _ = self.contexts.insert(entry.resolution.clone());
        self.entries.push(entry);
        !mem::replace(&mut self.scheduled, true)
    }

    /// Closes the window, handing out everything buffered in it.
    pub(super) fn take(&mut self) -> (ResolutionSet, Vec<PendingEntry>) {
        self.scheduled = false;
        (mem::take(&mut self.contexts), mem::take(&mut self.entries))
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::dispatch::{ResolutionContext, batched::PendingEntry, latch::SettleSlot};

    use super::BatchWindow;

    fn entry(resolution: &ResolutionContext) -> PendingEntry {
        PendingEntry {
            resolution: resolution.clone(),
            loader: Some("users".into()),
            slot: Arc::new(SettleSlot::default()),
        }
    }

    #[test]
    fn opens_once_per_flush() {
        let late = ResolutionContext::new("friends");
        let mut window = BatchWindow::default();

        assert!(window.push(entry(&late)));
        assert!(!window.push(entry(&late)));
        assert_eq!(window.len(), 2);

        let (contexts, entries) = window.take();
        assert_eq!(contexts.len(), 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(window.len(), 0);

        assert!(window.push(entry(&late)));
    }
}
