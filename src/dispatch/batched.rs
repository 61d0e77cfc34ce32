use std::{any::Any, fmt, sync::Arc};

use arcstr::ArcStr;
use derive_more::with_trait::Deref;

use crate::deferred::DeferredValue;

use super::{ResolutionContext, latch::SettleSlot};

/// [`DeferredValue`] obtained through the dispatch coordinator of a request.
///
/// With a loader name, it is backed by a key queued on that
/// [`DataLoader`]. Without one, it is completed by a computation supplied to
/// [`DispatchCoordinator::supply_async`] or [`DispatchCoordinator::wrap`],
/// but tracked the same way.
///
/// [`DataLoader`]: crate::DataLoader
/// [`DispatchCoordinator::supply_async`]: super::DispatchCoordinator::supply_async
/// [`DispatchCoordinator::wrap`]: super::DispatchCoordinator::wrap
#[derive(Deref)]
pub struct BatchedValue<T> {
    #[deref]
    value: DeferredValue<T>,
    loader: Option<ArcStr>,
    key: Option<Arc<dyn Any + Send + Sync>>,
    resolution: ResolutionContext,
}

impl<T> Clone for BatchedValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            loader: self.loader.clone(),
            key: self.key.clone(),
            resolution: self.resolution.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BatchedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchedValue")
            .field("loader", &self.loader)
            .field("resolution", &self.resolution)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl<T> BatchedValue<T> {
    pub(super) fn new(
        value: DeferredValue<T>,
        loader: Option<ArcStr>,
        key: Option<Arc<dyn Any + Send + Sync>>,
        resolution: ResolutionContext,
    ) -> Self {
        Self {
            value,
            loader,
            key,
            resolution,
        }
    }

    /// Name of the loader backing this value, if any.
    pub fn loader_name(&self) -> Option<&str> {
        self.loader.as_deref()
    }

    /// Key this value was loaded by, if it was loaded by a `K` key.
    pub fn key<K: 'static>(&self) -> Option<&K> {
        self.key.as_deref()?.downcast_ref()
    }

    /// Resolution this value was requested for.
    pub fn resolution(&self) -> &ResolutionContext {
        &self.resolution
    }

    /// Indicates whether this value is completed by a supplied computation
    /// rather than a loader.
    pub fn is_manual(&self) -> bool {
        self.loader.is_none()
    }

    /// Drops the bookkeeping, keeping only the value.
    pub fn into_deferred(self) -> DeferredValue<T> {
        self.value
    }
}

/// Registry record of a batched value that was not dispatched yet.
pub(super) struct PendingEntry {
    pub(super) resolution: ResolutionContext,
    pub(super) loader: Option<ArcStr>,
    pub(super) slot: Arc<SettleSlot>,
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("resolution", &self.resolution)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}
