//! Request-scoped coordination of batched loads.
//!
//! Every field resolution gets a [`ResolutionContext`]. Batched values
//! requested through a [`DispatchCoordinator`] are registered under the
//! context they were requested for, and [`DispatchCoordinator::dispatch`]
//! triggers the loaders of a whole set of contexts at once. Values requested
//! for a context that was dispatched to completion already are buffered and
//! dispatched together after a short window instead.

mod batched;
mod latch;
mod resolution;
mod window;

use std::{
    any::Any,
    fmt,
    hash::Hash,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::{
    deferred::{
        Delayer, DeferredValue, Failure, RequestId, TaskExecutor, default_executor, drain, flush,
        spawn_named,
    },
    executor::FieldResult,
    loader::DataLoaderRegistry,
};

use self::{
    batched::PendingEntry,
    latch::{Latch, SettleSlot},
    window::BatchWindow,
};

pub use self::{
    batched::BatchedValue,
    resolution::{ResolutionContext, ResolutionSet},
};

/// Configuration of a [`DispatchCoordinator`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long values requested for finished resolutions are buffered
    /// before being dispatched together.
    pub batch_window: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_micros(500),
        }
    }
}

impl DispatchConfig {
    /// Sets [`DispatchConfig::batch_window`].
    #[must_use]
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }
}

#[derive(Debug, Default)]
struct Registries {
    pending: Vec<PendingEntry>,
    finished: ResolutionSet,
}

/// Batch dispatch coordinator of a single request.
///
/// Nothing is shared between coordinators, so requests never wait on each
/// other.
pub struct DispatchCoordinator {
    id: RequestId,
    loaders: DataLoaderRegistry,
    config: DispatchConfig,
    executor: Arc<dyn TaskExecutor>,
    delayer: Delayer,
    registries: Mutex<Registries>,
    window: Mutex<BatchWindow>,
    /// Resolutions of the current synchronous burst, see
    /// [`DispatchCoordinator::defer_dispatch`].
    burst: Mutex<ResolutionSet>,
}

impl fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("id", &self.id)
            .field("loaders", &self.loaders)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder of a [`DispatchCoordinator`].
pub struct DispatchCoordinatorBuilder {
    loaders: DataLoaderRegistry,
    config: DispatchConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    delayer: Option<Delayer>,
}

impl fmt::Debug for DispatchCoordinatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchCoordinatorBuilder")
            .field("loaders", &self.loaders)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DispatchCoordinatorBuilder {
    /// Uses `config` instead of [`DispatchConfig::default`].
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs supplied computations and window flushes on `executor` instead
    /// of the [`default_executor`].
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Schedules window flushes on `delayer` instead of the
    /// [`Delayer::shared`] one.
    #[must_use]
    pub fn delayer(mut self, delayer: Delayer) -> Self {
        self.delayer = Some(delayer);
        self
    }

    /// Creates the coordinator of a new request.
    pub fn build(self) -> Arc<DispatchCoordinator> {
        Arc::new(DispatchCoordinator {
            id: RequestId::next(),
            loaders: self.loaders,
            config: self.config,
            executor: self.executor.unwrap_or_else(default_executor),
            delayer: self.delayer.unwrap_or_else(Delayer::shared),
            registries: Mutex::default(),
            window: Mutex::default(),
            burst: Mutex::default(),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DispatchCoordinator {
    /// Creates the coordinator of a new request with default configuration.
    pub fn new(loaders: DataLoaderRegistry) -> Arc<Self> {
        Self::builder(loaders).build()
    }

    /// Starts building the coordinator of a new request.
    pub fn builder(loaders: DataLoaderRegistry) -> DispatchCoordinatorBuilder {
        DispatchCoordinatorBuilder {
            loaders,
            config: DispatchConfig::default(),
            executor: None,
            delayer: None,
        }
    }

    /// Identity of the request, carried by every value this coordinator
    /// creates.
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Loaders of the request.
    pub fn loaders(&self) -> &DataLoaderRegistry {
        &self.loaders
    }

    /// Configuration of this coordinator.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of registered values waiting for a dispatch.
    pub fn pending_count(&self) -> usize {
        lock(&self.registries).pending.len()
    }

    /// Number of late values waiting for the batch window to close.
    pub fn buffered_count(&self) -> usize {
        lock(&self.window).len()
    }

    /// Indicates whether `resolution` was dispatched to completion.
    pub fn is_finished(&self, resolution: &ResolutionContext) -> bool {
        lock(&self.registries).finished.contains(resolution)
    }

    /// Requests the value of `key` from the loader registered under `name`.
    ///
    /// The key is queued on the loader right away, but the loader is only
    /// triggered by a dispatch of `resolution`, or by the batch window if
    /// `resolution` is finished already. An unknown loader yields a failed
    /// value.
    pub fn load<K, V>(
        self: &Arc<Self>,
        resolution: &ResolutionContext,
        name: &str,
        key: K,
    ) -> BatchedValue<V>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let name = ArcStr::from(name);
        let Some(loader) = self.loaders.get::<K, V>(&name) else {
            __trace_warn!("{}: no data loader `{name}` for `{resolution}`", self.id);
            let failure = Failure::field(format!("No data loader registered under `{name}`"));
            return BatchedValue::new(
                DeferredValue::resolved(Some(self.id), Err(failure)),
                Some(name),
                Some(Arc::new(key)),
                resolution.clone(),
            );
        };
        let source = loader.load(key.clone());
        self.track(resolution, Some(name), Some(Arc::new(key)), &source)
    }

    /// Runs `f` on the executor of this coordinator.
    ///
    /// The returned value is tracked like a loaded one, so dispatching
    /// `resolution` waits for it and for the loads its continuations make.
    pub fn supply_async<T, F>(self: &Arc<Self>, resolution: &ResolutionContext, f: F) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> FieldResult<T> + Send + 'static,
    {
        let source = DeferredValue::supply_async(Some(self.id), f, &*self.executor)
            .try_map(|r: &FieldResult<T>| r.clone());
        self.track(resolution, None, None, &source)
    }

    /// Tracks a value completed elsewhere under `resolution`.
    pub fn wrap<T>(self: &Arc<Self>, resolution: &ResolutionContext, value: &DeferredValue<T>) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.track(resolution, None, None, value)
    }

    /// Drives `fut` on the executor of this coordinator, tracking its output
    /// under `resolution`.
    pub fn spawn<T, F>(self: &Arc<Self>, resolution: &ResolutionContext, fut: F) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Future<Output = FieldResult<T>> + Send + 'static,
    {
        let source = DeferredValue::spawn(
            Some(self.id),
            async move { fut.await.map_err(Failure::Field) },
            &*self.executor,
        );
        self.track(resolution, None, None, &source)
    }

    fn track<T>(
        self: &Arc<Self>,
        resolution: &ResolutionContext,
        loader: Option<ArcStr>,
        key: Option<Arc<dyn Any + Send + Sync>>,
        source: &DeferredValue<T>,
    ) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = DeferredValue::pending(Some(self.id));
        let slot = Arc::new(SettleSlot::default());
        if let Some(outcome) = source.peek() {
            // Nothing depends on `value` yet, so there is nothing to flush.
            _ = value.complete_with(outcome.clone());
            slot.settle();
        } else {
            let value = value.clone();
            let slot = Arc::clone(&slot);
            source.subscribe(move |outcome| {
                _ = value.complete_with(outcome.clone());
                // Loads made by the continuations must be registered before
                // the latch of this value is counted down.
                flush();
                slot.settle();
            });
        }
        self.register(PendingEntry {
            resolution: resolution.clone(),
            loader: loader.clone(),
            slot,
        });
        BatchedValue::new(value, loader, key, resolution.clone())
    }

    fn register(self: &Arc<Self>, entry: PendingEntry) {
        let mut registries = lock(&self.registries);
        if registries.finished.contains(&entry.resolution) {
            drop(registries);
            self.isolated_dispatch(entry);
        } else {
            registries.pending.push(entry);
        }
    }

    /// Removes the pending values of `set`, marking `set` finished if there
    /// are none.
    fn take_pending(&self, set: &ResolutionSet) -> Vec<PendingEntry> {
        let mut registries = lock(&self.registries);
        let (drained, rest): (Vec<_>, Vec<_>) = mem::take(&mut registries.pending)
            .into_iter()
            .partition(|entry| set.contains(&entry.resolution));
        registries.pending = rest;
        if drained.is_empty() {
            registries.finished.extend(set.iter().cloned());
        }
        drained
    }

    /// Dispatches the values registered for `resolutions`.
    ///
    /// Loads made by the continuations of dispatched values for the same
    /// resolutions are dispatched in turn by a background waiter, until a
    /// pass finds nothing left. The resolutions are finished afterwards.
    /// With nothing pending, they are finished right away and no loader is
    /// called.
    pub fn dispatch(self: &Arc<Self>, resolutions: impl IntoIterator<Item = ResolutionContext>) {
        let set: ResolutionSet = resolutions.into_iter().collect();
        let drained = self.take_pending(&set);
        self.run(set, drained);
    }

    fn run(self: &Arc<Self>, set: ResolutionSet, drained: Vec<PendingEntry>) {
        __span_trace!("dispatch", request = %self.id, resolutions = set.len());

        if drained.is_empty() {
            __trace!("{}: nothing pending, {} resolutions finished", self.id, set.len());
            return;
        }
        __trace_debug!(
            "{}: dispatching {} values of {} resolutions",
            self.id,
            drained.len(),
            set.len(),
        );

        let latch = Self::arm(&drained);
        let waiter = {
            let this = Arc::clone(self);
            move || this.settle_loop(&set, latch)
        };
        spawn_named(
            "juniper-deferred-dispatch",
            Box::new(waiter),
            &*self.executor,
        );
        _ = self.trigger(&drained);
    }

    fn arm(drained: &[PendingEntry]) -> Arc<Latch> {
        let latch = Latch::new(drained.len());
        for entry in drained {
            entry.slot.attach(&latch);
        }
        latch
    }

    fn trigger(&self, drained: &[PendingEntry]) -> usize {
        let keys = self
            .loaders
            .dispatch(drained.iter().filter_map(|entry| entry.loader.as_deref()));
        __trace!("{}: loaders received {keys} keys", self.id);
        keys
    }

    fn settle_loop(&self, set: &ResolutionSet, mut latch: Arc<Latch>) {
        loop {
            latch.wait();
            let drained = self.take_pending(set);
            if drained.is_empty() {
                __trace!("{}: {} resolutions finished", self.id, set.len());
                return;
            }
            __trace_debug!(
                "{}: {} more values registered while dispatching",
                self.id,
                drained.len(),
            );
            latch = Self::arm(&drained);
            _ = self.trigger(&drained);
        }
    }

    fn isolated_dispatch(self: &Arc<Self>, entry: PendingEntry) {
        __trace_debug!(
            "{}: `{}` is finished, buffering its late value",
            self.id,
            entry.resolution,
        );
        if !lock(&self.window).push(entry) {
            return;
        }
        let this = Arc::clone(self);
        _ = self.delayer.schedule(self.config.batch_window, move || {
            let executor = Arc::clone(&this.executor);
            executor.execute(Box::new(move || this.flush_window()));
        });
    }

    fn flush_window(self: &Arc<Self>) {
        let (set, mut drained) = lock(&self.window).take();
        __trace_debug!("{}: flushing {} late values", self.id, drained.len());
        drained.extend(self.take_pending(&set));
        self.run(set, drained);
    }

    /// Dispatches `resolution` together with every other resolution made in
    /// the same completion drain, once that drain is through.
    pub(crate) fn defer_dispatch(self: &Arc<Self>, resolution: ResolutionContext) {
        let opened = {
            let mut burst = lock(&self.burst);
            let opened = burst.is_empty();
            _ = burst.insert(resolution);
            opened
        };
        if opened {
            let this = Arc::clone(self);
            drain(Box::new(move || {
                let set = mem::take(&mut *lock(&this.burst));
                this.dispatch(set);
            }));
        }
    }
}

/// [`DispatchCoordinator`] bound to a single resolution.
///
/// Handy for batch loaders and continuations that keep loading on behalf of
/// the field they were created for.
#[derive(Clone, Debug)]
pub struct LoadScope {
    coordinator: Arc<DispatchCoordinator>,
    resolution: ResolutionContext,
}

impl LoadScope {
    /// Binds `coordinator` to `resolution`.
    pub fn new(coordinator: Arc<DispatchCoordinator>, resolution: ResolutionContext) -> Self {
        Self {
            coordinator,
            resolution,
        }
    }

    /// Resolution this scope loads for.
    pub fn resolution(&self) -> &ResolutionContext {
        &self.resolution
    }

    /// Coordinator this scope loads through.
    pub fn coordinator(&self) -> &Arc<DispatchCoordinator> {
        &self.coordinator
    }

    /// See [`DispatchCoordinator::load`].
    pub fn load<K, V>(&self, name: &str, key: K) -> BatchedValue<V>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.coordinator.load(&self.resolution, name, key)
    }

    /// See [`DispatchCoordinator::supply_async`].
    pub fn supply_async<T, F>(&self, f: F) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> FieldResult<T> + Send + 'static,
    {
        self.coordinator.supply_async(&self.resolution, f)
    }

    /// See [`DispatchCoordinator::wrap`].
    pub fn wrap<T>(&self, value: &DeferredValue<T>) -> BatchedValue<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.coordinator.wrap(&self.resolution, value)
    }
}

static_assertions::assert_impl_all!(DispatchCoordinator: Send, Sync);
static_assertions::assert_impl_all!(BatchedValue<crate::Value>: Clone, Send, Sync);
static_assertions::assert_impl_all!(LoadScope: Clone, Send, Sync);
