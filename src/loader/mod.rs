//! Key-based batch loading.
//!
//! A [`DataLoader`] queues the keys requested through [`DataLoader::load`]
//! and hands them to its [`BatchLoader`] all at once when dispatched.

mod registry;

use std::{
    fmt,
    hash::Hash,
    mem,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    deferred::{DeferredValue, Failure, Outcome, catch, drain},
    executor::FieldResult,
    resolve::Resolved,
};

pub use self::registry::DataLoaderRegistry;

/// Loads the values of many keys in one go.
///
/// The returned results must line up with `keys`: the n-th result belongs to
/// the n-th key. Failing as a whole fails every key of the batch.
pub trait BatchLoader<K, V>: Send + Sync + 'static {
    /// Loads the values of `keys`.
    fn load(&self, keys: &[K]) -> Resolved<Vec<FieldResult<V>>>;
}

impl<K, V, F> BatchLoader<K, V> for F
where
    F: Fn(&[K]) -> Resolved<Vec<FieldResult<V>>> + Send + Sync + 'static,
{
    fn load(&self, keys: &[K]) -> Resolved<Vec<FieldResult<V>>> {
        self(keys)
    }
}

/// Options of a [`DataLoader`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DataLoaderOptions {
    /// Whether a key loaded once is served from the cache afterwards.
    pub caching: bool,

    /// Upper bound of keys passed to a single [`BatchLoader::load`] call.
    ///
    /// `None` passes all queued keys at once.
    pub max_batch_size: Option<usize>,
}

impl Default for DataLoaderOptions {
    fn default() -> Self {
        Self {
            caching: true,
            max_batch_size: None,
        }
    }
}

impl DataLoaderOptions {
    /// Enables or disables caching.
    #[must_use]
    pub fn caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Limits the number of keys per batch call.
    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }
}

/// Counters of a [`DataLoader`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Statistics {
    /// Calls of [`DataLoader::load`].
    pub load_count: usize,

    /// Calls of [`BatchLoader::load`].
    pub batch_invoke_count: usize,

    /// Keys passed to [`BatchLoader::load`] in total.
    pub batch_load_count: usize,

    /// Calls of [`DataLoader::load`] served from the cache.
    pub cache_hit_count: usize,
}

impl Statistics {
    /// Sums up two sets of counters.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            load_count: self.load_count + other.load_count,
            batch_invoke_count: self.batch_invoke_count + other.batch_invoke_count,
            batch_load_count: self.batch_load_count + other.batch_load_count,
            cache_hit_count: self.cache_hit_count + other.cache_hit_count,
        }
    }
}

#[derive(Default)]
struct Counters {
    load: AtomicUsize,
    batch_invoke: AtomicUsize,
    batch_load: AtomicUsize,
    cache_hit: AtomicUsize,
}

struct State<K, V> {
    queue: Vec<(K, DeferredValue<V>)>,
    cache: FnvHashMap<K, DeferredValue<V>>,
}

/// Batches and caches loads of `V` by `K`.
pub struct DataLoader<K, V> {
    batch: Box<dyn BatchLoader<K, V>>,
    options: DataLoaderOptions,
    state: Arc<Mutex<State<K, V>>>,
    counters: Counters,
}

impl<K, V> fmt::Debug for DataLoader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K, V> DataLoader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader with default options.
    pub fn new(batch: impl BatchLoader<K, V>) -> Self {
        Self::with_options(batch, DataLoaderOptions::default())
    }

    /// Creates a loader with the given `options`.
    pub fn with_options(batch: impl BatchLoader<K, V>, options: DataLoaderOptions) -> Self {
        Self {
            batch: Box::new(batch),
            options,
            state: Arc::new(Mutex::new(State {
                queue: vec![],
                cache: FnvHashMap::default(),
            })),
            counters: Counters::default(),
        }
    }

    /// Creates a loader calling `f` synchronously for every batch.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[K]) -> Vec<FieldResult<V>> + Send + Sync + 'static,
    {
        Self::new(move |keys: &[K]| Resolved::Sync(Ok(f(keys))))
    }

    fn state(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests the value of `key`.
    ///
    /// The returned value completes once the key was passed to the batch
    /// loader by a [`DataLoader::dispatch`] call, unless it is cached.
    pub fn load(&self, key: K) -> DeferredValue<V> {
        _ = self.counters.load.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state();
        if self.options.caching {
            if let Some(cached) = state.cache.get(&key) {
                _ = self.counters.cache_hit.fetch_add(1, Ordering::Relaxed);
                return cached.clone();
            }
        }
        let value = DeferredValue::new();
        if self.options.caching {
            _ = state.cache.insert(key.clone(), value.clone());
        }
        state.queue.push((key, value.clone()));
        value
    }

    /// Puts `value` into the cache for `key`, unless the key is cached
    /// already.
    pub fn prime(&self, key: K, value: V) -> &Self {
        if self.options.caching {
            _ = self
                .state()
                .cache
                .entry(key)
                .or_insert_with(|| DeferredValue::completed(value));
        }
        self
    }

    /// Removes `key` from the cache.
    pub fn clear(&self, key: &K) -> &Self {
        _ = self.state().cache.remove(key);
        self
    }

    /// Empties the cache.
    pub fn clear_all(&self) -> &Self {
        self.state().cache.clear();
        self
    }

    /// Number of keys waiting for the next dispatch.
    pub fn dispatch_depth(&self) -> usize {
        self.state().queue.len()
    }

    /// Passes every queued key to the batch loader.
    ///
    /// Returns the number of dispatched keys. The values of a batch complete
    /// together, in one cascade, so continuations of sibling keys get to run
    /// before any of them starts new work.
    pub fn dispatch(&self) -> usize {
        let queue = mem::take(&mut self.state().queue);
        if queue.is_empty() {
            return 0;
        }
        let total = queue.len();
        let size = self.options.max_batch_size.unwrap_or(total).max(1);
        let mut queue = queue.into_iter().peekable();
        while queue.peek().is_some() {
            let (keys, values): (Vec<_>, Vec<_>) = queue.by_ref().take(size).unzip();
            self.invoke(keys, values);
        }
        total
    }

    fn invoke(&self, keys: Vec<K>, values: Vec<DeferredValue<V>>) {
        _ = self.counters.batch_invoke.fetch_add(1, Ordering::Relaxed);
        _ = self.counters.batch_load.fetch_add(keys.len(), Ordering::Relaxed);
        __trace!("invoking batch loader with {} keys", keys.len());

        let cache = self.options.caching.then(|| Arc::clone(&self.state));
        match catch(|| self.batch.load(&keys)) {
            Ok(Resolved::Sync(res)) => settle(cache, keys, values, res.map_err(Failure::Field)),
            Ok(Resolved::Async(pending)) => {
                pending.subscribe(move |outcome| settle(cache, keys, values, outcome.clone()));
            }
            Err(panicked) => settle(cache, keys, values, Err(panicked)),
        }
    }

    /// Snapshot of this loader's counters.
    pub fn statistics(&self) -> Statistics {
        Statistics {
            load_count: self.counters.load.load(Ordering::Relaxed),
            batch_invoke_count: self.counters.batch_invoke.load(Ordering::Relaxed),
            batch_load_count: self.counters.batch_load.load(Ordering::Relaxed),
            cache_hit_count: self.counters.cache_hit.load(Ordering::Relaxed),
        }
    }
}

/// Completes the `values` of a batch with the batch loader's `res`.
///
/// Failed keys are evicted from `cache`, so a later load retries them.
fn settle<K, V>(
    cache: Option<Arc<Mutex<State<K, V>>>>,
    keys: Vec<K>,
    values: Vec<DeferredValue<V>>,
    res: Outcome<Vec<FieldResult<V>>>,
) where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    let results: Vec<Outcome<V>> = match res {
        Ok(results) if results.len() == keys.len() => results
            .into_iter()
            .map(|r| r.map_err(Failure::Field))
            .collect(),
        Ok(results) => {
            let msg = format!(
                "batch loader returned {} values for {} keys",
                results.len(),
                keys.len(),
            );
            __trace_error!("{msg}");
            vec![Err(Failure::field(msg)); keys.len()]
        }
        Err(failure) => {
            __trace_debug!("batch of {} keys failed: {failure}", keys.len());
            vec![Err(failure); keys.len()]
        }
    };

    if let Some(cache) = cache {
        let mut state = cache.lock().unwrap_or_else(PoisonError::into_inner);
        for ((key, value), res) in keys.iter().zip(&values).zip(&results) {
            if res.is_err() && state.cache.get(key).is_some_and(|c| c.ptr_eq(value)) {
                _ = state.cache.remove(key);
            }
        }
    }

    drain(Box::new(move || {
        for (value, res) in values.iter().zip(results) {
            _ = value.complete_with(res);
        }
    }));
}
