use std::{any::Any, fmt, hash::Hash, sync::Arc};

use arcstr::ArcStr;
use fnv::FnvHashMap;
use itertools::Itertools as _;

use super::{DataLoader, Statistics};

/// Type-erased view of a [`DataLoader`].
trait AnyLoader: Send + Sync {
    fn dispatch(&self) -> usize;

    fn dispatch_depth(&self) -> usize;

    fn statistics(&self) -> Statistics;

    fn as_any(&self) -> &dyn Any;
}

impl<K, V> AnyLoader for DataLoader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn dispatch(&self) -> usize {
        DataLoader::dispatch(self)
    }

    fn dispatch_depth(&self) -> usize {
        DataLoader::dispatch_depth(self)
    }

    fn statistics(&self) -> Statistics {
        DataLoader::statistics(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Named [`DataLoader`]s of a single request.
#[derive(Clone, Default)]
pub struct DataLoaderRegistry {
    loaders: FnvHashMap<ArcStr, Arc<dyn AnyLoader>>,
}

impl fmt::Debug for DataLoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoaderRegistry")
            .field("loaders", &self.loaders.keys().sorted().collect::<Vec<_>>())
            .finish()
    }
}

impl DataLoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` under `name`, replacing any loader registered
    /// under the same name before.
    #[must_use]
    pub fn register<K, V>(mut self, name: impl Into<ArcStr>, loader: DataLoader<K, V>) -> Self
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        _ = self.loaders.insert(name.into(), Arc::new(loader));
        self
    }

    /// Looks up the loader registered under `name`.
    ///
    /// Returns `None` if there is none, or if it loads other types.
    pub fn get<K, V>(&self, name: &str) -> Option<&DataLoader<K, V>>
    where
        K: 'static,
        V: 'static,
    {
        self.loaders.get(name)?.as_any().downcast_ref()
    }

    /// Indicates whether a loader is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Names of all registered loaders, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &ArcStr> {
        self.loaders.keys()
    }

    /// Dispatches the loaders named in `names`, each at most once.
    ///
    /// Returns the number of dispatched keys. Unknown names are skipped.
    pub fn dispatch<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> usize {
        names
            .into_iter()
            .unique()
            .filter_map(|name| self.loaders.get(name))
            .map(|loader| loader.dispatch())
            .sum()
    }

    /// Dispatches every registered loader.
    pub fn dispatch_all(&self) -> usize {
        self.loaders.values().map(|loader| loader.dispatch()).sum()
    }

    /// Number of keys waiting for dispatch across all loaders.
    pub fn dispatch_depth(&self) -> usize {
        self.loaders.values().map(|loader| loader.dispatch_depth()).sum()
    }

    /// Counters of the loader registered under `name`.
    pub fn statistics_of(&self, name: &str) -> Option<Statistics> {
        self.loaders.get(name).map(|loader| loader.statistics())
    }

    /// Counters of all loaders summed up.
    pub fn statistics(&self) -> Statistics {
        self.loaders
            .values()
            .map(|loader| loader.statistics())
            .fold(Statistics::default(), Statistics::combine)
    }
}
