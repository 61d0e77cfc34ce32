use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

use arcstr::ArcStr;
use fnv::FnvHashSet;

/// One field resolution, the unit the dispatch coordinator tracks batched
/// values by.
///
/// Two contexts are equal only if they stem from the same
/// [`ResolutionContext::new`] call; the path is informational.
#[derive(Clone)]
pub struct ResolutionContext {
    id: u64,
    path: ArcStr,
}

impl ResolutionContext {
    /// Creates a context for a resolution at `path` in the response.
    pub fn new(path: impl Into<ArcStr>) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            path: path.into(),
        }
    }

    /// Path in the response this context was created for.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PartialEq for ResolutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResolutionContext {}

impl Hash for ResolutionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolutionContext#{}({})", self.id, self.path)
    }
}

impl fmt::Display for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "#{}", self.id)
        } else {
            f.write_str(&self.path)
        }
    }
}

/// Set of resolutions dispatched together.
pub type ResolutionSet = FnvHashSet<ResolutionContext>;
