//! Per-class instance cache for immutable classes.
//!
//! Readers see either the previous snapshot or the fully rebuilt one, never a
//! partially populated map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::resource::Resource;
use crate::term::Iri;

type Snapshot = Arc<HashMap<Iri, Resource>>;

#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// The cache has never been populated; callers should query the store.
    Unpopulated,
    Hit(Resource),
    /// Populated, and the id is not among the cached instances.
    Miss,
}

#[derive(Debug, Default)]
pub struct InstanceCache {
    snapshot: RwLock<Option<Snapshot>>,
    rebuild_guard: Mutex<()>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &Iri) -> CacheLookup {
        match self.snapshot() {
            None => CacheLookup::Unpopulated,
            Some(map) => map
                .get(id)
                .cloned()
                .map(CacheLookup::Hit)
                .unwrap_or(CacheLookup::Miss),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Current snapshot, if populated.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let guard = match self.snapshot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// Replace the cached instances with the output of `load`.
    ///
    /// Rebuilds are serialized; the new map is built before the swap, so a
    /// failing `load` leaves the previous snapshot in place.
    pub fn rebuild<E, F>(&self, load: F) -> Result<usize, E>
    where
        F: FnOnce() -> Result<Vec<Resource>, E>,
    {
        let _rebuilding = match self.rebuild_guard.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let instances = load()?;
        let map: HashMap<Iri, Resource> = instances
            .into_iter()
            .filter_map(|r| r.peek_id().cloned().map(|id| (id, r)))
            .collect();
        let count = map.len();

        let mut slot = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(map));
        tracing::debug!(instances = count, "instance cache rebuilt");
        Ok(count)
    }
}
