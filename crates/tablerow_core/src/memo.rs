//! Write-once, read-many keyed cache.
//!
//! Each key gets its own one-time initialization guard, so concurrent first
//! access to different keys does not serialize and later reads never block
//! on a loader. A failed load leaves the key uninitialized for the next caller.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub(crate) struct OnceMap<V> {
    entries: RwLock<HashMap<String, Arc<OnceCell<Arc<V>>>>>,
}

impl<V> OnceMap<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get_or_try_init<E>(
        &self,
        key: &str,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let cell = self.cell(key);
        cell.get_or_try_init(|| load().map(Arc::new)).cloned()
    }

    /// Keys whose value has been loaded, sorted.
    pub(crate) fn loaded_keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<Arc<V>>> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cell) = entries.get(key) {
                return Arc::clone(cell);
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key.to_string()).or_default())
    }
}
