//! Write-through entity cache.

use crate::entity::EntityHandle;
use parking_lot::Mutex;
use remdoc_protocol::Key;
use std::collections::HashMap;
use std::sync::Arc;

/// Live entities by key. Clones share the same cache.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    entries: Arc<Mutex<HashMap<Key, EntityHandle>>>,
}

impl EntityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live entity under `key`.
    pub fn get(&self, key: &Key) -> Option<EntityHandle> {
        self.entries
            .lock()
            .get(key)
            .filter(|entity| !entity.is_deleted())
            .cloned()
    }

    /// Caches `entity`, returning the entity it displaced.
    pub fn insert(&self, entity: EntityHandle) -> Option<EntityHandle> {
        self.entries.lock().insert(entity.key().clone(), entity)
    }

    /// Evicts `key`.
    pub fn remove(&self, key: &Key) -> Option<EntityHandle> {
        self.entries.lock().remove(key)
    }

    /// Whether a live entity is cached under `key`.
    pub fn contains(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Evicts everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::schema::{Indexes, Node};

    #[test]
    fn insert_get_remove() {
        let model = Arc::new(Model::new("note", [("title", Node::string())]));
        let cache = EntityCache::new();
        let entity = model.instantiate(Key::from(7), None, Indexes::new());

        assert!(cache.insert(entity.clone()).is_none());
        assert!(cache.get(&Key::from(7)).unwrap().same(&entity));
        assert_eq!(cache.len(), 1);

        entity.delete();
        assert!(!cache.contains(&Key::from(7)));

        assert!(cache.remove(&Key::from(7)).is_some());
        assert!(cache.is_empty());
    }
}
