//! In-memory resource store backing stateful mock routes.
//!
//! Resources live under their collection path (`/users`), keyed by id.
//! Nothing is persisted; the store is cleared on explicit reset and,
//! depending on configuration, on spec hot-reload.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Nested collection-path -> id -> resource store.
///
/// Constructor-injected into the dispatch engine; never a global, so multiple
/// independent server instances can coexist in one process.
pub struct MockStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// All resources in a collection. An unknown collection is an empty list.
    pub fn list(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .read()
            .get(collection)
            .and_then(|items| items.get(id).cloned())
    }

    pub fn insert(&self, collection: &str, id: &str, resource: Value) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), resource);
    }

    /// Remove a resource. Returns whether anything was removed; the request
    /// handler deliberately ignores this so deletes stay idempotent.
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        self.collections
            .write()
            .get_mut(collection)
            .map(|items| items.remove(id).is_some())
            .unwrap_or(false)
    }

    pub fn reset(&self) {
        self.collections.write().clear();
    }

    /// Full dump as `{collection: {id: resource}}` for the state endpoint.
    pub fn snapshot(&self) -> Value {
        let collections = self.collections.read();
        let mut out = Map::new();
        for (path, items) in collections.iter() {
            let mut entries = Map::new();
            for (id, resource) in items {
                entries.insert(id.clone(), resource.clone());
            }
            out.insert(path.clone(), Value::Object(entries));
        }
        Value::Object(out)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}
