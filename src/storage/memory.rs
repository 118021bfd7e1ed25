use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{apply_add, apply_delete, apply_set, apply_update, validate_collection};
use super::{Document, DocumentStore, JsonMap, StoreError, StoreResult};

/// Process-local document store. Collections are created on first write.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;
        Ok(self.collections.read().get(collection).cloned().unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_collection(collection)?;
        let map = self.collections.read();
        Ok(map.get(collection).and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }

    async fn add(&self, collection: &str, data: JsonMap) -> StoreResult<Document> {
        validate_collection(collection)?;
        let mut map = self.collections.write();
        Ok(apply_add(map.entry(collection.to_string()).or_default(), data))
    }

    async fn set(&self, collection: &str, id: &str, data: JsonMap) -> StoreResult<Document> {
        validate_collection(collection)?;
        let mut map = self.collections.write();
        Ok(apply_set(map.entry(collection.to_string()).or_default(), id, data))
    }

    async fn update(&self, collection: &str, id: &str, patch: JsonMap) -> StoreResult<Document> {
        validate_collection(collection)?;
        let mut map = self.collections.write();
        let docs = map.get_mut(collection).ok_or_else(|| not_found(collection, id))?;
        apply_update(docs, collection, id, patch)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_collection(collection)?;
        let mut map = self.collections.write();
        let docs = map.get_mut(collection).ok_or_else(|| not_found(collection, id))?;
        apply_delete(docs, collection, id)
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound { collection: collection.to_string(), id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_targets_do_not_create_collections() {
        let store = MemoryStore::new();
        assert!(matches!(store.update("ghosts", "x", JsonMap::new()).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete("ghosts", "x").await, Err(StoreError::NotFound { .. })));
        assert!(!store.collections.read().contains_key("ghosts"));
    }
}
