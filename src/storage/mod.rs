//!
//! crmhub document store
//! ---------------------
//! Collection-level CRUD over schemaless JSON documents. Each document lives in a
//! named collection (`leads`, `employees`, `users`, ...) and carries a generated
//! string identifier. There are no relational constraints: references between
//! documents are plain strings or denormalized objects.
//!
//! Two implementations are provided:
//! - `MemoryStore`: process-local, used for tests and `CRMHUB_STORE=memory`.
//! - `FileStore`: one JSON file per collection under a root folder.
//!
//! Callers hold a `SharedStore` (`Arc<dyn DocumentStore>`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

mod memory;
mod file;

pub use memory::MemoryStore;
pub use file::FileStore;

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A stored document: generated id plus its fields, flattened on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(flatten)]
    pub data: JsonMap,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid collection name: '{0}'")]
    InvalidCollection(String),

    #[error("document '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("collection '{collection}' is corrupt: {reason}")]
    Corrupt { collection: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCollection(_) => AppError::user("invalid_collection".into(), err.to_string()),
            StoreError::NotFound { .. } => AppError::not_found("document_not_found".into(), err.to_string()),
            StoreError::Corrupt { .. } => AppError::internal("store_corrupt".into(), err.to_string()),
            StoreError::Io(_) => AppError::io("store_io".into(), err.to_string()),
            StoreError::Serialization(_) => AppError::internal("store_serialization".into(), err.to_string()),
        }
    }
}

/// The hosted document database as seen by the rest of the crate.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents in insertion order. An unknown collection is empty.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert with a freshly generated id. Any `id` key in `data` is ignored.
    async fn add(&self, collection: &str, data: JsonMap) -> StoreResult<Document>;

    /// Create or replace the document with the caller-supplied id.
    async fn set(&self, collection: &str, id: &str, data: JsonMap) -> StoreResult<Document>;

    /// Shallow-merge `patch` into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: JsonMap) -> StoreResult<Document>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

pub fn validate_collection(name: &str) -> StoreResult<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok { Ok(()) } else { Err(StoreError::InvalidCollection(name.to_string())) }
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// Mutation helpers shared by both store implementations. Each operates on the
// ordered document list of a single collection.

fn strip_id(mut data: JsonMap) -> JsonMap {
    data.remove("id");
    data
}

pub(crate) fn apply_add(docs: &mut Vec<Document>, data: JsonMap) -> Document {
    let doc = Document { id: generate_id(), data: strip_id(data) };
    docs.push(doc.clone());
    doc
}

pub(crate) fn apply_set(docs: &mut Vec<Document>, id: &str, data: JsonMap) -> Document {
    let doc = Document { id: id.to_string(), data: strip_id(data) };
    match docs.iter_mut().find(|d| d.id == id) {
        Some(existing) => *existing = doc.clone(),
        None => docs.push(doc.clone()),
    }
    doc
}

pub(crate) fn apply_update(docs: &mut [Document], collection: &str, id: &str, patch: JsonMap) -> StoreResult<Document> {
    let Some(existing) = docs.iter_mut().find(|d| d.id == id) else {
        return Err(StoreError::NotFound { collection: collection.to_string(), id: id.to_string() });
    };
    for (k, v) in strip_id(patch) {
        existing.data.insert(k, v);
    }
    Ok(existing.clone())
}

pub(crate) fn apply_delete(docs: &mut Vec<Document>, collection: &str, id: &str) -> StoreResult<()> {
    let before = docs.len();
    docs.retain(|d| d.id != id);
    if docs.len() == before {
        return Err(StoreError::NotFound { collection: collection.to_string(), id: id.to_string() });
    }
    Ok(())
}
