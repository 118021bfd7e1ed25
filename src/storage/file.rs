use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{apply_add, apply_delete, apply_set, apply_update, validate_collection};
use super::{Document, DocumentStore, JsonMap, StoreError, StoreResult};

/// Document store persisted as `<root>/<collection>.json`, each file holding a
/// JSON array of documents in insertion order.
///
/// Writes are serialized through one async mutex and land via a temp file plus
/// rename, so a crash mid-write leaves the previous file intact.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, write_lock: Mutex::new(()) })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.json", collection))
    }

    async fn load(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let path = self.collection_path(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) { return Ok(Vec::new()); }
        serde_json::from_slice::<Vec<Document>>(&bytes).map_err(|e| StoreError::Corrupt {
            collection: collection.to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, collection: &str, docs: &[Document]) -> StoreResult<()> {
        let path = self.collection_path(collection);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(docs)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(target: "crmhub::storage", "saved collection='{}' docs={} path='{}'", collection, docs.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;
        self.load(collection).await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_collection(collection)?;
        Ok(self.load(collection).await?.into_iter().find(|d| d.id == id))
    }

    async fn add(&self, collection: &str, data: JsonMap) -> StoreResult<Document> {
        validate_collection(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.load(collection).await?;
        let doc = apply_add(&mut docs, data);
        self.save(collection, &docs).await?;
        Ok(doc)
    }

    async fn set(&self, collection: &str, id: &str, data: JsonMap) -> StoreResult<Document> {
        validate_collection(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.load(collection).await?;
        let doc = apply_set(&mut docs, id, data);
        self.save(collection, &docs).await?;
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, patch: JsonMap) -> StoreResult<Document> {
        validate_collection(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.load(collection).await?;
        let doc = apply_update(&mut docs, collection, id, patch)?;
        self.save(collection, &docs).await?;
        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_collection(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.load(collection).await?;
        apply_delete(&mut docs, collection, id)?;
        self.save(collection, &docs).await
    }
}
