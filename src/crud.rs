//! Typed CRUD over the document store.
//!
//! `CrudService<T>` is the per-entity data-access wrapper: list, get, create,
//! update and delete, each moving typed `Record<T>` values. The HTTP layer
//! reaches the same services through `EntityKind` and the object-safe
//! `CollectionService`, so inbound JSON is always validated by deserializing
//! into the entity type before it is stored.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Department, Employee, Entity, Invoice, Lead, License, Project, Task, Tier, UserProfile};
use crate::error::{AppError, AppResult};
use crate::storage::{Document, JsonMap, SharedStore};

/// An entity together with its generated document id. Serialized flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

pub struct CrudService<T: Entity> {
    store: SharedStore,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for CrudService<T> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), _entity: PhantomData } }
}

fn to_fields<T: Entity>(data: &T) -> AppResult<JsonMap> {
    match serde_json::to_value(data)? {
        serde_json::Value::Object(m) => Ok(m),
        other => Err(AppError::internal("not_an_object".into(), format!("{} serialized to {}", T::COLLECTION, other))),
    }
}

fn from_document<T: Entity>(doc: Document) -> AppResult<Record<T>> {
    let data: T = serde_json::from_value(serde_json::Value::Object(doc.data))
        .map_err(|e| AppError::internal("corrupt_document".into(), format!("{}/{}: {}", T::COLLECTION, doc.id, e)))?;
    Ok(Record { id: doc.id, data })
}

impl<T: Entity> CrudService<T> {
    pub fn new(store: SharedStore) -> Self { Self { store, _entity: PhantomData } }

    pub fn collection(&self) -> &'static str { T::COLLECTION }

    /// All records; documents that no longer match the entity shape are skipped.
    pub async fn list(&self) -> AppResult<Vec<Record<T>>> {
        let docs = self.store.list(T::COLLECTION).await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            match from_document::<T>(doc) {
                Ok(r) => out.push(r),
                Err(e) => warn!(target: "crmhub::crud", collection = T::COLLECTION, error = %e, "skipping unreadable document"),
            }
        }
        Ok(out)
    }

    pub async fn get(&self, id: &str) -> AppResult<Record<T>> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(doc) => from_document(doc),
            None => Err(AppError::not_found("document_not_found".into(), format!("{}/{} not found", T::COLLECTION, id))),
        }
    }

    pub async fn create(&self, mut data: T) -> AppResult<Record<T>> {
        data.on_create();
        let doc = self.store.add(T::COLLECTION, to_fields(&data)?).await?;
        Ok(Record { id: doc.id, data })
    }

    /// Overwrite every entity field of an existing record.
    pub async fn update(&self, id: &str, data: T) -> AppResult<Record<T>> {
        let doc = self.store.update(T::COLLECTION, id, to_fields(&data)?).await?;
        from_document(doc)
    }

    /// Merge only the keys present in `patch` into an existing record. The
    /// merged document must still deserialize into the entity.
    pub async fn patch(&self, id: &str, patch: JsonMap) -> AppResult<Record<T>> {
        let Some(mut merged) = self.store.get(T::COLLECTION, id).await? else {
            return Err(AppError::not_found("document_not_found".into(), format!("{}/{} not found", T::COLLECTION, id)));
        };
        merged.data.extend(patch.clone());
        parse_body::<T>(serde_json::Value::Object(merged.data))?;
        let doc = self.store.update(T::COLLECTION, id, patch).await?;
        from_document(doc)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.store.delete(T::COLLECTION, id).await?;
        Ok(())
    }
}

/// JSON-in / JSON-out view of a `CrudService`, used by the generic routes.
#[async_trait]
pub trait CollectionService: Send + Sync {
    async fn list_json(&self) -> AppResult<Vec<serde_json::Value>>;
    async fn get_json(&self, id: &str) -> AppResult<serde_json::Value>;
    async fn create_json(&self, body: serde_json::Value) -> AppResult<serde_json::Value>;
    async fn update_json(&self, id: &str, body: serde_json::Value) -> AppResult<serde_json::Value>;
    async fn delete_by_id(&self, id: &str) -> AppResult<()>;
}

fn parse_body<T: Entity>(body: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(body)
        .map_err(|e| AppError::user("invalid_document".into(), format!("invalid {} payload: {}", T::COLLECTION, e)))
}

#[async_trait]
impl<T: Entity> CollectionService for CrudService<T> {
    async fn list_json(&self) -> AppResult<Vec<serde_json::Value>> {
        self.list().await?.into_iter().map(|r| serde_json::to_value(r).map_err(AppError::from)).collect()
    }

    async fn get_json(&self, id: &str) -> AppResult<serde_json::Value> {
        Ok(serde_json::to_value(self.get(id).await?)?)
    }

    async fn create_json(&self, body: serde_json::Value) -> AppResult<serde_json::Value> {
        Ok(serde_json::to_value(self.create(parse_body::<T>(body)?).await?)?)
    }

    async fn update_json(&self, id: &str, body: serde_json::Value) -> AppResult<serde_json::Value> {
        let serde_json::Value::Object(mut patch) = body else {
            return Err(AppError::user("invalid_document".into(), format!("{} update must be a JSON object", T::COLLECTION)));
        };
        patch.remove("id");
        // Sent fields alone must already be well-typed
        parse_body::<T>(serde_json::Value::Object(patch.clone()))?;
        Ok(serde_json::to_value(self.patch(id, patch).await?)?)
    }

    async fn delete_by_id(&self, id: &str) -> AppResult<()> {
        self.delete(id).await
    }
}

/// The collections exposed through the generic CRUD routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Leads,
    Employees,
    Projects,
    Invoices,
    Departments,
    Tasks,
    Licenses,
    Tiers,
    Users,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Leads,
        EntityKind::Employees,
        EntityKind::Projects,
        EntityKind::Invoices,
        EntityKind::Departments,
        EntityKind::Tasks,
        EntityKind::Licenses,
        EntityKind::Tiers,
        EntityKind::Users,
    ];

    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Leads => Lead::COLLECTION,
            EntityKind::Employees => Employee::COLLECTION,
            EntityKind::Projects => Project::COLLECTION,
            EntityKind::Invoices => Invoice::COLLECTION,
            EntityKind::Departments => Department::COLLECTION,
            EntityKind::Tasks => Task::COLLECTION,
            EntityKind::Licenses => License::COLLECTION,
            EntityKind::Tiers => Tier::COLLECTION,
            EntityKind::Users => UserProfile::COLLECTION,
        }
    }

    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == name)
    }

    pub fn service(&self, store: SharedStore) -> Box<dyn CollectionService> {
        match self {
            EntityKind::Leads => Box::new(CrudService::<Lead>::new(store)),
            EntityKind::Employees => Box::new(CrudService::<Employee>::new(store)),
            EntityKind::Projects => Box::new(CrudService::<Project>::new(store)),
            EntityKind::Invoices => Box::new(CrudService::<Invoice>::new(store)),
            EntityKind::Departments => Box::new(CrudService::<Department>::new(store)),
            EntityKind::Tasks => Box::new(CrudService::<Task>::new(store)),
            EntityKind::Licenses => Box::new(CrudService::<License>::new(store)),
            EntityKind::Tiers => Box::new(CrudService::<Tier>::new(store)),
            EntityKind::Users => Box::new(CrudService::<UserProfile>::new(store)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn collection_names_round_trip() {
        for k in EntityKind::ALL {
            assert_eq!(EntityKind::from_collection(k.collection()), Some(k));
        }
        assert_eq!(EntityKind::from_collection("credentials"), None);
    }

    #[tokio::test]
    async fn json_service_validates_payloads() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let svc = EntityKind::Tasks.service(store.clone());
        let err = svc.create_json(json!({"title": "x", "priority": "whenever"})).await.unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(store.list("tasks").await.unwrap().is_empty());

        let created = svc.create_json(json!({"title": "Call back", "priority": "high"})).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "todo");
        let fetched = svc.get_json(&id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn json_update_merges_only_sent_fields() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let svc = EntityKind::Leads.service(store.clone());
        let created = svc
            .create_json(json!({"name": "Ada", "email": "ada@example.com", "company": "Engines", "value": 5000}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let updated = svc.update_json(&id, json!({"status": "won"})).await.unwrap();
        assert_eq!(updated["status"], "won");
        assert_eq!(updated["name"], "Ada");
        assert_eq!(updated["email"], "ada@example.com");
        assert_eq!(updated["company"], "Engines");
        assert_eq!(updated["value"], 5000.0);
        assert_eq!(updated["createdAt"], created["createdAt"]);
        assert_eq!(svc.get_json(&id).await.unwrap(), updated);

        let err = svc.update_json(&id, json!({"status": "exploded"})).await.unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert_eq!(svc.get_json(&id).await.unwrap()["status"], "won");

        assert_eq!(svc.update_json(&id, json!(["status"])).await.unwrap_err().http_status(), 400);
        assert!(svc.update_json("missing", json!({"status": "won"})).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_skips_unreadable_documents() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut bad = JsonMap::new();
        bad.insert("status".into(), json!("exploded"));
        store.add("leads", bad).await.unwrap();
        let svc = CrudService::<Lead>::new(store.clone());
        svc.create(Lead { name: "Ada".into(), ..Default::default() }).await.unwrap();
        let all = svc.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data.name, "Ada");
    }
}
