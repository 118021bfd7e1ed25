use async_trait::async_trait;

use super::principal::{Identity, Role};
use super::provider::PROFILES_COLLECTION;
use crate::error::{AppError, AppResult};
use crate::storage::SharedStore;

/// Looks up the application role for an authenticated identity.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve_role(&self, identity: &Identity) -> AppResult<Role>;
}

/// Reads `users/{uid}` from the document store.
///
/// The `role` field may be a `{id, name}` object or a bare role name.
pub struct StoreProfileResolver {
    store: SharedStore,
}

impl StoreProfileResolver {
    pub fn new(store: SharedStore) -> Self { Self { store } }
}

#[async_trait]
impl ProfileResolver for StoreProfileResolver {
    async fn resolve_role(&self, identity: &Identity) -> AppResult<Role> {
        let Some(doc) = self.store.get(PROFILES_COLLECTION, &identity.uid).await? else {
            return Err(AppError::not_found("profile_not_found".into(), format!("no profile for uid {}", identity.uid)));
        };
        match doc.data.get("role") {
            None | Some(serde_json::Value::Null) => {
                Err(AppError::not_found("role_not_found".into(), format!("profile {} has no role", identity.uid)))
            }
            Some(serde_json::Value::String(name)) if name.is_empty() => {
                Err(AppError::not_found("role_not_found".into(), format!("profile {} has no role", identity.uid)))
            }
            Some(v) => Ok(serde_json::from_value::<Role>(v.clone())?),
        }
    }
}
