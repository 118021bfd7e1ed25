use tokio::sync::watch;
use tracing::{info, warn};
use crate::tprintln;

use super::principal::{Identity, Role};
use crate::error::{AppError, AppResult};
use crate::security;
use crate::storage::{JsonMap, SharedStore};

/// Collection holding email + Argon2 hash per account; the document id is the uid.
pub const CREDENTIALS_COLLECTION: &str = "credentials";
/// Collection holding the application profile (role, display name) keyed by uid.
pub const PROFILES_COLLECTION: &str = "users";

/// Source of authentication-state changes.
///
/// Subscribers receive the current identity immediately and every replacement
/// afterwards. `None` means signed out.
pub trait AuthProvider: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Password-based provider over the document store.
///
/// Holds a single current identity for the application instance, the way a
/// client-side auth SDK does: sign-in replaces it, sign-out clears it.
pub struct LocalAuthProvider {
    store: SharedStore,
    tx: watch::Sender<Option<Identity>>,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { store, tx }
    }

    pub fn current(&self) -> Option<Identity> { self.tx.borrow().clone() }

    /// Create an account, seed its profile with the default role, and sign it in.
    pub async fn register(&self, req: &RegisterRequest) -> AppResult<Identity> {
        let email = security::normalize_email(&req.email);
        if !security::is_plausible_email(&email) {
            return Err(AppError::user("invalid_email".into(), format!("'{}' is not a valid email", req.email)));
        }
        if req.password.len() < security::MIN_PASSWORD_LEN {
            return Err(AppError::user("weak_password".into(), format!("password must be at least {} characters", security::MIN_PASSWORD_LEN)));
        }
        if self.find_credentials(&email).await?.is_some() {
            return Err(AppError::conflict("email_in_use".into(), format!("an account already exists for {}", email)));
        }
        let hash = security::hash_password(&req.password)?;
        let mut cred = JsonMap::new();
        cred.insert("email".into(), email.clone().into());
        cred.insert("passwordHash".into(), hash.into());
        cred.insert("createdAt".into(), chrono::Utc::now().to_rfc3339().into());
        let doc = self.store.add(CREDENTIALS_COLLECTION, cred).await?;

        let role = Role::default_role();
        let mut profile = JsonMap::new();
        profile.insert("email".into(), email.clone().into());
        profile.insert("displayName".into(), req.display_name.clone().unwrap_or_else(|| email.clone()).into());
        profile.insert("role".into(), serde_json::to_value(&role)?);
        if let Err(e) = self.store.set(PROFILES_COLLECTION, &doc.id, profile).await {
            // Sign-in still works; the session falls back to the default role.
            warn!(target: "crmhub::auth", uid = %doc.id, error = %e, "failed to seed profile");
        }

        let identity = Identity { uid: doc.id, email };
        info!(target: "crmhub::auth", uid = %identity.uid, "account registered");
        self.tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    pub async fn sign_in(&self, req: &SignInRequest) -> AppResult<Identity> {
        let email = security::normalize_email(&req.email);
        let Some((uid, hash)) = self.find_credentials(&email).await? else {
            return Err(invalid_credentials());
        };
        if !security::verify_password(&hash, &req.password) {
            return Err(invalid_credentials());
        }
        let identity = Identity { uid, email };
        tprintln!("auth.sign_in uid={} email={}", identity.uid, identity.email);
        info!(target: "crmhub::auth", uid = %identity.uid, "signed in");
        self.tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    /// Returns true if someone was signed in.
    pub fn sign_out(&self) -> bool {
        let previous = self.tx.send_replace(None);
        if let Some(p) = &previous {
            info!(target: "crmhub::auth", uid = %p.uid, "signed out");
        }
        previous.is_some()
    }

    async fn find_credentials(&self, email: &str) -> AppResult<Option<(String, String)>> {
        let docs = self.store.list(CREDENTIALS_COLLECTION).await?;
        Ok(docs.into_iter().find_map(|d| {
            let matches = d.data.get("email").and_then(|v| v.as_str()) == Some(email);
            if !matches { return None; }
            let hash = d.data.get("passwordHash").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            Some((d.id, hash))
        }))
    }
}

impl AuthProvider for LocalAuthProvider {
    fn subscribe(&self) -> watch::Receiver<Option<Identity>> { self.tx.subscribe() }
}

fn invalid_credentials() -> AppError {
    AppError::auth("invalid_credentials", "invalid email or password")
}
