//!
//! crmhub HTTP server
//! ------------------
//! Axum-based JSON API for the CRM back office.
//!
//! Responsibilities:
//! - Account registration, sign-in and sign-out against the local identity provider.
//! - Publishing the bootstrapped session (`GET /api/session`).
//! - Generic CRUD over the entity collections, gated on a signed-in session.
//! - Mounting the license verification proxy and the sheets lead-sync routes.
//!
//! There is exactly one session per process: whoever signed in last is the
//! caller for every request, with no per-request credential. The service is a
//! single-operator back office and must not be exposed to untrusted networks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::{Config, StoreKind};
use crate::crud::{CollectionService, EntityKind};
use crate::error::{AppError, AppResult};
use crate::identity::{
    LocalAuthProvider, RegisterRequest, SessionBootstrap, SessionHandle, SessionState, SessionUser, SignInRequest,
    StoreProfileResolver,
};
use crate::license::{self, LicenseVerifier};
use crate::sheets::{self, SheetsClient};
use crate::storage::{FileStore, MemoryStore, SharedStore};

/// Role allowed to edit user profiles (and with them, other users' roles).
pub const ADMIN_ROLE: &str = "admin";

/// Upper bound on waiting for the session to reflect a sign-in/sign-out that
/// raced with another one.
const SESSION_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub auth: Arc<LocalAuthProvider>,
    pub session: Arc<SessionHandle>,
}

impl AppState {
    /// Wire the identity provider and mount the session bootstrap over `store`.
    /// Must be called from within a tokio runtime.
    pub fn new(store: SharedStore) -> Self {
        let auth = Arc::new(LocalAuthProvider::new(store.clone()));
        let resolver = Arc::new(StoreProfileResolver::new(store.clone()));
        let session = Arc::new(SessionBootstrap::mount(auth.as_ref(), resolver));
        Self { store, auth, session }
    }
}

pub fn open_store(cfg: &Config) -> anyhow::Result<SharedStore> {
    Ok(match cfg.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => Arc::new(
            FileStore::open(&cfg.data_root).with_context(|| format!("While opening document store at '{}'", cfg.data_root))?,
        ),
    })
}

/// Full application router: API routes plus the license and sheets routers.
pub fn app(state: AppState, verifier: Arc<dyn LicenseVerifier>, sheets_client: Option<Arc<SheetsClient>>) -> Router {
    Router::new()
        .route("/", get(|| async { "crmhub ok" }))
        .route("/api/auth/register", post(register))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/session", get(get_session))
        .route("/api/{collection}", get(list_records).post(create_record))
        .route("/api/{collection}/{id}", get(get_record).put(update_record).delete(delete_record))
        .with_state(state)
        .merge(license::router(verifier))
        .merge(sheets::router(sheets_client))
}

/// Start the main HTTP server with the given configuration.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let store = open_store(&cfg)?;
    let state = AppState::new(store);
    let verifier = license::verifier_from_config(&cfg);
    let sheets_client = sheets::client_from_config(&cfg.sheets).context("While configuring sheets sync")?;
    if sheets_client.is_none() {
        info!(target: "startup", "sheets sync not configured; /api/sheets routes will answer 503");
    }

    let app = app(state, verifier, sheets_client);
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start only the license verification proxy.
pub async fn run_license_proxy(cfg: Config) -> anyhow::Result<()> {
    let app = license::router(license::verifier_from_config(&cfg));
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.license_proxy_port).parse()?;
    info!("License proxy listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    email: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignInPayload { email: String, password: String }

async fn register(State(state): State<AppState>, Json(p): Json<RegisterPayload>) -> AppResult<(StatusCode, Json<SessionState>)> {
    let req = RegisterRequest { email: p.email, password: p.password, display_name: p.display_name };
    let identity = state.auth.register(&req).await?;
    let session = session_after(&state, Some(identity.uid.as_str())).await;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in(State(state): State<AppState>, Json(p): Json<SignInPayload>) -> AppResult<Json<SessionState>> {
    let identity = state.auth.sign_in(&SignInRequest { email: p.email, password: p.password }).await?;
    Ok(Json(session_after(&state, Some(identity.uid.as_str())).await))
}

async fn sign_out(State(state): State<AppState>) -> Json<SessionState> {
    state.auth.sign_out();
    Json(session_after(&state, None).await)
}

async fn session_after(state: &AppState, uid: Option<&str>) -> SessionState {
    match tokio::time::timeout(SESSION_SETTLE_TIMEOUT, state.session.settled_for(uid)).await {
        Ok(s) => s,
        Err(_) => state.session.current(),
    }
}

async fn get_session(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session.current())
}

async fn require_user(state: &AppState) -> AppResult<SessionUser> {
    state
        .session
        .settled()
        .await
        .user
        .ok_or_else(|| AppError::auth("not_signed_in", "sign in first"))
}

fn resolve_kind(collection: &str) -> AppResult<EntityKind> {
    EntityKind::from_collection(collection)
        .ok_or_else(|| AppError::not_found("unknown_collection".into(), format!("no collection named '{}'", collection)))
}

/// Profiles carry roles; only admins may write them.
fn check_write(kind: EntityKind, user: &SessionUser) -> AppResult<()> {
    if kind == EntityKind::Users && user.role.name != ADMIN_ROLE {
        return Err(AppError::forbidden("forbidden", "only admins may edit user profiles"));
    }
    Ok(())
}

async fn service_for(state: &AppState, collection: &str) -> AppResult<(Box<dyn CollectionService>, EntityKind, SessionUser)> {
    let user = require_user(state).await?;
    let kind = resolve_kind(collection)?;
    Ok((kind.service(state.store.clone()), kind, user))
}

async fn list_records(State(state): State<AppState>, Path(collection): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let (svc, _, _) = service_for(&state, &collection).await?;
    Ok(Json(serde_json::Value::Array(svc.list_json().await?)))
}

async fn get_record(State(state): State<AppState>, Path((collection, id)): Path<(String, String)>) -> AppResult<Json<serde_json::Value>> {
    let (svc, _, _) = service_for(&state, &collection).await?;
    Ok(Json(svc.get_json(&id).await?))
}

async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let (svc, kind, user) = service_for(&state, &collection).await?;
    check_write(kind, &user)?;
    let created = svc.create_json(body).await?;
    info!(target: "crmhub::api", collection = %collection, id = %created["id"], uid = %user.uid, "record created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<serde_json::Value>> {
    let (svc, kind, user) = service_for(&state, &collection).await?;
    check_write(kind, &user)?;
    Ok(Json(svc.update_json(&id, body).await?))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    let (svc, kind, user) = service_for(&state, &collection).await?;
    check_write(kind, &user)?;
    svc.delete_by_id(&id).await?;
    info!(target: "crmhub::api", collection = %collection, id = %id, uid = %user.uid, "record deleted");
    Ok(Json(json!({"status": "ok"})))
}
