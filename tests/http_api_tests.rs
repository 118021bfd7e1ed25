//! End-to-end HTTP tests against the full application router.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use crmhub::license::DevVerifier;
use crmhub::server::{app, AppState};
use crmhub::storage::{DocumentStore, MemoryStore, SharedStore};

struct TestServer {
    base: String,
    store: SharedStore,
    http: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let router = app(AppState::new(store.clone()), Arc::new(DevVerifier), None);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { base: format!("http://{}", addr), store, http: reqwest::Client::new() }
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let v = if text.is_empty() { Value::Null } else { serde_json::from_str(&text).unwrap_or(Value::String(text)) };
        (status, v)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) { self.send(reqwest::Method::GET, path, None).await }
    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) { self.send(reqwest::Method::POST, path, Some(body)).await }
    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) { self.send(reqwest::Method::PUT, path, Some(body)).await }
    async fn delete(&self, path: &str) -> (StatusCode, Value) { self.send(reqwest::Method::DELETE, path, None).await }

    async fn register(&self, email: &str) -> Value {
        let (status, v) = self.post("/api/auth/register", json!({"email": email, "password": "hunter22"})).await;
        assert_eq!(status, StatusCode::CREATED, "{}", v);
        v
    }
}

#[tokio::test]
async fn crud_requires_a_session() {
    let srv = TestServer::start().await;
    let (status, session) = srv.get("/api/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"], Value::Null);

    let (status, v) = srv.get("/api/leads").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["code"], "not_signed_in");
    let (status, _) = srv.post("/api/leads", json!({"name": "x"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_sign_out_sign_in() {
    let srv = TestServer::start().await;
    let session = srv.register("Owner@Example.com").await;
    assert_eq!(session["loading"], false);
    assert_eq!(session["user"]["email"], "owner@example.com");
    assert_eq!(session["user"]["role"]["name"], "user");

    let (status, _) = srv.post("/api/auth/register", json!({"email": "owner@example.com", "password": "another1"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, v) = srv.post("/api/auth/sign-out", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, json!({"user": null, "loading": false}));

    let (status, v) = srv.post("/api/auth/sign-in", json!({"email": "owner@example.com", "password": "wrong-pass"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["code"], "invalid_credentials");

    let (status, v) = srv.post("/api/auth/sign-in", json!({"email": "owner@example.com", "password": "hunter22"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["user"]["uid"], session["user"]["uid"]);
    let (_, current) = srv.get("/api/session").await;
    assert_eq!(current, v);
}

#[tokio::test]
async fn lead_crud_over_http() {
    let srv = TestServer::start().await;
    srv.register("sales@example.com").await;

    let (status, created) = srv
        .post("/api/leads", json!({"name": "Ada", "email": "ada@example.com", "company": "Engines", "value": 5000}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "new");

    let (status, list) = srv.get("/api/leads").await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["company"], "Engines");

    let (status, updated) = srv.put(&format!("/api/leads/{}", id), json!({"status": "qualified"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "qualified");
    assert_eq!(updated["id"], id.as_str());
    // fields left out of the body keep their stored values
    assert_eq!(updated["name"], "Ada");
    assert_eq!(updated["company"], "Engines");
    assert_eq!(updated["value"], 5000.0);
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let (status, _) = srv.delete(&format!("/api/leads/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, v) = srv.get(&format!("/api/leads/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["status"], "error");
}

#[tokio::test]
async fn invalid_payload_and_unknown_collection() {
    let srv = TestServer::start().await;
    srv.register("ops@example.com").await;

    let (status, v) = srv.post("/api/leads", json!({"status": "not-a-status"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["code"], "invalid_document");

    let (status, v) = srv.get("/api/widgets").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["code"], "unknown_collection");

    let (status, _) = srv.get("/api/credentials").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv.put("/api/tasks/missing", json!({"title": "x"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_admins_write_user_profiles() {
    let srv = TestServer::start().await;
    let session = srv.register("boss@example.com").await;
    let uid = session["user"]["uid"].as_str().unwrap().to_string();

    // Profiles are readable by any signed-in user
    let (status, list) = srv.get("/api/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["id"], uid.as_str());

    let (status, v) = srv.put(&format!("/api/users/{}", uid), json!({"role": {"id": "admin", "name": "admin"}})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["code"], "forbidden");

    // Promote out of band, then re-authenticate to pick up the new role
    let mut patch = serde_json::Map::new();
    patch.insert("role".into(), json!({"id": "admin", "name": "admin"}));
    srv.store.update("users", &uid, patch).await.unwrap();
    srv.post("/api/auth/sign-out", json!({})).await;
    let (_, v) = srv.post("/api/auth/sign-in", json!({"email": "boss@example.com", "password": "hunter22"})).await;
    assert_eq!(v["user"]["role"]["name"], "admin");

    let (status, v) = srv.put(&format!("/api/users/{}", uid), json!({"displayName": "The Boss"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["displayName"], "The Boss");
    assert_eq!(v["email"], "boss@example.com");
    assert_eq!(v["role"]["name"], "admin");
}

#[tokio::test]
async fn license_and_sheets_routes_are_mounted() {
    let srv = TestServer::start().await;

    let (status, v) = srv.post("/api/license/verify", json!({"tenantId": "acme"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, json!({"status": "active"}));

    let (status, v) = srv.post("/api/sheets/leads", json!({"name": "Ada"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["code"], "sheets_not_configured");
}
