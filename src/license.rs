//!
//! License verification proxy
//! --------------------------
//! `POST /api/license/verify` accepts `{ "tenantId": "..." }` and asks the
//! license panel whether the tenant is licensed. The panel's JSON answer is
//! relayed verbatim; any upstream failure becomes a flat 500.
//!
//! Two verifiers exist behind one route: `UpstreamVerifier` forwards with the
//! configured bearer token, `DevVerifier` answers `{"status":"active"}` for
//! every tenant and is selected with `LICENSE_MODE=dev`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{Config, LicenseMode};

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("license panel is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("license panel request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("license panel returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("license panel returned a non-JSON body: {0}")]
    InvalidBody(String),
}

#[async_trait]
pub trait LicenseVerifier: Send + Sync {
    async fn verify(&self, tenant_id: &str) -> Result<serde_json::Value, LicenseError>;
}

pub struct UpstreamVerifier {
    client: reqwest::Client,
    panel_url: String,
    token: String,
}

impl UpstreamVerifier {
    pub fn new(panel_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), panel_url: panel_url.into(), token: token.into() }
    }
}

#[async_trait]
impl LicenseVerifier for UpstreamVerifier {
    async fn verify(&self, tenant_id: &str) -> Result<serde_json::Value, LicenseError> {
        let resp = self
            .client
            .post(&self.panel_url)
            .bearer_auth(&self.token)
            .json(&json!({ "tenantId": tenant_id }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(LicenseError::UpstreamStatus { status: status.as_u16(), body });
        }
        serde_json::from_str(&body).map_err(|e| LicenseError::InvalidBody(e.to_string()))
    }
}

/// Local development stand-in for the panel.
pub struct DevVerifier;

#[async_trait]
impl LicenseVerifier for DevVerifier {
    async fn verify(&self, _tenant_id: &str) -> Result<serde_json::Value, LicenseError> {
        Ok(json!({ "status": "active" }))
    }
}

/// Panel stand-in used when upstream mode is selected but the panel URL or
/// token is missing; every verification fails with a 500.
struct UnconfiguredVerifier(&'static str);

#[async_trait]
impl LicenseVerifier for UnconfiguredVerifier {
    async fn verify(&self, _tenant_id: &str) -> Result<serde_json::Value, LicenseError> {
        Err(LicenseError::NotConfigured(self.0))
    }
}

pub fn verifier_from_config(cfg: &Config) -> Arc<dyn LicenseVerifier> {
    match cfg.license_mode {
        LicenseMode::Dev => {
            info!(target: "crmhub::license", "license verification in dev mode; all tenants report active");
            Arc::new(DevVerifier)
        }
        LicenseMode::Upstream => match (&cfg.license.panel_url, &cfg.license.panel_token) {
            (Some(url), Some(token)) => Arc::new(UpstreamVerifier::new(url.clone(), token.clone())),
            (None, _) => Arc::new(UnconfiguredVerifier("LICENSE_PANEL_URL is not set")),
            (_, None) => Arc::new(UnconfiguredVerifier("LICENSE_PANEL_TOKEN is not set")),
        },
    }
}

#[derive(Clone)]
pub struct LicenseState {
    pub verifier: Arc<dyn LicenseVerifier>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyPayload {
    #[serde(default)]
    tenant_id: Option<String>,
}

/// Router exposing `POST /api/license/verify`.
pub fn router(verifier: Arc<dyn LicenseVerifier>) -> Router {
    Router::new()
        .route("/api/license/verify", post(verify_handler))
        .with_state(LicenseState { verifier })
}

async fn verify_handler(State(state): State<LicenseState>, body: Bytes) -> impl IntoResponse {
    // Unparsable bodies are treated like a missing tenantId
    let payload: VerifyPayload = serde_json::from_slice(&body).unwrap_or_default();
    let Some(tenant_id) = payload.tenant_id.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "tenantId is required" })));
    };
    match state.verifier.verify(&tenant_id).await {
        Ok(v) => (StatusCode::OK, Json(v)),
        Err(e) => {
            error!(target: "crmhub::license", tenant_id = %tenant_id, error = %e, "license verification failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "License verification failed" })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Config {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_map(&m).unwrap()
    }

    #[tokio::test]
    async fn dev_mode_reports_active() {
        let v = verifier_from_config(&cfg(&[("LICENSE_MODE", "dev")]));
        assert_eq!(v.verify("tenant-1").await.unwrap(), json!({"status": "active"}));
    }

    #[tokio::test]
    async fn upstream_without_settings_fails() {
        let v = verifier_from_config(&cfg(&[]));
        assert!(matches!(v.verify("tenant-1").await, Err(LicenseError::NotConfigured(_))));
        let v = verifier_from_config(&cfg(&[("LICENSE_PANEL_URL", "http://127.0.0.1:9/verify")]));
        assert!(matches!(v.verify("tenant-1").await, Err(LicenseError::NotConfigured(_))));
    }
}
