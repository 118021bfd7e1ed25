//!
//! Google Sheets lead sync
//! -----------------------
//! Three operations keep a spreadsheet tab in step with the lead list: create,
//! update and delete a lead row. Rows are keyed by the lead id in column A:
//!
//! | A  | B    | C     | D     | E       | F      | G      | H     | I         |
//! |----|------|-------|-------|---------|--------|--------|-------|-----------|
//! | id | name | email | phone | company | status | source | notes | createdAt |
//!
//! Requests authenticate with a service-account token (see `token`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::SheetsConfig;
use crate::crud::Record;
use crate::domain::{Entity, Lead};
use crate::error::{AppError, AppResult};

mod client;
mod token;

pub use client::SheetsClient;
pub use token::{ServiceAccountTokenSource, StaticTokenSource, TokenSource, SHEETS_SCOPE};

pub(crate) const LAST_COLUMN: &str = "I";

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("sheets sync is not configured")]
    NotConfigured,

    #[error("token exchange failed: {0}")]
    Token(String),

    #[error("invalid service account key: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("sheets request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sheets API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no row for lead '{0}'")]
    RowNotFound(String),

    #[error("sheet '{0}' not found in spreadsheet")]
    SheetNotFound(String),
}

impl From<SheetsError> for AppError {
    fn from(err: SheetsError) -> Self {
        match err {
            SheetsError::NotConfigured => AppError::unavailable("sheets_not_configured".into(), err.to_string()),
            SheetsError::RowNotFound(_) => AppError::not_found("lead_row_not_found".into(), err.to_string()),
            _ => AppError::upstream("sheets_failed".into(), err.to_string()),
        }
    }
}

/// Cell values for one lead, in column order A..I.
pub fn lead_row(lead: &Record<Lead>) -> Vec<String> {
    let d = &lead.data;
    vec![
        lead.id.clone(),
        d.name.clone(),
        d.email.clone(),
        d.phone.clone(),
        d.company.clone(),
        d.status.as_str().to_string(),
        d.source.clone(),
        d.notes.clone(),
        d.created_at.clone().unwrap_or_default(),
    ]
}

/// Build a client from configuration. `Ok(None)` when sheets sync is not set up.
pub fn client_from_config(cfg: &SheetsConfig) -> Result<Option<Arc<SheetsClient>>, SheetsError> {
    let (Some(spreadsheet_id), Some(email), Some(key)) = (&cfg.spreadsheet_id, &cfg.service_account_email, &cfg.private_key) else {
        return Ok(None);
    };
    let tokens = ServiceAccountTokenSource::new(email, key, &cfg.token_uri)?;
    Ok(Some(Arc::new(SheetsClient::new(&cfg.api_base, spreadsheet_id, &cfg.sheet_name, Arc::new(tokens)))))
}

#[derive(Clone)]
pub struct SheetsState {
    pub client: Option<Arc<SheetsClient>>,
}

impl SheetsState {
    fn client(&self) -> AppResult<&SheetsClient> {
        self.client.as_deref().ok_or_else(|| SheetsError::NotConfigured.into())
    }
}

/// Lead payload for row creation; the id is generated when absent.
#[derive(Debug, Deserialize)]
struct CreateRowPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    lead: Lead,
}

/// Router exposing the three lead-row operations.
pub fn router(client: Option<Arc<SheetsClient>>) -> Router {
    Router::new()
        .route("/api/sheets/leads", post(create_row))
        .route("/api/sheets/leads/{id}", put(update_row).delete(delete_row))
        .with_state(SheetsState { client })
}

fn log_failure(op: &str, id: &str, e: &SheetsError) {
    match e {
        SheetsError::RowNotFound(_) => warn!(target: "crmhub::sheets", op, lead_id = %id, "lead row not found"),
        _ => error!(target: "crmhub::sheets", op, lead_id = %id, error = %e, "sheets operation failed"),
    }
}

async fn create_row(State(state): State<SheetsState>, Json(payload): Json<CreateRowPayload>) -> AppResult<Json<serde_json::Value>> {
    let client = state.client()?;
    let id = payload.id.filter(|s| !s.trim().is_empty()).unwrap_or_else(crate::storage::generate_id);
    let mut lead = payload.lead;
    lead.on_create();
    let record = Record { id, data: lead };
    client.create_lead_row(&record).await.inspect_err(|e| log_failure("create", &record.id, e))?;
    Ok(Json(json!({ "status": "ok", "id": record.id })))
}

async fn update_row(
    State(state): State<SheetsState>,
    Path(id): Path<String>,
    Json(lead): Json<Lead>,
) -> AppResult<Json<serde_json::Value>> {
    let client = state.client()?;
    let record = Record { id, data: lead };
    client.update_lead_row(&record).await.inspect_err(|e| log_failure("update", &record.id, e))?;
    Ok(Json(json!({ "status": "ok", "id": record.id })))
}

async fn delete_row(State(state): State<SheetsState>, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let client = state.client()?;
    client.delete_lead_row(&id).await.inspect_err(|e| log_failure("delete", &id, e))?;
    Ok(Json(json!({ "status": "ok", "id": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeadStatus;

    #[test]
    fn row_layout_matches_columns() {
        let rec = Record {
            id: "lead-1".to_string(),
            data: Lead {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                status: LeadStatus::Qualified,
                created_at: Some("2026-01-02T00:00:00Z".into()),
                ..Default::default()
            },
        };
        let row = lead_row(&rec);
        assert_eq!(row.len(), 9);
        assert_eq!(row[0], "lead-1");
        assert_eq!(row[5], "qualified");
        assert_eq!(row[8], "2026-01-02T00:00:00Z");
    }

    #[test]
    fn row_never_invents_a_timestamp() {
        let rec = Record { id: "lead-2".to_string(), data: Lead { name: "Grace".into(), ..Default::default() } };
        assert_eq!(lead_row(&rec)[8], "");
    }

    #[test]
    fn unconfigured_yields_no_client() {
        let cfg = SheetsConfig { sheet_name: "Leads".into(), ..Default::default() };
        assert!(client_from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn error_mapping() {
        assert_eq!(AppError::from(SheetsError::NotConfigured).http_status(), 503);
        assert_eq!(AppError::from(SheetsError::RowNotFound("x".into())).http_status(), 404);
        assert_eq!(AppError::from(SheetsError::Api { status: 403, body: "denied".into() }).http_status(), 500);
    }
}
