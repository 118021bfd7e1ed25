use std::sync::Arc;

use serde_json::json;
use tracing::info;

use super::token::TokenSource;
use super::{lead_row, SheetsError, LAST_COLUMN};
use crate::crud::Record;
use crate::domain::Lead;

/// Google Sheets v4 client bound to one spreadsheet and sheet (tab).
pub struct SheetsClient {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    sheet_name: String,
    tokens: Arc<dyn TokenSource>,
}

impl SheetsClient {
    pub fn new(api_base: &str, spreadsheet_id: &str, sheet_name: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            tokens,
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{}", self.api_base, self.spreadsheet_id, urlencoding::encode(range))
    }

    async fn check(resp: reqwest::Response) -> Result<serde_json::Value, SheetsError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SheetsError::Api { status: status.as_u16(), body });
        }
        if body.trim().is_empty() { return Ok(serde_json::Value::Null); }
        serde_json::from_str(&body).map_err(|e| SheetsError::Api { status: status.as_u16(), body: e.to_string() })
    }

    /// Append the lead as a new row.
    pub async fn create_lead_row(&self, lead: &Record<Lead>) -> Result<(), SheetsError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}:append", self.values_url(&format!("{}!A:{}", self.sheet_name, LAST_COLUMN)));
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [lead_row(lead)] }))
            .send()
            .await?;
        Self::check(resp).await?;
        info!(target: "crmhub::sheets", lead_id = %lead.id, "appended lead row");
        Ok(())
    }

    /// Overwrite the row holding `lead.id`.
    pub async fn update_lead_row(&self, lead: &Record<Lead>) -> Result<(), SheetsError> {
        let row = self.find_row(&lead.id).await?;
        let token = self.tokens.access_token().await?;
        let range = format!("{}!A{row}:{}{row}", self.sheet_name, LAST_COLUMN, row = row);
        let resp = self
            .http
            .put(self.values_url(&range))
            .bearer_auth(token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "majorDimension": "ROWS", "values": [lead_row(lead)] }))
            .send()
            .await?;
        Self::check(resp).await?;
        info!(target: "crmhub::sheets", lead_id = %lead.id, row, "updated lead row");
        Ok(())
    }

    /// Remove the row holding `lead_id`, shifting later rows up.
    pub async fn delete_lead_row(&self, lead_id: &str) -> Result<(), SheetsError> {
        let row = self.find_row(lead_id).await?;
        let sheet_id = self.sheet_id().await?;
        let token = self.tokens.access_token().await?;
        let url = format!("{}/{}:batchUpdate", self.api_base, self.spreadsheet_id);
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": { "sheetId": sheet_id, "dimension": "ROWS", "startIndex": row - 1, "endIndex": row }
                }
            }]
        });
        let resp = self.http.post(url).bearer_auth(token).json(&body).send().await?;
        Self::check(resp).await?;
        info!(target: "crmhub::sheets", lead_id = %lead_id, row, "deleted lead row");
        Ok(())
    }

    /// 1-based row number whose column A equals `lead_id`.
    pub async fn find_row(&self, lead_id: &str) -> Result<u64, SheetsError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .get(self.values_url(&format!("{}!A:A", self.sheet_name)))
            .bearer_auth(token)
            .send()
            .await?;
        let v = Self::check(resp).await?;
        let rows = v.get("values").and_then(|x| x.as_array()).cloned().unwrap_or_default();
        rows.iter()
            .position(|r| r.get(0).and_then(|c| c.as_str()) == Some(lead_id))
            .map(|idx| idx as u64 + 1)
            .ok_or_else(|| SheetsError::RowNotFound(lead_id.to_string()))
    }

    async fn sheet_id(&self) -> Result<i64, SheetsError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/{}", self.api_base, self.spreadsheet_id);
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties")])
            .send()
            .await?;
        let v = Self::check(resp).await?;
        v.get("sheets")
            .and_then(|s| s.as_array())
            .and_then(|sheets| {
                sheets.iter().find_map(|s| {
                    let props = s.get("properties")?;
                    if props.get("title")?.as_str()? == self.sheet_name { props.get("sheetId")?.as_i64() } else { None }
                })
            })
            .ok_or_else(|| SheetsError::SheetNotFound(self.sheet_name.clone()))
    }
}
