use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::SheetsError;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Refresh this long before the provider-reported expiry.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Supplies OAuth bearer tokens for the Sheets API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, SheetsError>;
}

/// Fixed token, for tests and for tokens minted outside the process.
pub struct StaticTokenSource(pub String);

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, SheetsError> { Ok(self.0.clone()) }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 { 3600 }

/// Service-account flow: sign an RS256 assertion and exchange it at the token
/// URI. The resulting token is cached until shortly before it expires.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    key: EncodingKey,
    token_uri: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl ServiceAccountTokenSource {
    pub fn new(client_email: &str, private_key_pem: &str, token_uri: &str) -> Result<Self, SheetsError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
        Ok(Self {
            http: reqwest::Client::new(),
            client_email: client_email.to_string(),
            key,
            token_uri: token_uri.to_string(),
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self) -> Result<String, SheetsError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims { iss: &self.client_email, scope: SHEETS_SCOPE, aud: &self.token_uri, iat: now, exp: now + 3600 };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.key)?)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + EXPIRY_SLACK < *expires_at {
                return Ok(token.clone());
            }
        }
        let assertion = self.assertion()?;
        let resp = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetsError::Token(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        let tr: TokenResponse = resp.json().await?;
        debug!(target: "crmhub::sheets", expires_in = tr.expires_in, "obtained service account token");
        *cached = Some((tr.access_token.clone(), Instant::now() + Duration::from_secs(tr.expires_in)));
        Ok(tr.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_private_key() {
        let err = ServiceAccountTokenSource::new("svc@example.com", "not a pem", "https://oauth2.googleapis.com/token");
        assert!(matches!(err, Err(SheetsError::Jwt(_))));
    }

    #[tokio::test]
    async fn static_source_returns_its_token() {
        let t = StaticTokenSource("ya29.test".into());
        assert_eq!(t.access_token().await.unwrap(), "ya29.test");
    }
}
