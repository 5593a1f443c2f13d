//! Google Workspace service handles (Gmail, Sheets, Drive).
//!
//! One handle per API family, built once at startup and shared read-only by
//! the tool handlers. Each family is a trait so handlers can be exercised with
//! substitute handles.

mod auth;
mod drive;
mod gmail;
mod sheets;

pub use auth::{ServiceAccountAuth, StaticToken, TokenSource, WORKSPACE_SCOPES};
pub use drive::DriveClient;
pub use gmail::{encode_raw_message, GmailClient};
pub use sheets::SheetsClient;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("<HttpError {status}: {message}>")]
    Api { status: u16, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid credentials: {0}")]
    Credentials(String),
    #[error("invalid url: {0}")]
    Url(String),
}

/// Sends mail on behalf of the authenticated account.
#[async_trait]
pub trait MailService: Send + Sync {
    /// Send a plain-text email; returns the message id.
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String, GoogleError>;
}

/// Creates and appends to spreadsheets.
#[async_trait]
pub trait SheetsService: Send + Sync {
    /// Create a spreadsheet; returns its id.
    async fn create_spreadsheet(&self, title: &str) -> Result<String, GoogleError>;

    /// Append rows after the table found in `range`.
    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), GoogleError>;
}

/// Shares files.
#[async_trait]
pub trait DriveService: Send + Sync {
    /// Grant `email` writer access to `file_id` and notify them.
    async fn share_with_user(&self, file_id: &str, email: &str) -> Result<(), GoogleError>;
}

/// API base URLs. Overridable for tests and proxies.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub gmail: String,
    pub sheets: String,
    pub drive: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            gmail: "https://gmail.googleapis.com".to_string(),
            sheets: "https://sheets.googleapis.com".to_string(),
            drive: "https://www.googleapis.com".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// All three families served from one base URL.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            gmail: base.clone(),
            sheets: base.clone(),
            drive: base,
        }
    }
}

/// The process-wide set of service handles. Cloning shares the same handles.
#[derive(Clone)]
pub struct ServiceHandles {
    pub mail: Arc<dyn MailService>,
    pub sheets: Arc<dyn SheetsService>,
    pub drive: Arc<dyn DriveService>,
}

impl ServiceHandles {
    /// Google-backed handles sharing one token source and HTTP client.
    pub fn google(token: Arc<dyn TokenSource>, endpoints: GoogleEndpoints) -> Self {
        let http = reqwest::Client::new();
        Self {
            mail: Arc::new(GmailClient::new(http.clone(), &endpoints.gmail, token.clone())),
            sheets: Arc::new(SheetsClient::new(http.clone(), &endpoints.sheets, token.clone())),
            drive: Arc::new(DriveClient::new(http, &endpoints.drive, token)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Map a non-success response to `GoogleError::Api`, using the JSON error message when present.
async fn check_response(res: reqwest::Response) -> Result<reqwest::Response, GoogleError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    Err(GoogleError::Api { status, message })
}

/// Append path segments (percent-encoded) to a base URL.
fn api_url(base: &str, segments: &[&str]) -> Result<reqwest::Url, GoogleError> {
    let mut url = reqwest::Url::parse(base).map_err(|e| GoogleError::Url(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| GoogleError::Url(format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_encodes_segments() {
        let url = api_url(
            "https://sheets.googleapis.com",
            &["v4", "spreadsheets", "abc", "values", "Sheet 1!A1:append"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/Sheet%201!A1:append"
        );
    }

    #[test]
    fn api_error_display_matches_remote_description() {
        let err = GoogleError::Api {
            status: 403,
            message: "Insufficient Permission".to_string(),
        };
        assert_eq!(err.to_string(), "<HttpError 403: Insufficient Permission>");
    }
}
