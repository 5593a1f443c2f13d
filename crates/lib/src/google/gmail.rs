//! Gmail: users.messages.send.

use crate::google::{api_url, check_response, GoogleError, MailService, TokenSource};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;

pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// RFC 822 message, base64url-encoded for the `raw` field.
pub fn encode_raw_message(to: &str, subject: &str, body: &str) -> String {
    let message = format!("To: {}\r\nSubject: {}\r\n\r\n{}", to, subject, body);
    base64::engine::general_purpose::URL_SAFE.encode(message.as_bytes())
}

impl GmailClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl MailService for GmailClient {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String, GoogleError> {
        let url = api_url(&self.base_url, &["gmail", "v1", "users", "me", "messages", "send"])?;
        let token = self.token.access_token().await?;
        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": encode_raw_message(to, subject, body) }))
            .send()
            .await?;
        let sent: SentMessage = check_response(res).await?.json().await?;
        log::info!("gmail: sent message {}", sent.id);
        Ok(sent.id)
    }
}
