//! Drive: permissions.create.

use crate::google::{api_url, check_response, DriveService, GoogleError, TokenSource};
use async_trait::async_trait;
use std::sync::Arc;

pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenSource>,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl DriveService for DriveClient {
    async fn share_with_user(&self, file_id: &str, email: &str) -> Result<(), GoogleError> {
        let mut url = api_url(&self.base_url, &["drive", "v3", "files", file_id, "permissions"])?;
        url.query_pairs_mut().append_pair("sendNotificationEmail", "true");
        let token = self.token.access_token().await?;
        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "type": "user",
                "role": "writer",
                "emailAddress": email,
            }))
            .send()
            .await?;
        check_response(res).await?;
        log::info!("drive: shared {} with {}", file_id, email);
        Ok(())
    }
}
