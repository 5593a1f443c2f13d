//! Sheets: spreadsheets.create and spreadsheets.values.append.

use crate::google::{api_url, check_response, GoogleError, SheetsService, TokenSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl SheetsService for SheetsClient {
    async fn create_spreadsheet(&self, title: &str) -> Result<String, GoogleError> {
        let mut url = api_url(&self.base_url, &["v4", "spreadsheets"])?;
        url.query_pairs_mut().append_pair("fields", "spreadsheetId");
        let token = self.token.access_token().await?;
        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "properties": { "title": title } }))
            .send()
            .await?;
        let created: CreatedSpreadsheet = check_response(res).await?.json().await?;
        log::info!("sheets: created spreadsheet {}", created.spreadsheet_id);
        Ok(created.spreadsheet_id)
    }

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), GoogleError> {
        let target = format!("{}:append", range);
        let mut url = api_url(
            &self.base_url,
            &["v4", "spreadsheets", spreadsheet_id, "values", &target],
        )?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let token = self.token.access_token().await?;
        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "values": values }))
            .send()
            .await?;
        check_response(res).await?;
        log::info!("sheets: appended {} row(s) to {}", values.len(), spreadsheet_id);
        Ok(())
    }
}
