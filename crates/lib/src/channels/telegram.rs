//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::{ChatTransport, TransportError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const POLL_ERROR_BACKOFF_SECS: u64 = 2;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUpdate {
    /// Convert a text message update into an inbound message. Non-text updates yield None.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let msg = self.message?;
        let text = msg.text?;
        let sender = msg.from.map(|u| u.id.to_string()).unwrap_or_default();
        Some(InboundMessage::new(sender, msg.chat.id.to_string(), text))
    }
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    /// Use a custom Bot API server (local bot-api, or a test double).
    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, TransportError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| TransportError::NotConfigured("telegram bot token".to_string()))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// POST a Bot API method and decode the `result` field.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>, TransportError> {
        let url = self.method_url(method)?;
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse<T> = res.json().await?;
        if !data.ok {
            return Err(TransportError::Api(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            )));
        }
        Ok(data.result)
    }

    /// Call getMe; returns the bot username when the token is valid.
    pub async fn get_me(&self) -> Result<String, TransportError> {
        let me: Option<TelegramUser> = self.call("getMe", serde_json::json!({})).await?;
        Ok(me.and_then(|u| u.username).unwrap_or_default())
    }

    /// Remove webhook so the bot can use getUpdates.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: Option<bool> = self.call("deleteWebhook", serde_json::json!({})).await?;
        Ok(())
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), TransportError> {
        let mut body = serde_json::json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            body["offset"] = serde_json::Value::from(off);
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", body).await?.unwrap_or_default();
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Send a text message to a chat via sendMessage API.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let _: Option<serde_json::Value> = self.call("sendMessage", body).await?;
        Ok(())
    }

    /// Send the "typing" chat action.
    pub async fn send_typing(&self, chat_id: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _: Option<bool> = self.call("sendChatAction", body).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = channel.get_updates(offset) => polled,
        };
        match polled {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for inbound in updates.into_iter().filter_map(TelegramUpdate::into_inbound) {
                    log::debug!("telegram: message from chat {}", inbound.chat_id);
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => None,
                        sent = inbound_tx.send(inbound) => Some(sent),
                    };
                    match sent {
                        Some(Ok(())) => {}
                        Some(Err(_)) => {
                            log::debug!("telegram: inbound channel closed, stopping loop");
                            return;
                        }
                        None => {
                            log::info!("telegram channel: cancelled while forwarding, loop stopped");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(POLL_ERROR_BACKOFF_SECS)) => {}
                }
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChatTransport for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let username = self.get_me().await?;
        log::info!("telegram: authenticated as @{}", username);
        self.delete_webhook().await?;
        Ok(())
    }

    fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(run_get_updates_loop(self, inbound_tx, cancel))
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        TelegramChannel::send_message(self, chat_id, text).await
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), TransportError> {
        TelegramChannel::send_typing(self, chat_id).await
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Resolve Telegram bot API base URL (TELEGRAM_API_BASE overrides the public endpoint).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}
