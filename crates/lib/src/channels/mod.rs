//! Chat transports (e.g. Telegram).
//!
//! A transport delivers inbound messages to the relay over an mpsc channel and
//! sends replies back. The relay owns its transport exclusively.

mod inbound;
mod telegram;

pub use inbound::{InboundMessage, OutboundChunk};
pub use telegram::{TelegramChannel, TelegramUpdate};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("transport api error: {0}")]
    Api(String),
    #[error("transport not configured: {0}")]
    NotConfigured(String),
}

/// A bidirectional chat channel driven by the relay.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Transport id (e.g. "telegram").
    fn id(&self) -> &str;

    /// Authenticate and prepare for polling. Called once before `start_inbound`.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Spawn the receive loop. Messages are forwarded in arrival order until
    /// `cancel` fires, `stop` is called, or the receiver is dropped.
    fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>;

    /// Send one text message to a chat.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError>;

    /// Show a typing indicator. Callers ignore failures.
    async fn send_typing(&self, chat_id: &str) -> Result<(), TransportError>;

    /// Stop the receive loop after the current request.
    fn stop(&self);
}
