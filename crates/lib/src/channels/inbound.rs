//! Messages crossing the transport boundary.

use chrono::{DateTime, Utc};

/// A message from a chat, consumed exactly once by the relay.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: String,
    pub chat_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    /// Command name when the text is a bot command (`/start`, `/start@bot args` -> "start").
    pub fn command(&self) -> Option<&str> {
        let rest = self.text.trim_start().strip_prefix('/')?;
        let word = rest.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// One transport-sized piece of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundChunk {
    pub chat_id: String,
    pub text: String,
}
