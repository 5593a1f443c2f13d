//! LLM abstraction and Ollama client.
//!
//! Chat completion with function calling against a local Ollama instance.

mod ollama;

pub use ollama::{
    ChatMessage, ChatResponse, OllamaClient, OllamaError, ToolCall, ToolCallFunction,
    ToolDefinition, ToolFunctionDefinition,
};

use async_trait::async_trait;

/// A chat model the agent loop can drive.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, OllamaError>;
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, OllamaError> {
        OllamaClient::chat(self, model, messages, tools).await
    }
}
