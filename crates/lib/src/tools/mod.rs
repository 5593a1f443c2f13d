//! Tool layer: a registry of named, schema-validated tools.
//!
//! `invoke` never fails past this boundary: unknown tools, invalid input,
//! remote failures and handler panics all come back as a `ToolResult` with
//! `success = false` and a `Failed to ...` description.

mod external;
mod table;
mod workspace;

pub use external::{attach_tool_servers, ExternalToolError, ExternalToolServer};
pub use table::normalize_rows;
pub use workspace::{
    register_workspace_tools, AppendSheetInput, CreateSheetInput, EmailInput, ShareFileInput,
};

use crate::google::GoogleError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A tool as advertised to agents and clients (name, description, JSON schema of its input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Wire envelope: `{ "tool": <name>, "input": <object> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolInvocation {
    /// The tool input; `{"input": {...}}` (as some clients nest it) is unwrapped.
    pub fn into_payload(self) -> serde_json::Value {
        match self.input {
            serde_json::Value::Object(mut map)
                if map.len() == 1 && map.get("input").map_or(false, |v| v.is_object()) =>
            {
                map.remove("input").unwrap_or_default()
            }
            other => other,
        }
    }
}

/// Outcome of one invocation. Callers look only at `success` (or the `Failed to` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub text: String,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to find tool: {0}")]
    UnknownTool(String),
    #[error("Failed to validate input for {tool}: {message}")]
    Validation { tool: String, message: String },
    #[error("Failed to {action}: {source}")]
    Remote {
        action: &'static str,
        #[source]
        source: GoogleError,
    },
    #[error("Failed to run {tool}: {message}")]
    Fault { tool: String, message: String },
    /// Failure text produced by another tool server, passed through verbatim.
    #[error("{0}")]
    Reported(String),
}

type ToolFuture = BoxFuture<'static, Result<String, ToolError>>;

/// Validates raw input and, only when valid, produces the handler future.
type ErasedHandler = Arc<dyn Fn(serde_json::Value) -> Result<ToolFuture, ToolError> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ErasedHandler,
}

/// Process-wide registry mapping tool names to handlers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler over a typed input record. The record's `Deserialize`
    /// impl is the schema: a payload that does not decode never reaches `handler`.
    /// Registering an existing name replaces it.
    pub fn register<I, F, Fut>(&mut self, definition: ToolDefinition, handler: F)
    where
        I: DeserializeOwned + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let name = definition.name.clone();
        let tool = name.clone();
        let erased: ErasedHandler = Arc::new(move |raw: serde_json::Value| {
            let input: I = serde_json::from_value(raw).map_err(|e| ToolError::Validation {
                tool: tool.clone(),
                message: e.to_string(),
            })?;
            Ok(handler(input).boxed())
        });
        if self
            .tools
            .insert(name.clone(), RegisteredTool { definition, handler: erased })
            .is_some()
        {
            log::warn!("tools: {} registered twice, keeping the latest", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered definitions sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a tool by name with a raw JSON payload.
    pub async fn invoke(&self, name: &str, payload: serde_json::Value) -> ToolResult {
        match self.try_invoke(name, payload).await {
            Ok(text) => {
                log::info!("tools: {} succeeded", name);
                ToolResult::ok(text)
            }
            Err(e) => {
                log::warn!("tools: {}", e);
                ToolResult::failure(e.to_string())
            }
        }
    }

    /// Invoke from the wire envelope.
    pub async fn invoke_envelope(&self, invocation: ToolInvocation) -> ToolResult {
        let name = invocation.tool.clone();
        self.invoke(&name, invocation.into_payload()).await
    }

    async fn try_invoke(&self, name: &str, payload: serde_json::Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let fault = |message: String| ToolError::Fault {
            tool: name.to_string(),
            message,
        };
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| (tool.handler)(payload)))
            .map_err(|panic| fault(panic_message(&*panic)))??;
        AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .map_err(|panic| fault(panic_message(&*panic)))?
    }
}

/// Best-effort description of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
