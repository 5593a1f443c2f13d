//! Line-delimited JSON protocol spoken by `courier stdio` and by attached tool servers.
//!
//! One request per line, one response per line, matched by `id`.

use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Wire request: `{ "id", "type": "list_tools" }` or `{ "id", "type": "tool_call", "tool", "input" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StdioRequest {
    ListTools {
        id: String,
    },
    ToolCall {
        id: String,
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },
}

impl StdioRequest {
    pub fn id(&self) -> &str {
        match self {
            StdioRequest::ListTools { id } | StdioRequest::ToolCall { id, .. } => id,
        }
    }
}

/// Wire response: `{ "id", "tools" }` for a listing, `{ "id", "success", "text" }` for a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StdioResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StdioResponse {
    pub fn listing(id: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            id: id.into(),
            tools: Some(tools),
            ..Default::default()
        }
    }

    pub fn result(id: impl Into<String>, success: bool, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: Some(success),
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let req: StdioRequest = serde_json::from_str(
            r#"{"id":"7","type":"tool_call","tool":"create_sheet","input":{"title":"T"}}"#,
        )
        .unwrap();
        assert_eq!(req.id(), "7");
        match req {
            StdioRequest::ToolCall { tool, input, .. } => {
                assert_eq!(tool, "create_sheet");
                assert_eq!(input["title"], "T");
            }
            other => panic!("unexpected {:?}", other),
        }
        let list = serde_json::to_value(StdioRequest::ListTools { id: "1".into() }).unwrap();
        assert_eq!(list, serde_json::json!({ "type": "list_tools", "id": "1" }));
    }

    #[test]
    fn result_omits_tools() {
        let v = serde_json::to_value(StdioResponse::result("3", false, "Failed to find tool: x"))
            .unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "id": "3", "success": false, "text": "Failed to find tool: x" })
        );
    }
}
