//! Dispatcher over a line-delimited JSON stream (stdin/stdout in `courier stdio`).

use crate::server::protocol::{StdioRequest, StdioResponse};
use crate::tools::{ToolInvocation, ToolRegistry};
use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Answer requests until the reader reaches EOF. Bad lines get a failure response with an empty id.
pub async fn serve_stdio<R, W>(registry: &ToolRegistry, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<StdioRequest>(line) {
            Ok(StdioRequest::ListTools { id }) => StdioResponse::listing(id, registry.definitions()),
            Ok(StdioRequest::ToolCall { id, tool, input }) => {
                let result = registry.invoke_envelope(ToolInvocation { tool, input }).await;
                StdioResponse::result(id, result.success, result.text)
            }
            Err(e) => {
                log::warn!("stdio: bad request: {}", e);
                StdioResponse::result("", false, format!("Failed to parse request: {}", e))
            }
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    log::info!("stdio: input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDefinition;
    use tokio::io::BufReader;

    fn registry() -> ToolRegistry {
        #[derive(serde::Deserialize)]
        struct Title {
            title: String,
        }
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolDefinition {
                name: "create_sheet".to_string(),
                description: "Create a sheet".to_string(),
                parameters: serde_json::json!({ "type": "object" }),
            },
            |input: Title| async move { Ok(format!("Spreadsheet created: {}", input.title)) },
        );
        registry
    }

    async fn exchange(input: &str) -> Vec<StdioResponse> {
        let mut out = Vec::new();
        serve_stdio(&registry(), BufReader::new(input.as_bytes()), &mut out)
            .await
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_each_line_in_order() {
        let responses = exchange(
            "{\"id\":\"1\",\"type\":\"list_tools\"}\n\n\
             {\"id\":\"2\",\"type\":\"tool_call\",\"tool\":\"create_sheet\",\"input\":{\"title\":\"T\"}}\n\
             {\"id\":\"3\",\"type\":\"tool_call\",\"tool\":\"nope\",\"input\":{}}\n",
        )
        .await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].tools.as_ref().unwrap()[0].name, "create_sheet");
        assert_eq!(responses[1], StdioResponse::result("2", true, "Spreadsheet created: T"));
        assert_eq!(responses[2], StdioResponse::result("3", false, "Failed to find tool: nope"));
    }

    #[tokio::test]
    async fn malformed_line_gets_failure() {
        let responses = exchange("not json\n").await;
        assert_eq!(responses[0].id, "");
        assert_eq!(responses[0].success, Some(false));
    }
}
