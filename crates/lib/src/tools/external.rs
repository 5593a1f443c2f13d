//! External tool servers: child processes speaking the stdio line protocol.
//!
//! Each server is spawned once at startup, asked for its tools, and every
//! advertised tool is registered with a pass-through handler. The child is
//! killed when the last handle to it is dropped.

use crate::config::ToolServerConfig;
use crate::server::{StdioRequest, StdioResponse};
use crate::tools::{ToolDefinition, ToolError, ToolRegistry};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ExternalToolError {
    #[error("failed to spawn tool server {id}: {source}")]
    Spawn {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool server {0}: i/o error: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("tool server {0} closed its output")]
    Closed(String),
    #[error("tool server {0} timed out")]
    Timeout(String),
    #[error("tool server {id} sent an invalid response: {message}")]
    Protocol { id: String, message: String },
}

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A running tool server. Requests are serialized over its single stdio pair.
pub struct ExternalToolServer {
    id: String,
    pipes: Mutex<Pipes>,
    _child: Child,
}

impl ExternalToolServer {
    /// Spawn the configured command with piped stdin/stdout (stderr inherited).
    pub fn launch(config: &ToolServerConfig) -> Result<Self, ExternalToolError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(ref dir) = config.cwd {
            command.current_dir(dir);
        }
        let spawn_err = |source| ExternalToolError::Spawn {
            id: config.id.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(spawn_err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stdio not captured",
            )));
        };
        log::info!("tools: launched tool server {} ({})", config.id, config.command);
        Ok(Self {
            id: config.id.clone(),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            _child: child,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ExternalToolError> {
        let id = uuid::Uuid::new_v4().to_string();
        let res = self.request(&StdioRequest::ListTools { id }).await?;
        res.tools.ok_or_else(|| self.protocol("missing tools"))
    }

    /// Call a tool. A reported failure becomes `ToolError::Reported` with the server's text.
    pub async fn call(&self, tool: &str, input: serde_json::Value) -> Result<String, ToolError> {
        let id = uuid::Uuid::new_v4().to_string();
        let req = StdioRequest::ToolCall {
            id,
            tool: tool.to_string(),
            input,
        };
        let res = self.request(&req).await.map_err(|e| ToolError::Fault {
            tool: tool.to_string(),
            message: e.to_string(),
        })?;
        match (res.success, res.text) {
            (Some(true), text) => Ok(text.unwrap_or_default()),
            (_, Some(text)) if !text.trim().is_empty() => Err(ToolError::Reported(text)),
            _ => Err(ToolError::Fault {
                tool: tool.to_string(),
                message: "no result text".to_string(),
            }),
        }
    }

    async fn request(&self, req: &StdioRequest) -> Result<StdioResponse, ExternalToolError> {
        let mut line = serde_json::to_string(req).map_err(|e| self.protocol(&e.to_string()))?;
        line.push('\n');
        let mut pipes = self.pipes.lock().await;
        let exchange = async {
            pipes
                .stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ExternalToolError::Io(self.id.clone(), e))?;
            pipes
                .stdin
                .flush()
                .await
                .map_err(|e| ExternalToolError::Io(self.id.clone(), e))?;
            loop {
                let mut buf = String::new();
                let n = pipes
                    .stdout
                    .read_line(&mut buf)
                    .await
                    .map_err(|e| ExternalToolError::Io(self.id.clone(), e))?;
                if n == 0 {
                    return Err(ExternalToolError::Closed(self.id.clone()));
                }
                let buf = buf.trim();
                if buf.is_empty() {
                    continue;
                }
                let res: StdioResponse = match serde_json::from_str(buf) {
                    Ok(r) => r,
                    Err(e) => {
                        log::debug!("tools: {} ignoring non-protocol line: {}", self.id, e);
                        continue;
                    }
                };
                if res.id == req.id() {
                    return Ok(res);
                }
                log::debug!("tools: {} ignoring response for stale id {}", self.id, res.id);
            }
        };
        tokio::time::timeout(REQUEST_TIMEOUT, exchange)
            .await
            .map_err(|_| ExternalToolError::Timeout(self.id.clone()))?
    }

    fn protocol(&self, message: &str) -> ExternalToolError {
        ExternalToolError::Protocol {
            id: self.id.clone(),
            message: message.to_string(),
        }
    }
}

/// Launch every configured server and register its tools. Returns the number of tools added.
pub async fn attach_tool_servers(
    registry: &mut ToolRegistry,
    configs: &[ToolServerConfig],
) -> Result<usize, ExternalToolError> {
    let mut added = 0;
    for config in configs {
        let server = Arc::new(ExternalToolServer::launch(config)?);
        let tools = server.list_tools().await?;
        log::info!("tools: {} advertises {} tool(s)", server.id(), tools.len());
        for definition in tools {
            let server = server.clone();
            let name = definition.name.clone();
            registry.register(definition, move |input: serde_json::Value| {
                let server = server.clone();
                let name = name.clone();
                async move { server.call(&name, input).await }
            });
            added += 1;
        }
    }
    Ok(added)
}
