//! HTTP tool server: health, tool listing, invocation.

use crate::tools::{ToolDefinition, ToolInvocation, ToolRegistry, ToolResult};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Router over a shared registry.
pub fn tool_router(registry: Arc<ToolRegistry>) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/tools", get(list_tools))
        .route("/tools/invoke", post(invoke_tool))
        .with_state(registry)
}

pub async fn bind_tool_listener(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    log::info!("tool server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve on an already-bound listener until `cancel` fires.
pub async fn serve_tool_server(
    registry: Arc<ToolRegistry>,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<()> {
    axum::serve(listener, tool_router(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("tool server exited")?;
    log::info!("tool server stopped");
    Ok(())
}

/// Bind `addr` and serve until `cancel` fires.
pub async fn run_tool_server(
    registry: Arc<ToolRegistry>,
    addr: &str,
    cancel: CancellationToken,
) -> Result<SocketAddr> {
    let listener = bind_tool_listener(addr).await?;
    let local = listener.local_addr()?;
    serve_tool_server(registry, listener, cancel).await?;
    Ok(local)
}

async fn health_http(State(registry): State<Arc<ToolRegistry>>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "tools": registry.len(),
    }))
}

async fn list_tools(State(registry): State<Arc<ToolRegistry>>) -> Json<Vec<ToolDefinition>> {
    Json(registry.definitions())
}

/// POST /tools/invoke. Tool failures are 200 with `success: false`; only a malformed envelope is 400.
async fn invoke_tool(
    State(registry): State<Arc<ToolRegistry>>,
    body: Result<Json<ToolInvocation>, JsonRejection>,
) -> (StatusCode, Json<ToolResult>) {
    match body {
        Ok(Json(invocation)) => {
            log::debug!("tool server: invoke {}", invocation.tool);
            (StatusCode::OK, Json(registry.invoke_envelope(invocation).await))
        }
        Err(rejection) => (
            StatusCode::BAD_REQUEST,
            Json(ToolResult::failure(format!(
                "Failed to parse invocation: {}",
                rejection.body_text()
            ))),
        ),
    }
}
