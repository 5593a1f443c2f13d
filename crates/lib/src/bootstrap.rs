//! Startup wiring for the entry modes: credentials, registry, relay, tool server.
//!
//! Everything that can fail before the relay starts (missing token, unreadable
//! credentials, unattachable tool server, bind failure) is an error here.

use crate::agent::{AgentInvoker, OllamaAgent};
use crate::channels::TelegramChannel;
use crate::config::{self, env_nonempty, Config};
use crate::google::{GoogleEndpoints, ServiceAccountAuth, ServiceHandles, StaticToken, TokenSource};
use crate::llm::OllamaClient;
use crate::relay::{split_chunks, BackgroundTask, Relay, RelaySettings};
use crate::server::{bind_tool_listener, run_tool_server, serve_stdio, serve_tool_server};
use crate::tools::{attach_tool_servers, register_workspace_tools, ToolRegistry, ToolResult};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Google handles from GOOGLE_ACCESS_TOKEN, or else the service-account key file.
pub async fn service_handles(config: &Config, config_path: &Path) -> Result<ServiceHandles> {
    let token: Arc<dyn TokenSource> = match env_nonempty("GOOGLE_ACCESS_TOKEN") {
        Some(token) => {
            log::info!("google: using access token from GOOGLE_ACCESS_TOKEN");
            Arc::new(StaticToken(token))
        }
        None => {
            let path = config::resolve_credentials_file(config, config_path);
            let auth = ServiceAccountAuth::from_file(&path)
                .await
                .with_context(|| format!("loading Google credentials from {}", path.display()))?;
            log::info!("google: using service account {}", auth.client_email());
            Arc::new(auth.with_subject(config.google.impersonate.clone()))
        }
    };
    let endpoints = match env_nonempty("GOOGLE_API_BASE") {
        Some(base) => GoogleEndpoints::single(base),
        None => GoogleEndpoints::default(),
    };
    Ok(ServiceHandles::google(token, endpoints))
}

/// Workspace tools plus, when `attach_external`, the profile's tool servers.
pub async fn build_registry(
    config: &Config,
    config_path: &Path,
    attach_external: bool,
) -> Result<ToolRegistry> {
    let handles = service_handles(config, config_path).await?;
    let mut registry = ToolRegistry::new();
    register_workspace_tools(&mut registry, &handles);
    if attach_external && !config.tool_servers.is_empty() {
        let added = attach_tool_servers(&mut registry, &config.tool_servers)
            .await
            .context("attaching tool servers")?;
        log::info!(
            "attached {} tool(s) from {} tool server(s)",
            added,
            config.tool_servers.len()
        );
    }
    log::info!("registered {} tool(s)", registry.len());
    Ok(registry)
}

fn require_telegram_token(config: &Config) -> Result<String> {
    config::resolve_telegram_token(config).context(
        "TELEGRAM_BOT_TOKEN not set (set the env var or telegram.botToken in the profile)",
    )
}

/// Telegram relay in the foreground, tool server supervised in the background.
pub async fn run_bot(config: Config, config_path: &Path) -> Result<()> {
    let token = require_telegram_token(&config)?;
    let registry = Arc::new(build_registry(&config, config_path, true).await?);
    let listener = bind_tool_listener(&config.server.addr()).await?;

    let server_registry = registry.clone();
    let tool_server = BackgroundTask::spawn("tool-server", move |cancel| {
        serve_tool_server(server_registry, listener, cancel)
    });

    let backend = OllamaClient::new(config.agent.base_url.clone());
    log::info!("agent: ollama at {} with model {}", backend.base_url(), config.agent.model);
    let agent = OllamaAgent::new(backend, config.agent.model.clone(), registry);
    let transport = Arc::new(TelegramChannel::new(Some(token)));
    let relay = Relay::new(
        transport,
        AgentInvoker::new(Arc::new(agent)),
        RelaySettings::from(&config.relay),
    )
    .with_background(tool_server);
    relay.run(shutdown_signal()).await?;
    Ok(())
}

/// Tool server only, until SIGINT/SIGTERM.
pub async fn run_dev_server(config: Config, config_path: &Path) -> Result<()> {
    let registry = Arc::new(build_registry(&config, config_path, true).await?);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    run_tool_server(registry, &config.server.addr(), cancel).await?;
    Ok(())
}

/// Dispatcher over stdin/stdout. Tool servers are not attached here.
pub async fn run_stdio(config: Config, config_path: &Path) -> Result<()> {
    let registry = build_registry(&config, config_path, false).await?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_stdio(&registry, stdin, tokio::io::stdout()).await
}

/// One direct invocation.
pub async fn invoke_once(
    config: &Config,
    config_path: &Path,
    tool: &str,
    input: serde_json::Value,
) -> Result<ToolResult> {
    let registry = build_registry(config, config_path, true).await?;
    Ok(registry.invoke(tool, input).await)
}

/// Send `text` to `chat` (or the default chat) in transport-sized chunks.
pub async fn send_to_chat(config: &Config, chat: Option<String>, text: &str) -> Result<()> {
    let token = require_telegram_token(config)?;
    let chat = chat
        .or_else(|| config::resolve_default_chat(config))
        .context("no chat id (pass --chat, set CHAT_ID, or telegram.defaultChatId)")?;
    let channel = TelegramChannel::new(Some(token));
    for chunk in split_chunks(text, config.relay.max_message_chars) {
        channel
            .send_message(&chat, &chunk)
            .await
            .with_context(|| format!("sending to chat {}", chat))?;
    }
    log::info!("sent message to chat {}", chat);
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
