use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier: Telegram relay and Google Workspace tool server", long_about = None)]
struct Cli {
    /// Profile path (default: COURIER_CONFIG_PATH, config/profiles.yaml, or ~/.courier/profiles.yaml)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default profile if none exists.
    Init,

    /// Run the Telegram relay with the tool server in the background (default).
    Serve {
        /// Tool server port (default from profile or 8765)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run only the HTTP tool server, for direct invocation.
    Dev {
        /// Tool server port (default from profile or 8765)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Serve the dispatcher over stdin/stdout (one JSON request per line).
    Stdio,

    /// Invoke one tool and print the result.
    Invoke {
        #[arg(long, short)]
        tool: String,

        /// Tool input as a JSON object.
        #[arg(long, short, default_value = "{}")]
        input: String,
    },

    /// Send a message to a chat (default: CHAT_ID or telegram.defaultChatId).
    Send {
        text: String,

        #[arg(long, value_name = "ID")]
        chat: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Version => {
            println!("courier {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init => run_init(config),
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Dev { port } => run_dev(config, port).await,
        Commands::Stdio => run_stdio(config).await,
        Commands::Invoke { tool, input } => run_invoke(config, &tool, &input).await,
        Commands::Send { text, chat } => run_send(config, chat, &text).await,
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(courier::config::default_config_path);
    let dir = courier::init::init_config_dir(&path)?;
    println!("initialized profile in {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = courier::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!("starting relay, tool server on {}", config.server.addr());
    courier::bootstrap::run_bot(config, &path).await
}

async fn run_dev(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = courier::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!("starting tool server on {}", config.server.addr());
    courier::bootstrap::run_dev_server(config, &path).await
}

async fn run_stdio(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = courier::config::load_config(config_path)?;
    courier::bootstrap::run_stdio(config, &path).await
}

async fn run_invoke(config_path: Option<PathBuf>, tool: &str, input: &str) -> anyhow::Result<()> {
    let input: serde_json::Value = serde_json::from_str(input)
        .map_err(|e| anyhow::anyhow!("--input is not valid JSON: {}", e))?;
    let (config, path) = courier::config::load_config(config_path)?;
    let result = courier::bootstrap::invoke_once(&config, &path, tool, input).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(2);
    }
    Ok(())
}

async fn run_send(config_path: Option<PathBuf>, chat: Option<String>, text: &str) -> anyhow::Result<()> {
    let (config, _) = courier::config::load_config(config_path)?;
    courier::bootstrap::send_to_chat(&config, chat, text).await
}
