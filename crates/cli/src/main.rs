mod backend;
mod config;
mod error;

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use mcp::ServerConfig;
use runtime::{McpToolHost, Session, ToolHost};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backend::AnyBackend;
use config::{CONFIG_FILE, Config, Provider, ServerTarget};
use error::Result;

/// Queries driven by `demo`.
const DEMO_QUERIES: [&str; 4] = [
    "What is the default transport protocol for MCP?",
    "What is MCP?",
    "How does the calculator tool work?",
    "What transport protocols are supported?",
];

#[derive(Parser)]
#[command(name = "kb-client")]
#[command(about = "Answer questions with a language model and the knowledge-base tool host", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./kb-client.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tool host: an executable to spawn, or HOST:PORT of a listening host
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Completion API provider
    #[arg(long, global = true, value_enum)]
    provider: Option<Provider>,

    /// Model name
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sample queries
    Demo,
    /// Answer a single query
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Print the tool catalog as offered to the model
    Tools,
    /// Start an interactive chat
    Chat,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::Demo) | None => cmd_demo(&config).await,
        Some(Commands::Ask { query }) => cmd_ask(&config, &query.join(" ")).await,
        Some(Commands::Tools) => cmd_tools(&config).await,
        Some(Commands::Chat) => cmd_chat(&config).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None if Path::new(CONFIG_FILE).exists() => Config::load(CONFIG_FILE)?,
        None => Config::default(),
    };
    let mut config = config.apply_env()?;

    if let Some(server) = &cli.server {
        config.server.target = Some(server.clone());
    }
    if let Some(provider) = cli.provider {
        config.backend.provider = provider;
    }
    if let Some(model) = &cli.model {
        config.backend.model = Some(model.clone());
    }
    Ok(config)
}

fn tool_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.session.tool_timeout)
}

async fn connect_host(config: &Config) -> mcp::Result<McpToolHost> {
    let timeout = tool_timeout(config);
    match config.server_target() {
        ServerTarget::Command(path) => {
            info!(command = %path.display(), "spawning tool host");
            let server = ServerConfig {
                name: "knowledge-base".to_string(),
                command: path.to_string_lossy().into_owned(),
                args: config.server.args.clone(),
                env: HashMap::new(),
            };
            McpToolHost::spawn(server, timeout).await
        }
        ServerTarget::Tcp(addr) => {
            info!(%addr, "connecting to tool host");
            McpToolHost::connect_tcp(&addr, timeout).await
        }
    }
}

async fn open_session(config: &Config) -> Result<Session<AnyBackend, McpToolHost>> {
    let backend = AnyBackend::from_config(config)?;

    let host = match connect_host(config).await {
        Ok(host) => {
            info!(tools = host.specs().len(), "connected to tool host");
            Some(host)
        }
        Err(e) => {
            warn!(error = %e, "failed to connect to tool host, continuing without tools");
            None
        }
    };

    Ok(Session::new(backend, host)
        .with_system(&config.session.system_prompt)
        .with_max_tool_rounds(config.session.max_tool_rounds)
        .with_tool_timeout(tool_timeout(config)))
}

async fn cmd_demo(config: &Config) -> Result<()> {
    let mut session = open_session(config).await?;
    let rule = "=".repeat(60);

    for query in DEMO_QUERIES {
        println!("\n{rule}");
        println!("Query: {query}");
        println!("{rule}");

        match session.chat(query).await {
            Ok(response) => println!("\nResponse: {response}"),
            Err(e) => eprintln!("\nError: {e}"),
        }
    }

    session.disconnect().await;
    Ok(())
}

async fn cmd_ask(config: &Config, query: &str) -> Result<()> {
    let mut session = open_session(config).await?;
    let result = session.chat(query).await;
    session.disconnect().await;

    println!("{}", result?);
    Ok(())
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let host = connect_host(config).await?;

    for spec in host.specs() {
        println!("{}: {}", spec.name, spec.description);
        match serde_json::to_string_pretty(&spec.function_json()) {
            Ok(json) => println!("{json}\n"),
            Err(e) => warn!(tool = %spec.name, error = %e, "failed to render tool"),
        }
    }

    host.shutdown().await;
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("kb-client v{}", env!("CARGO_PKG_VERSION"));

    let mut session = open_session(config).await?;
    println!("Backend: {}", session.backend());
    println!(
        "Tools: {}",
        if session.is_connected() {
            session
                .tools()
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            "none (tool host unavailable)".to_string()
        }
    );
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match session.chat(input).await {
            Ok(response) => println!("\n{response}\n"),
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }

    session.disconnect().await;
    println!("\nGoodbye.");
    Ok(())
}
