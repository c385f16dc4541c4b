use std::path::{Path, PathBuf};

use clap::Parser;
use host::{CONFIG_FILE, HostConfig, HostContext, Result};
use mcp::TransportKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kb-host")]
#[command(about = "MCP tool host: arithmetic and a static knowledge base", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (defaults to ./kb-host.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport binding: stdio or tcp
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Listen address for tcp
    #[arg(long)]
    host: Option<String>,

    /// Listen port for tcp
    #[arg(short, long)]
    port: Option<u16>,

    /// Knowledge base JSON file
    #[arg(long)]
    kb: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // stdout carries protocol frames; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let context = HostContext::new(&config)?;
    context.serve().await
}

fn load_config(args: &Args) -> Result<HostConfig> {
    let config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None if Path::new(CONFIG_FILE).exists() => HostConfig::load(CONFIG_FILE)?,
        None => HostConfig::default(),
    };
    let mut config = config.apply_env()?;

    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(kb) = &args.kb {
        config.knowledge_base = kb.clone();
    }
    Ok(config)
}
