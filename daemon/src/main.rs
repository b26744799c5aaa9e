//! fastblocks relay daemon: entry point for running a relay node.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use fastblocks_node::{NodeConfig, RelayNode};
use fastblocks_utils::{format_duration, init_logging, LogFormat};

#[derive(Parser)]
#[command(
    name = "fastblocks-relay",
    about = "Relays full-node blocks over SSE and flashblocks over WebSocket"
)]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "FASTBLOCKS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. "0.0.0.0:8080".
    #[arg(long, env = "FASTBLOCKS_LISTEN")]
    listen: Option<SocketAddr>,

    /// Full-node JSON-RPC endpoint.
    #[arg(long, env = "FASTBLOCKS_FULL_NODE_URL")]
    full_node_url: Option<String>,

    /// Flashblocks WebSocket endpoint.
    #[arg(long, env = "FASTBLOCKS_FLASHBLOCKS_URL")]
    flashblocks_url: Option<String>,

    /// Milliseconds between full-node polls.
    #[arg(long, env = "FASTBLOCKS_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// HTML page served on `/`.
    #[arg(long, env = "FASTBLOCKS_ASSET")]
    asset: Option<PathBuf>,

    /// Enable the Prometheus `/metrics` endpoint.
    #[arg(long, env = "FASTBLOCKS_ENABLE_METRICS")]
    metrics: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "FASTBLOCKS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "FASTBLOCKS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the relay (default).
    Run,
    /// Print the effective configuration as TOML and exit.
    PrintConfig,
}

/// Layer CLI/env values over the config file (or the defaults).
fn build_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy();
            NodeConfig::from_toml_file(&path)
                .with_context(|| format!("loading config file {path}"))?
        }
        None => NodeConfig::default(),
    };

    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(url) = &cli.full_node_url {
        config.full_node_url = url.clone();
    }
    if let Some(url) = &cli.flashblocks_url {
        config.flashblocks_url = url.clone();
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(asset) = &cli.asset {
        config.asset_path = asset.clone();
    }
    config.enable_metrics |= cli.metrics;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log_format = match format {
            LogFormat::Human => "human",
            LogFormat::Json => "json",
        }
        .to_string();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.command == Some(Command::PrintConfig) {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level);

    tracing::info!(
        listen = %config.listen_addr,
        full_node = %config.full_node_url,
        flashblocks = %config.flashblocks_url,
        poll_interval_ms = config.poll_interval_ms,
        metrics = config.enable_metrics,
        "starting fastblocks relay"
    );

    let started = Instant::now();
    let mut node = RelayNode::new(config)?;
    node.start().await?;

    tracing::info!("shutdown signal received, stopping relay");
    node.stop().await?;

    tracing::info!(
        uptime = %format_duration(started.elapsed()),
        "fastblocks relay exited cleanly"
    );
    Ok(())
}
