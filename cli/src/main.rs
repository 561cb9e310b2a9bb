// peercall-relay: signalling relay process
//
// Every WebSocket client that connects joins one broadcast domain: whatever a
// client sends is forwarded to all the others.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use peercall_core::relay::RelayServer;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "peercall-relay")]
#[command(about = "Signalling relay for peer-to-peer calls", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file (defaults to <config_dir>/peercall/relay.json)
    #[arg(short, long, env = "PEERCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, env = "PEERCALL_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = config::load(cli.config.as_deref()).context("Failed to load relay config")?;
    let server = RelayServer::bind(&config)
        .await
        .with_context(|| format!("Failed to start relay on {}", config.listen_addr()))?;

    info!(
        "Clients connect to {}://{}",
        config.scheme(),
        server.local_addr()
    );

    let registry = server.registry();
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Relay stopped with an error")?;

    let stats = registry.stats();
    info!(
        "Relayed {} frame(s), {} bytes, over {} connection(s)",
        stats.frames_relayed, stats.bytes_relayed, stats.connections_total
    );
    Ok(())
}
