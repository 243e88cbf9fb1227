//! # rastro
//!
//! Location hub binary: loads settings, installs logging and metrics, and
//! serves HTTP/WebSocket until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rastro_server::config::{load_settings_from_path, settings_path, Settings};
use rastro_server::RastroServer;

/// Real-time driver location hub.
#[derive(Parser, Debug)]
#[command(name = "rastro", about = "Real-time driver location hub")]
struct Cli {
    /// Settings file (defaults to `~/.rastro/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    let telemetry = settings
        .logging
        .to_telemetry()
        .context("Invalid logging settings")?;
    rastro_telemetry::init_telemetry(&telemetry).context("Failed to initialize logging")?;

    let metrics = rastro_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let shutdown_timeout = settings.server.shutdown_timeout();
    let server = RastroServer::new(settings.server).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(%addr, "rastro ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(shutdown_timeout))
        .await;
    Ok(())
}
