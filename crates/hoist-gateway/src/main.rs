//! # hoist-gateway
//!
//! Device gateway binary. Loads settings, wires the gateway, and serves
//! devices and the control-plane API until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hoist_core::logging::{LogFormat, init_subscriber_with_format};
use hoist_server::{Gateway, GatewayServer};
use hoist_settings::{GatewaySettings, load_settings_from_path, settings_path};

/// How long shutdown waits for sessions to close and queued work to drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// hoist device gateway.
#[derive(Parser, Debug)]
#[command(name = "hoist-gateway", version, about = "Elevator terminal device gateway")]
struct Cli {
    /// Settings file (defaults to `~/.hoist/settings.json`).
    #[arg(long, env = "HOIST_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Minimum log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let format = if args.json_logs { LogFormat::Json } else { LogFormat::Compact };
    init_subscriber_with_format(&args.log_level, format);

    let path = args.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);

    let metrics = match hoist_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    if settings.auth.devices.is_empty() {
        tracing::warn!("no device credentials configured, every device will be rejected");
    }

    let gateway = Gateway::builder(settings.clone()).build();
    let server = GatewayServer::new(settings.server, gateway, metrics);
    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!("hoist gateway listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown(SHUTDOWN_TIMEOUT).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
