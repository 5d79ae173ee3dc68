use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api_gate::config::GateConfig;
use api_gate::http::{AuthToken, GateServer};
use api_gate::ratelimit::AdmissionController;

/// Shared sliding-window admission gate.
#[derive(Parser, Debug)]
#[command(name = "api-gate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP listener to
    #[arg(long)]
    host: Option<IpAddr>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Admissions allowed per rolling 60-second window
    #[arg(long)]
    limit: Option<u32>,

    /// Minimum spacing between admissions in milliseconds
    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, config: &mut GateConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(limit) = self.limit {
            config.rate_limiting.limit_per_window = limit;
        }
        if let Some(delay) = self.base_delay_ms {
            config.rate_limiting.base_delay_ms = Some(delay);
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = GateConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    init_tracing(&config);

    info!("Starting API Gate admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    let rate_config = config.rate_config()?;
    let token = match config.auth.token.as_deref() {
        Some(token) => AuthToken::new(token)?,
        None => anyhow::bail!("an auth token is required"),
    };
    let addr = config.server.socket_addr();
    info!(
        addr = %addr,
        limit_per_window = rate_config.limit_per_window(),
        base_delay_ms = rate_config.base_delay_ms(),
        "Configuration loaded"
    );

    // Initialize the admission controller
    let controller = Arc::new(AdmissionController::new(rate_config));
    info!("Admission controller initialized");

    let server = GateServer::new(addr, controller, token);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("API Gate admission service stopped");
    Ok(())
}

fn init_tracing(config: &GateConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
