use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};

use huddle_api::{build_router, AppState};
use huddle_core::config::Config;
use huddle_core::logging::{init_logging_with_config, LogConfig};
use huddle_core::shutdown::{os_signal, ShutdownCoordinator};

#[derive(Debug, Parser)]
#[command(name = "huddle-api", version, about = "Huddle team messaging API server")]
struct Cli {
    /// Path to a TOML config file. Without it, config comes from HUDDLE_* variables.
    #[arg(short, long, env = "HUDDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("loading config from environment")?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    init_logging_with_config(LogConfig::from_config(&config.logging)?)?;

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics.bind_address)
            .install()
            .context("installing prometheus exporter")?;
        huddle_core::metrics::init_metrics();
        info!(addr = %config.metrics.bind_address, "metrics exporter listening");
    }

    let state = AppState::from_config(&config)?;
    let router = build_router(state);

    let listener = TcpListener::bind(config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!(addr = %config.server.bind_address, "huddle API listening");

    let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown.signalled());
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => {
            // the server stopped on its own
            result??;
            return Ok(());
        }
        _ = os_signal() => {}
    }

    shutdown.shutdown().await;
    match shutdown.drain(server).await {
        Some(result) => result??,
        None => error!("in-flight requests did not finish in time"),
    }
    info!("shutdown complete");
    Ok(())
}
