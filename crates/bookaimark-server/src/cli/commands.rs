use anyhow::Context;
use bookaimark::config::BookmarkConfig;
use bookaimark_server::create_router;
use bookaimark_server::state::AppState;
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use super::setup::{Cli, Commands};

const DEFAULT_LOG_FILTER: &str = "info,bookaimark=debug,bookaimark_server=debug";
/// How often expired rate-limit counters and cache entries are dropped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, config } => {
            init_tracing();
            let config = BookmarkConfig::load(config.as_deref())?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start the async runtime")?;
            runtime.block_on(serve(&host, port, config))
        }
        Commands::Config { config, effective } => print_config(config.as_deref(), effective),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(host: &str, port: u16, config: BookmarkConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let sweeper = state.spawn_sweeper(SWEEP_INTERVAL);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

fn print_config(path: Option<&Path>, effective: bool) -> anyhow::Result<()> {
    if effective {
        let config = BookmarkConfig::load(path)?;
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", BookmarkConfig::template());
    }
    Ok(())
}
