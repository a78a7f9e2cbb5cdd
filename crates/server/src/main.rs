mod api;
mod bootstrap;
mod health;
mod render;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use routewatch_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use routewatch_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = Router::new()
        .merge(api::router(app.state.clone()))
        .merge(health::router(app.db_pool.clone()));

    let bind = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(address = %bind, "server listening");

    let shutdown_grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown(shutdown_grace)).await?;

    tracing::info!("server stopped");
    app.db_pool.close().await;
    Ok(())
}

/// Resolves on ctrl-c; in-flight requests get the configured grace period
/// before the process exits regardless.
async fn wait_for_shutdown(grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "shutdown signal listener failed");
        return;
    }
    tracing::info!(grace_secs = grace.as_secs(), "shutdown signal received; draining");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!("graceful shutdown grace period elapsed; exiting");
        std::process::exit(0);
    });
}
