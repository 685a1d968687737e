pub mod admission;
pub mod cli;
pub mod config;
pub mod control_plane;
pub mod engine;
pub mod error;
pub mod execution;
pub mod http;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::admission::AdmissionGate;
use crate::cli::Args;
use crate::config::Configuration;
use crate::engine::EngineClient;
use crate::execution::ExecutionEngine;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.default_log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Configuration::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    let config = Arc::new(config);

    let engine = EngineClient::new(
        &config.docker.socket,
        &config.docker.api_version,
        Duration::from_secs(config.app.exec_timeout_seconds),
        config.app.output_byte_cap,
    );

    let admission = AdmissionGate::new(config.app.max_concurrency());
    let execution = ExecutionEngine::new(engine.clone(), Arc::new(config.app.clone()));

    let state = Arc::new(AppState { execution, admission });

    let control_plane_handle = control_plane::spawn(
        config.redis_rpc.clone(),
        engine.clone(),
        config.app.image_prefix.clone(),
    );

    let router = http::build_router(state);

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(bind = %args.bind, "run-api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    control_plane_handle.abort();
    if let Err(e) = control_plane_handle.await {
        if !e.is_cancelled() {
            warn!(error = %e, "control-plane listener task panicked during shutdown");
        }
    }

    info!("run-api terminated cleanly");
    Ok(())
}

/// Resolves once either Ctrl+C or SIGTERM arrives. The latter is how the
/// control-plane's `UPDATE_RUNNERS` command reaches this process: it signals
/// this process directly, expecting a supervisor to respawn it.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
