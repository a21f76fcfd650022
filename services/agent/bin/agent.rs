//! Main Entrypoint for the 100X Prompt Sales Voice Agent
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Starting the job worker that runs one agent session per room.
//! 3. Serving room creation, call records and the websocket room bridge,
//!    and handling graceful shutdown.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use voice_agent::{
    agent::{AGENT_NAME, SessionAssembler},
    config::Config,
    server::{AppState, create_router},
    worker::{Worker, WorkerOptions, job_channel},
};

/// Runs the sales voice agent. All settings come from the environment.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {}

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(config = ?config, "Configuration loaded.");

    // --- 3. Start the Worker ---
    let bind_address = config.bind_address;
    let assembler = SessionAssembler::from_config(Arc::new(config));
    let worker = Worker::new(WorkerOptions::new(move |ctx| {
        let assembler = assembler.clone();
        async move { assembler.entrypoint(ctx).await }
    }));
    let (jobs, source) = job_channel(32);
    let worker_task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(source).await }
    });

    // --- 4. Start Server ---
    info!("Starting {AGENT_NAME} for room connections on {bind_address}...");
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    axum::serve(listener, create_router(AppState::new(jobs, worker)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last job sender, so the worker drains and stops.
    worker_task.await?;
    info!("Server has shut down.");
    Ok(())
}
