//! voxgate: HTTP front end for a whisper.cpp model.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use voxgate::adapters::{TomlConfigStore, WhisperCppEngine};
use voxgate::AppController;

/// Speech transcription server.
#[derive(Parser, Debug)]
#[command(name = "voxgate", version, about = "Speech transcription server")]
struct Cli {
    /// Path to the configuration file (defaults to the OS config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides the config file).
    #[arg(long)]
    port: Option<u16>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = match cli.config {
        Some(path) => TomlConfigStore::at(path),
        None => TomlConfigStore::new().context("Failed to locate configuration directory")?,
    };

    let mut controller = AppController::new(store, |config| {
        Arc::new(WhisperCppEngine::new(config.engine.parallel_states))
    })
    .context("Failed to initialize application")?;
    controller.override_bind(cli.host, cli.port);

    // A failed preload leaves the server up; /init_model can still load a model.
    match controller.preload().await {
        Ok(Some(status)) => info!(model = %status.model_path, "Startup model ready"),
        Ok(None) => info!("No startup model configured, waiting for /init_model"),
        Err(e) => warn!(code = e.code(), error = %e, "Startup model failed to load"),
    }

    let addr = controller.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, controller.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
