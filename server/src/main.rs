//! Car Brand Prediction Server
//!
//! HTTP API that classifies uploaded car photos with a trained checkpoint.
//! The model is loaded before the listener is bound; if loading fails the
//! process exits without serving anything.

mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use car_brand_classifier::backend::backend_name;
use car_brand_classifier::{DEFAULT_CHECKPOINT, IMAGE_SIZE};

use crate::state::{AppState, ServerConfig, DEFAULT_MAX_UPLOAD_MB};

/// Car Brand Prediction Server
#[derive(Parser, Debug)]
#[command(name = "car-brand-server")]
#[command(version)]
#[command(about = "HTTP API serving car brand predictions")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "CARBRAND_PORT", default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "CARBRAND_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Checkpoint to serve
    #[arg(short, long, env = "CARBRAND_CHECKPOINT", default_value = DEFAULT_CHECKPOINT)]
    checkpoint: PathBuf,

    /// Side length uploads are resized to (must match training)
    #[arg(long, env = "CARBRAND_IMAGE_SIZE", default_value_t = IMAGE_SIZE)]
    image_size: usize,

    /// Largest accepted upload in megabytes
    #[arg(long, env = "CARBRAND_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    max_upload_mb: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        checkpoint_path: cli.checkpoint,
        image_size: cli.image_size,
        max_upload_bytes: cli.max_upload_mb.saturating_mul(1024 * 1024),
    };

    info!("Car Brand Prediction Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Checkpoint: {:?}", config.checkpoint_path);
    info!("  Image size: {}", config.image_size);
    info!("  Upload max: {} MB", cli.max_upload_mb);
    info!("  Backend:    {}", backend_name());

    let addr = config.socket_addr()?;

    let state = match AppState::load(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to load model: {}", e);
            return Err(e).context("Model could not be loaded; refusing to start");
        }
    };
    info!(
        "Model loaded with {} classes: {}",
        state.class_names().len(),
        state.class_names().join(", ")
    );

    let app = routes::build_router(Arc::new(state));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
