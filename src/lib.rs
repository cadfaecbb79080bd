//! Satya -- simulated deepfake detection for images, video, audio and live
//! webcam frames.
//!
//! This crate provides the analysis providers (simulated and remote), the
//! webcam capture and analysis loop, detection overlay rendering, and the
//! HTTP API that serves them.

pub mod analysis;
pub mod api;
pub mod assistant;
pub mod capture;
pub mod config;
pub mod notify;
pub mod overlay;
pub mod webcam;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LoggingConfig};

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured filter.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // A subscriber may already be installed (tests, embedding).
    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Start the Satya API server and run until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<()> {
    let addr: std::net::SocketAddr = config.server.bind_addr().parse()?;
    let app = api::router(api::AppState::new(&config));

    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        cors_origin = %config.server.cors_origin,
        "Satya API listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Satya API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
