//! Blobscope - Deep Binary Diagnostics Service
//!
//! HTTP service wrapping the concurrent diagnostic pipeline: submit opaque
//! binary blobs, poll job status, fetch diagnostic results.
//!
//! # Usage
//!
//! ```bash
//! # Run with built-in defaults
//! cargo run --release
//!
//! # Override bind address and config file
//! ./blobscope --addr 127.0.0.1:9090 --config /etc/blobscope.toml
//! ```
//!
//! # Environment Variables
//!
//! - `BLOBSCOPE_CONFIG`: Path to the TOML config file
//! - `BLOBSCOPE_CORS_ORIGINS`: Comma-separated allowed CORS origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use blobscope::api::{create_app, AppContext};
use blobscope::config::ServiceConfig;
use blobscope::health::HealthMonitor;
use blobscope::orchestrator::Orchestrator;
use blobscope::pipeline::PipelineEngine;
use blobscope::stages::{build_detectors, build_stages};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "blobscope")]
#[command(about = "Blobscope Deep Binary Diagnostics Service")]
#[command(version)]
struct CliArgs {
    /// Override the server bind address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to the TOML configuration file
    #[arg(long, env = "BLOBSCOPE_CONFIG")]
    config: Option<PathBuf>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = ServiceConfig::load(args.config.as_deref())?;
    let bind_addr = args.addr.unwrap_or_else(|| config.server.bind_addr.clone());

    info!("Blobscope - Deep Binary Diagnostics");
    info!(
        max_concurrent = config.pipeline.max_concurrent_jobs,
        breaker_threshold = config.pipeline.breaker_failure_threshold,
        "Pipeline configuration"
    );

    // Assemble the pipeline: detectors feed both the anomaly stage and the
    // synchronous detection endpoint.
    let detectors = build_detectors(&config.detectors);
    let stages = build_stages(&config.pipeline, detectors.clone());
    let engine = PipelineEngine::new(
        stages,
        config.pipeline.max_concurrent_jobs,
        config.pipeline.shutdown_timeout(),
    );
    let orchestrator = Orchestrator::start(engine, &config);

    let ctx = AppContext {
        orchestrator: Arc::clone(&orchestrator),
        detectors,
        monitor: Arc::new(HealthMonitor::new()),
    };
    let app = create_app(ctx, &config.server);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "HTTP server listening");

    // Connect info feeds the per-IP rate limiter's key extractor.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("HTTP server: received shutdown signal");
        })
        .await
        .context("HTTP server error")?;

    // Server stopped accepting requests; drain the pipeline before exit.
    orchestrator.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
