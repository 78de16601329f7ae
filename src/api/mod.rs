//! REST API module using Axum
//!
//! HTTP surface over the diagnostic pipeline:
//! - submission, status, and result endpoints for the async job lifecycle
//! - a synchronous anomaly-detection endpoint for fitted-model scoring
//! - health, telemetry, and metrics for operators
//!
//! All endpoints share the envelope in [`envelope`]; bodies for submission
//! and detection are raw bytes, capped by the configured body limit. The
//! versioned API is rate-limited per client IP (the bare `/health` route
//! is not, so load balancers can poll freely). Peer-IP keying requires the
//! server to be started with connect info (see `main`).

pub mod envelope;
pub mod handlers;

pub use handlers::AppContext;

use crate::config::ServerConfig;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `BLOBSCOPE_CORS_ORIGINS` to a comma-separated list of allowed
/// origins for development.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("BLOBSCOPE_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    }
}

fn api_routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/diagnostics", post(handlers::submit_diagnostic))
        .route("/diagnostics/:id", get(handlers::job_status))
        .route("/diagnostics/:id/result", get(handlers::job_result))
        .route("/anomalies/detect", post(handlers::detect_anomalies))
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .route("/telemetry", get(handlers::telemetry))
        .route("/metrics", get(handlers::metrics))
        .with_state(ctx)
}

/// Create the complete application router.
pub fn create_app(ctx: AppContext, server: &ServerConfig) -> Router {
    let cors = build_cors_layer();

    // Keyed by peer IP; exceeding the burst yields 429 until cells
    // replenish.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(server.rate_limit_replenish_ms.max(1))
            .burst_size(server.rate_limit_burst.max(1))
            .finish()
            .unwrap_or_default(),
    );

    Router::new()
        .nest(
            "/api/v1",
            api_routes(ctx).layer(GovernorLayer {
                config: governor_config,
            }),
        )
        // Bare /health for load balancers that cannot be configured with
        // a path prefix.
        .route("/health", get(handlers::liveness))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(server.max_submission_bytes))
        .layer(cors)
}
