//! HTTP server for the worker service.
//!
//! Provides endpoints for:
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

use std::net::SocketAddr;

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::info;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// GET /health - Health check
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ingest-worker".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics - Prometheus metrics
async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

/// Build the HTTP router.
pub fn build_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(handle))
}

/// Start the HTTP server.
pub async fn start_server(handle: PrometheusHandle, port: u16) -> anyhow::Result<()> {
    let app = build_router(handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "Starting worker HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
