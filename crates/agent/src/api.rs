//! HTTP API for metric reports, health checks and Prometheus metrics

use agent_lib::{
    health::{ComponentStatus, HealthRegistry},
    report::Reporter,
};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub reporter: Reporter,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(reporter: Reporter, health_registry: HealthRegistry) -> Self {
        Self {
            reporter,
            health_registry,
        }
    }
}

/// Rendered documents are already JSON text
fn json_body(body: impl Into<String>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.into(),
    )
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    json_body(state.reporter.status().await.to_string())
}

#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    /// Earliest sample time, UNIX seconds
    pub since: Option<i64>,
}

async fn details(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DetailsQuery>,
) -> impl IntoResponse {
    json_body(state.reporter.details(query.since).await)
}

/// 200 while every family is operational, 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// 200 once the first collection cycle completed, 503 before
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus exposition of the agent's own metrics
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode Prometheus metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics/status", get(status))
        .route("/metrics/details", get(details))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serves the API until `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
