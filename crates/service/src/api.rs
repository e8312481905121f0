//! HTTP API: train/validate endpoints, source probe, health and metrics

use analytics_lib::health::{ComponentStatus, HealthRegistry};
use analytics_lib::{AnalyticsEngine, ModelKind, OperationResult, Status};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(engine: AnalyticsEngine, health_registry: HealthRegistry) -> Self {
        Self {
            engine: Arc::new(engine),
            health_registry,
        }
    }
}

async fn index() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to the ML Analytics Service!" }))
}

fn status_code(status: Status) -> StatusCode {
    match status {
        Status::Success => StatusCode::OK,
        Status::Error => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn operation_response(result: OperationResult) -> Response {
    (status_code(result.status), Json(result)).into_response()
}

fn unknown_model(model: &str) -> Response {
    let message = model
        .parse::<ModelKind>()
        .err()
        .unwrap_or_else(|| format!("Unknown model kind '{}'", model));
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}

async fn probe_source(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let probe = state.engine.probe().await;
    (status_code(probe.status), Json(probe))
}

async fn train(State(state): State<Arc<AppState>>, Path(model): Path<String>) -> Response {
    let Ok(kind) = model.parse::<ModelKind>() else {
        return unknown_model(&model);
    };
    info!(model = %kind, "Received training request");
    operation_response(state.engine.train(kind).await)
}

async fn validate(State(state): State<Arc<AppState>>, Path(model): Path<String>) -> Response {
    let Ok(kind) = model.parse::<ModelKind>() else {
        return unknown_model(&model);
    };
    info!(model = %kind, "Received validation request");
    operation_response(state.engine.validate(kind).await)
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/source/probe", get(probe_source))
        .route("/api/train/:model", post(train))
        .route("/api/validate/:model", get(validate))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
