// ============================================================
// Layer 1 - HTTP Inference Service (axum)
// ============================================================
//   POST /predict  {"features": [[[f; F]; T]]}  → {"prediction": [[f]]}
//   GET  /metrics  Prometheus text exposition
//   GET  /health   loaded model summary
//
// Handlers are thin: all request logic is in ServiceState.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Maps prediction failures to HTTP responses
pub mod error;

/// Model + metrics shared by all handlers
pub mod state;

use error::PredictError;
use state::{PredictResponse, ServiceState};

pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub type SharedState = Arc<ServiceState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The body is taken as raw bytes so that malformed JSON is
/// answered (and counted) by ServiceState like any other bad input.
/// A body that cannot be buffered, e.g. one over the size limit,
/// is counted the same way and answered 400.
async fn predict_handler(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    let body = body.map_err(|rejection| state.reject_body(rejection.body_text()))?;
    let response = state.dispatch(body).await?;
    Ok(Json(response))
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], state.metrics().render())
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let model = state.inferencer().header();
    Json(serde_json::json!({
        "status": "ok",
        "input_shape": model.input_shape.request_dims(),
        "hyperparameters": model.combination,
        "metrics": model.metrics,
        "trained_at": model.created_at,
    }))
}

/// Serve until Ctrl-C, then let in-flight requests finish.
pub async fn run(state: SharedState, listener: TcpListener) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested, draining in-flight requests"),
        Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {e}"),
    }
}
