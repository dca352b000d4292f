use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::domain::shape::ShapeError;

/// Every way a /predict call can fail.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Invalid JSON body: {0}")]
    Malformed(String),

    #[error("Cannot read request body: {0}")]
    Body(String),

    #[error("Invalid input: request body must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid input: missing 'features' field")]
    MissingFeatures,

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Prediction failed: {0}")]
    Internal(String),

    #[error("Prediction did not finish within {} ms", .0.as_millis())]
    Timeout(Duration),
}

impl PredictError {
    /// Client errors and forward-pass failures both answer 400;
    /// only an exceeded deadline is reported differently.
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        if let PredictError::Internal(ref reason) = self {
            tracing::error!("Forward pass failed: {reason}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
