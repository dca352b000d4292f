// ============================================================
// Layer 1 - Service State
// ============================================================
// Shared by every handler through axum's State extractor:
// the loaded model and the metrics. Created once at startup.
//
// predict() is the whole request pipeline for one call:
//
//   count ─▶ start timer ─▶ parse JSON ─▶ validate shape
//         ─▶ forward pass ─▶ (timer stops on drop)
//
// It is synchronous and CPU bound, so the async handler runs
// it on tokio's blocking pool via dispatch().

use std::{sync::Arc, time::Duration};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::shape::FeatureWindow;
use crate::infra::metrics::ServiceMetrics;
use crate::ml::inferencer::Inferencer;
use crate::server::error::PredictError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Raw model output, shape (1, 1)
    pub prediction: Vec<Vec<f32>>,
}

pub struct ServiceState {
    inferencer:      Inferencer,
    metrics:         ServiceMetrics,
    request_timeout: Option<Duration>,
}

impl ServiceState {
    pub fn new(inferencer: Inferencer, request_timeout: Option<Duration>) -> Self {
        Self {
            inferencer,
            metrics: ServiceMetrics::new(),
            request_timeout,
        }
    }

    pub fn inferencer(&self) -> &Inferencer {
        &self.inferencer
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Handle one raw /predict body. Counted and timed whatever the outcome.
    pub fn predict(&self, body: &[u8]) -> Result<PredictResponse, PredictError> {
        self.metrics.record_request();
        let _timer = self.metrics.start_timer();

        let request: Value =
            serde_json::from_slice(body).map_err(|e| PredictError::Malformed(e.to_string()))?;
        let object = request.as_object().ok_or(PredictError::NotAnObject(json_kind(&request)))?;
        let features = object.get("features").ok_or(PredictError::MissingFeatures)?;

        let window = FeatureWindow::from_json(features, self.inferencer.input_shape())?;
        let prediction = self
            .inferencer
            .predict(&window)
            .map_err(|e| PredictError::Internal(format!("{e:#}")))?;

        Ok(PredictResponse { prediction })
    }

    /// Count and time a request whose body could not be read, so it
    /// shows up in the metrics like any other failed call.
    pub fn reject_body(&self, reason: String) -> PredictError {
        self.metrics.record_request();
        let _timer = self.metrics.start_timer();
        PredictError::Body(reason)
    }

    /// Run predict() on the blocking pool, bounded by the request
    /// timeout when one is configured. A timed out call keeps
    /// running to completion and still updates the metrics.
    pub async fn dispatch(self: Arc<Self>, body: Bytes) -> Result<PredictResponse, PredictError> {
        let timeout = self.request_timeout;
        let task = tokio::task::spawn_blocking(move || self.predict(&body));

        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| PredictError::Timeout(limit))?,
            None => task.await,
        };
        joined.map_err(|e| PredictError::Internal(format!("prediction task did not complete: {e}")))?
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
