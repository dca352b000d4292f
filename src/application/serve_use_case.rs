// ============================================================
// Layer 2 - ServeUseCase
// ============================================================
// Startup sequence of the inference service:
//
//   Step 1: Read + decode the promoted artifact   (Layer 6 - infra)
//   Step 2: Rebuild the model                     (Layer 5 - ml)
//   Step 3: Bind and serve until Ctrl-C           (Layer 1 - server)
//
// Steps 1 and 2 are fatal: the service never starts without
// exactly one valid model.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::application::train_use_case::DEFAULT_ARTIFACT_PATH;
use crate::infra::artifact::ArtifactStore;
use crate::ml::inferencer::Inferencer;
use crate::server::{self, state::ServiceState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    pub host:               String,
    pub port:               u16,
    pub artifact_path:      String,
    /// None disables the per-request deadline
    pub request_timeout_ms: Option<u64>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host:               "0.0.0.0".to_string(),
            port:               5000,
            artifact_path:      DEFAULT_ARTIFACT_PATH.to_string(),
            request_timeout_ms: None,
        }
    }
}

impl ServeConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

pub struct ServeUseCase {
    config: ServeConfig,
}

impl ServeUseCase {
    pub fn new(config: ServeConfig) -> Self {
        Self { config }
    }

    /// Load the model synchronously; any failure here is fatal.
    pub fn load_state(&self) -> Result<ServiceState> {
        let store = ArtifactStore::new(&self.config.artifact_path);
        let artifact = store.load()?;
        let inferencer = Inferencer::from_artifact(artifact)
            .with_context(|| format!("Cannot rebuild model from '{}'", store.path().display()))?;
        Ok(ServiceState::new(inferencer, self.config.request_timeout()))
    }

    pub async fn execute(&self) -> Result<()> {
        let state = Arc::new(self.load_state()?);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Cannot bind {addr}"))?;

        if let Some(limit) = self.config.request_timeout() {
            tracing::info!("Request timeout: {} ms", limit.as_millis());
        }
        server::run(state, listener).await
    }
}
