use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{NormRefError, Result};

use super::{SemanticRequest, SemanticService};

/// Semantic service reached over HTTP.
///
/// Each request is posted as `{task, instruction, input, schema}` and the
/// response body is returned as the record. Timeouts and retries are applied
/// by the surrounding [`super::GuardedService`].
#[derive(Debug, Clone)]
pub struct HttpSemanticService {
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSemanticService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    /// Sends `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SemanticService for HttpSemanticService {
    fn name(&self) -> &str {
        "http"
    }

    async fn call(&self, request: &SemanticRequest) -> Result<Value> {
        let body = json!({
            "task": request.task.as_str(),
            "instruction": request.instruction,
            "input": request.input,
            "schema": request.schema,
        });
        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();
        let task = request.task.as_str();

        debug!(task, endpoint = %endpoint, "posting semantic request");

        tokio::task::spawn_blocking(move || -> Result<Value> {
            let mut builder = ureq::post(&endpoint);
            if let Some(key) = api_key {
                builder = builder.header("Authorization", format!("Bearer {}", key));
            }
            let mut response = builder.send_json(&body).map_err(|e| NormRefError::Http {
                message: format!("request to '{}' failed: {}", endpoint, e),
            })?;
            response
                .body_mut()
                .read_json::<Value>()
                .map_err(|e| NormRefError::Http {
                    message: format!("invalid response body from '{}': {}", endpoint, e),
                })
        })
        .await
        .map_err(|e| NormRefError::Service {
            message: format!("request worker failed: {}", e),
            task: task.to_string(),
        })?
    }
}
