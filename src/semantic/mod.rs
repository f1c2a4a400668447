//! Boundary to the opaque semantic-extraction service.
//!
//! Every call carries a natural-language instruction, the input text and the
//! schema the returned record must satisfy. Components never talk to a
//! provider directly: they go through [`GuardedService`], which applies the
//! shared rate limiter, the per-call timeout, schema validation and retries.

/// Call guard and the guarded service wrapper.
pub mod guard;

/// HTTP-backed service implementation.
pub mod http;

/// Declared response schemas and validation.
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

pub use guard::{CallGuard, GuardedService};
pub use http::HttpSemanticService;
pub use schema::{FieldKind, FieldSpec, ResponseSchema};

/// The extraction tasks the pipeline asks the service to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticTask {
    DetectReferences,
    LinkObject,
    AssessRelevance,
    ExtractAnswer,
}

impl SemanticTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticTask::DetectReferences => "detect_references",
            SemanticTask::LinkObject => "link_object",
            SemanticTask::AssessRelevance => "assess_relevance",
            SemanticTask::ExtractAnswer => "extract_answer",
        }
    }
}

/// One request to the semantic service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticRequest {
    pub task: SemanticTask,
    pub instruction: String,
    pub input: String,
    pub schema: ResponseSchema,
}

/// A provider of structured semantic extraction.
///
/// Implementations return the raw record; validation against
/// `request.schema` is done by the caller.
#[async_trait]
pub trait SemanticService: Send + Sync {
    /// Human-readable provider name, used in logs.
    fn name(&self) -> &str;

    async fn call(&self, request: &SemanticRequest) -> Result<Value>;
}
