use thiserror::Error;

/// Errors that can occur while resolving normative references.
///
/// Per-reference outcomes (not found, empty extraction, depth exceeded, ...)
/// are not errors: they are recorded as [`crate::types::IssueKind`] values on
/// the affected reference. This enum covers failures of the collaborators
/// themselves.
#[derive(Error, Debug)]
pub enum NormRefError {
    #[error("semantic service error: {message} (task: {task})")]
    Service { message: String, task: String },

    #[error("schema violation: {message} (field: {field})")]
    SchemaViolation { message: String, field: String },

    #[error("timed out after {timeout_ms}ms (operation: {operation})")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("document error: {message} (source: {source_id}, unit: {unit_id})")]
    Document {
        message: String,
        source_id: String,
        unit_id: String,
    },

    #[error("http error: {message}")]
    Http { message: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("worker error: {message}")]
    Worker { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NormRefError {
    /// Returns `true` when re-issuing the same call may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            NormRefError::Service { .. }
                | NormRefError::SchemaViolation { .. }
                | NormRefError::Timeout { .. }
                | NormRefError::Http { .. }
        )
    }

    /// Returns `true` for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NormRefError::Timeout { .. })
    }
}

/// Convenience alias for results using `NormRefError`.
pub type Result<T> = std::result::Result<T, NormRefError>;
