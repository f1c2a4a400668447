use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::linker::AMBIGUOUS_LINK_CONFIDENCE;
use crate::semantic::schema::str_field;
use crate::semantic::{FieldKind, GuardedService, ResponseSchema, SemanticRequest, SemanticTask};
use crate::types::LinkedReference;

/// Verdict of the relevance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    /// Needed to define or constrain the bound object; resolve it.
    Required,
    /// Context only; skip it on purpose.
    Supplementary,
    /// Unclear; resolved with a warning or skipped, depending on configuration.
    Ambiguous,
}

#[allow(clippy::should_implement_trait)]
impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::Required => "required",
            Relevance::Supplementary => "supplementary",
            Relevance::Ambiguous => "ambiguous",
        }
    }

    pub fn from_str(s: &str) -> Option<Relevance> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Some(Relevance::Required),
            "supplementary" => Some(Relevance::Supplementary),
            "ambiguous" => Some(Relevance::Ambiguous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub relevance: Relevance,
    pub rationale: String,
}

/// Decides whether a linked reference must be resolved.
#[derive(Debug, Clone, Default)]
pub struct RelevanceAssessor {
    service: Option<GuardedService>,
}

impl RelevanceAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: GuardedService) -> Self {
        self.service = Some(service);
        self
    }

    /// Assesses `reference`, found in `origin_text`.
    ///
    /// Falls back to [`assess_by_rules`] when no service is attached or the
    /// service fails.
    pub async fn assess(&self, reference: &LinkedReference, origin_text: &str) -> Assessment {
        if let Some(service) = &self.service {
            match assess_with_service(service, reference, origin_text).await {
                Ok(assessment) => return assessment,
                Err(e) => warn!(
                    reference = reference.reference_text(),
                    error = %e,
                    "relevance check failed, using rules"
                ),
            }
        }
        assess_by_rules(reference)
    }
}

/// Rule-based relevance.
///
/// A hit nested inside another citation is covered by its parent and is
/// supplementary. Otherwise a weakly bound reference is ambiguous and a
/// bound one is required.
pub fn assess_by_rules(reference: &LinkedReference) -> Assessment {
    if let Some(parent) = &reference.located.parent_reference {
        return Assessment {
            relevance: Relevance::Supplementary,
            rationale: format!("nested inside {}", parent),
        };
    }
    if reference.confidence < AMBIGUOUS_LINK_CONFIDENCE {
        return Assessment {
            relevance: Relevance::Ambiguous,
            rationale: format!("weak object binding ({:.2})", reference.confidence),
        };
    }
    Assessment {
        relevance: Relevance::Required,
        rationale: format!("constrains \"{}\"", reference.object),
    }
}

async fn assess_with_service(
    service: &GuardedService,
    reference: &LinkedReference,
    origin_text: &str,
) -> Result<Assessment> {
    let request = SemanticRequest {
        task: SemanticTask::AssessRelevance,
        instruction: format!(
            "Decide whether the citation \"{}\" is required to define or constrain \"{}\" \
             in the text, is only supplementary context, or is ambiguous. Answer with a \
             verdict of \"required\", \"supplementary\" or \"ambiguous\" and a short rationale.",
            reference.reference_text(),
            reference.object
        ),
        input: origin_text.to_string(),
        schema: ResponseSchema::new()
            .required("verdict", FieldKind::String)
            .optional("rationale", FieldKind::String),
    };
    let record = service.request(&request).await?;

    let verdict = str_field(&record, "verdict").unwrap_or_default();
    let relevance = Relevance::from_str(verdict).unwrap_or_else(|| {
        debug!(verdict, "unknown relevance verdict, treating as ambiguous");
        Relevance::Ambiguous
    });
    Ok(Assessment {
        relevance,
        rationale: str_field(&record, "rationale")
            .unwrap_or(verdict)
            .to_string(),
    })
}
