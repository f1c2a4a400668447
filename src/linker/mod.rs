/// Proximity-based fallback binding.
pub mod proximity;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::semantic::schema::{confidence_field, str_field};
use crate::semantic::{FieldKind, GuardedService, ResponseSchema, SemanticRequest, SemanticTask};
use crate::types::{ArticleContext, LinkedReference, LocatedReference, TextFragmentPair};

pub use proximity::link_by_proximity;

/// Links below this confidence are treated as ambiguous downstream.
pub const AMBIGUOUS_LINK_CONFIDENCE: f64 = 0.5;

/// Builds the question whose answer is the content a reference resolves to.
pub fn resolution_question(reference_text: &str, object: &str) -> String {
    if object.is_empty() {
        format!("What does \"{}\" contain?", reference_text)
    } else {
        format!(
            "What does \"{}\" define or specify for \"{}\"?",
            reference_text, object
        )
    }
}

/// Links located references to their grammatical objects.
///
/// The context document follows the reference's tag: DELETIONAL references
/// are read against the article before the change, DEFINITIONAL ones against
/// the article after it.
#[derive(Debug, Clone, Default)]
pub struct ReferenceObjectLinker {
    service: Option<GuardedService>,
}

impl ReferenceObjectLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: GuardedService) -> Self {
        self.service = Some(service);
        self
    }

    /// Links every reference of a fragment pair, in input order.
    pub async fn link_all(
        &self,
        references: &[LocatedReference],
        pair: &TextFragmentPair,
        context: &ArticleContext,
    ) -> Vec<LinkedReference> {
        let mut linked = Vec::with_capacity(references.len());
        for located in references {
            let fragment = pair.fragment(located.source_tag);
            let context_text = context.text_for(located.source_tag);
            linked.push(self.link(located, fragment, context_text).await);
        }
        linked
    }

    /// Links one reference found in `fragment`, reading `context_text` as the
    /// surrounding document.
    ///
    /// Never fails: when the service is absent or keeps failing, the
    /// proximity heuristic is used, and an unbound reference is still
    /// emitted with a low confidence.
    pub async fn link(
        &self,
        located: &LocatedReference,
        fragment: &str,
        context_text: &str,
    ) -> LinkedReference {
        if let Some(service) = &self.service {
            match link_with_service(service, located, fragment, context_text).await {
                Ok(linked) => return linked,
                Err(e) => warn!(
                    reference = %located.reference_text,
                    error = %e,
                    "semantic linking failed, falling back to proximity"
                ),
            }
        }

        let linked = link_by_proximity(located, fragment, context_text);
        if linked.confidence < AMBIGUOUS_LINK_CONFIDENCE {
            debug!(reference = %located.reference_text, "no plausible object found");
        }
        linked
    }
}

fn link_schema() -> ResponseSchema {
    ResponseSchema::new()
        .required("object", FieldKind::String)
        .required("agreement_rationale", FieldKind::String)
        .required("confidence", FieldKind::Number)
        .optional("resolution_question", FieldKind::String)
}

async fn link_with_service(
    service: &GuardedService,
    located: &LocatedReference,
    fragment: &str,
    context_text: &str,
) -> Result<LinkedReference> {
    let request = SemanticRequest {
        task: SemanticTask::LinkObject,
        instruction: format!(
            "Identify the noun phrase of the fragment that the citation \"{}\" defines or \
             constrains. Justify the choice by grammatical agreement (gender, number) and \
             proximity, give a confidence between 0 and 1, and phrase a precise question whose \
             answer is exactly what the citation contributes to that noun phrase.",
            located.reference_text
        ),
        input: format!("Fragment:\n{}\n\nContext:\n{}", fragment, context_text),
        schema: link_schema(),
    };
    let record = service.request(&request).await?;

    let object = str_field(&record, "object").unwrap_or_default().trim().to_string();
    let mut confidence = confidence_field(&record, "confidence").unwrap_or(0.0);
    if object.is_empty() {
        confidence = confidence.min(proximity::UNBOUND_CONFIDENCE);
    }
    let question = str_field(&record, "resolution_question")
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| resolution_question(&located.reference_text, &object));

    Ok(LinkedReference {
        located: located.clone(),
        agreement_rationale: str_field(&record, "agreement_rationale")
            .unwrap_or_default()
            .to_string(),
        object,
        resolution_question: question,
        confidence,
    })
}
