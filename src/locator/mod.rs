/// Rule-based citation patterns.
pub mod pattern;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::semantic::schema::{confidence_field, str_field};
use crate::semantic::{FieldKind, GuardedService, ResponseSchema, SemanticRequest, SemanticTask};
use crate::types::{generate_reference_id, LocatedReference, SourceTag, TextFragmentPair};

pub use pattern::{detect, HitKind, PatternHit};

/// References found in a fragment pair, split by confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorOutput {
    /// Hits at or above the confidence threshold, in fragment order.
    pub references: Vec<LocatedReference>,
    /// Hits below the threshold, kept for manual review.
    pub low_confidence: Vec<LocatedReference>,
}

impl LocatorOutput {
    fn extend(&mut self, other: LocatorOutput) {
        self.references.extend(other.references);
        self.low_confidence.extend(other.low_confidence);
    }
}

/// A candidate span before ids and nesting are assigned.
#[derive(Debug, Clone)]
struct Candidate {
    start: usize,
    end: usize,
    confidence: f64,
}

/// Finds citation spans in amendment fragments.
///
/// Rule-based detection always runs. When a semantic service is attached and
/// semantic detection is enabled, the service's hits are merged in; a failing
/// service only costs its extra hits.
#[derive(Debug, Clone)]
pub struct ReferenceLocator {
    threshold: f64,
    service: Option<GuardedService>,
    semantic_detection: bool,
}

impl ReferenceLocator {
    /// Creates a rule-based locator with the given confidence threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            service: None,
            semantic_detection: false,
        }
    }

    /// Attaches a semantic service used for additional detections.
    pub fn with_service(mut self, service: GuardedService) -> Self {
        self.service = Some(service);
        self.semantic_detection = true;
        self
    }

    /// Enables or disables semantic detection without detaching the service.
    pub fn semantic_detection(mut self, enabled: bool) -> Self {
        self.semantic_detection = enabled;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scans `deleted_text` as DELETIONAL and `inserted_text` as DEFINITIONAL.
    pub async fn locate(&self, pair: &TextFragmentPair) -> LocatorOutput {
        let mut output = self
            .locate_in(&pair.deleted_text, SourceTag::Deletional, "")
            .await;
        output.extend(
            self.locate_in(&pair.inserted_text, SourceTag::Definitional, "")
                .await,
        );
        debug!(
            references = output.references.len(),
            low_confidence = output.low_confidence.len(),
            "located references"
        );
        output
    }

    /// Scans a single text, tagging every hit with `tag`.
    ///
    /// `scope` namespaces the generated ids; it is empty for amendment
    /// fragments and the parent reference id for resolved content.
    pub async fn locate_in(&self, text: &str, tag: SourceTag, scope: &str) -> LocatorOutput {
        if text.trim().is_empty() {
            return LocatorOutput::default();
        }

        let mut candidates: Vec<Candidate> = detect(text)
            .into_iter()
            .map(|h| Candidate {
                start: h.start,
                end: h.end,
                confidence: h.confidence,
            })
            .collect();

        if self.semantic_detection {
            if let Some(service) = &self.service {
                match detect_with_service(service, text).await {
                    Ok(extra) => merge_candidates(&mut candidates, extra),
                    Err(e) => {
                        warn!(tag = tag.as_str(), error = %e, "semantic detection failed, using rule-based hits only");
                    }
                }
            }
        }

        self.build_output(text, tag, scope, candidates)
    }

    /// Sorts candidates, assigns ids and parents, and splits by threshold.
    fn build_output(
        &self,
        text: &str,
        tag: SourceTag,
        scope: &str,
        mut candidates: Vec<Candidate>,
    ) -> LocatorOutput {
        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
        });

        let ids: Vec<String> = candidates
            .iter()
            .map(|c| generate_reference_id(scope, tag, c.start, &text[c.start..c.end]))
            .collect();

        let mut output = LocatorOutput::default();
        for (i, c) in candidates.iter().enumerate() {
            // Smallest strictly enclosing candidate.
            let parent = candidates
                .iter()
                .enumerate()
                .filter(|(j, p)| {
                    *j != i
                        && p.start <= c.start
                        && c.end <= p.end
                        && (p.end - p.start) > (c.end - c.start)
                })
                .min_by_key(|(_, p)| p.end - p.start)
                .map(|(j, _)| ids[j].clone());

            let located = LocatedReference {
                id: ids[i].clone(),
                reference_text: text[c.start..c.end].to_string(),
                start_offset: c.start,
                end_offset: c.end,
                source_tag: tag,
                confidence: c.confidence,
                parent_reference: parent,
            };

            if located.confidence >= self.threshold {
                output.references.push(located);
            } else {
                debug!(
                    reference = %located.reference_text,
                    confidence = located.confidence,
                    "low-confidence detection kept for review"
                );
                output.low_confidence.push(located);
            }
        }
        output
    }
}

/// Merges `extra` into `candidates`; identical spans keep the higher confidence.
fn merge_candidates(candidates: &mut Vec<Candidate>, extra: Vec<Candidate>) {
    for e in extra {
        match candidates
            .iter_mut()
            .find(|c| c.start == e.start && c.end == e.end)
        {
            Some(existing) => existing.confidence = existing.confidence.max(e.confidence),
            None => candidates.push(e),
        }
    }
}

fn detection_schema() -> ResponseSchema {
    ResponseSchema::new().required("references", FieldKind::Array)
}

fn detection_item_schema() -> ResponseSchema {
    ResponseSchema::new()
        .required("text", FieldKind::String)
        .required("confidence", FieldKind::Number)
}

/// Asks the service for citation spans and maps them back onto `text`.
///
/// Each returned snippet is anchored at its first occurrence not already
/// claimed by an earlier snippet; snippets absent from `text` are dropped.
async fn detect_with_service(service: &GuardedService, text: &str) -> Result<Vec<Candidate>> {
    let request = SemanticRequest {
        task: SemanticTask::DetectReferences,
        instruction: "List every citation of a legal provision (article, numbered or lettered \
                      subdivision, regulation, directive, code, paragraph or point) in the input. \
                      Return each citation verbatim with a confidence between 0 and 1."
            .to_string(),
        input: text.to_string(),
        schema: detection_schema(),
    };
    let record = service.request(&request).await?;
    let items = record
        .get("references")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let item_schema = detection_item_schema();
    let mut found: Vec<Candidate> = Vec::new();
    for item in &items {
        item_schema.validate(item)?;
        let snippet = str_field(item, "text").unwrap_or_default().trim();
        if snippet.is_empty() {
            continue;
        }
        let confidence = confidence_field(item, "confidence").unwrap_or(0.0);
        let anchored = text
            .match_indices(snippet)
            .map(|(start, s)| (start, start + s.len()))
            .find(|(start, end)| !found.iter().any(|c| c.start == *start && c.end == *end));
        match anchored {
            Some((start, end)) => found.push(Candidate {
                start,
                end,
                confidence,
            }),
            None => debug!(snippet, "semantic hit not present in fragment, dropped"),
        }
    }

    if found.len() < items.len() {
        debug!(
            returned = items.len(),
            anchored = found.len(),
            "some semantic hits were not anchored"
        );
    }
    Ok(found)
}
