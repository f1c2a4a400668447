use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::NormRefError;
use crate::semantic::schema::str_field;
use crate::semantic::{CallGuard, FieldKind, GuardedService, ResponseSchema, SemanticRequest, SemanticTask};
use crate::types::{IssueKind, LinkedReference};

use super::address::{parse_address, sub_unit_id, ReferenceAddress};
use super::documents::DocumentSource;
use super::hierarchy::{carve, normalize_article_id, widen, Carved, Marker};
use super::RetrievalScope;

/// Content found for a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub content: String,
    /// Which strategy succeeded and how; see the crate documentation for keys.
    pub metadata: BTreeMap<String, String>,
    /// The unit the content was carved from, used as the scope of any
    /// sub-reference found in `content`.
    pub unit_scope: RetrievalScope,
}

/// Why retrieval produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalFailure {
    pub kind: IssueKind,
    pub detail: String,
}

impl RetrievalFailure {
    pub fn new(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(IssueKind::RetrievalNotFound, detail)
    }

    fn from_error(e: &NormRefError, while_doing: &str) -> Self {
        if e.is_timeout() {
            Self::new(IssueKind::RetrievalTimeout, format!("{}: {}", while_doing, e))
        } else {
            let kind = match e {
                NormRefError::Document { .. } => IssueKind::RetrievalNotFound,
                _ => IssueKind::ServiceFailure,
            };
            Self::new(kind, format!("{}: {}", while_doing, e))
        }
    }
}

/// A unit located for a reference, before extraction.
struct CarvedUnit {
    /// Text the carve was taken from; widening reads around the carve in it.
    source_text: String,
    carved: Carved,
    strategy: &'static str,
    source: String,
    unit: String,
    sub_unit: Option<String>,
    unit_scope: RetrievalScope,
}

/// Retrieves the content of linked references.
///
/// Strategies are tried in order: carving a subdivision of the article in
/// context, fetching the cited sub-unit directly, fetching its parent unit
/// and carving, and fetching the whole source and carving. An empty answer
/// from a carve that removed at least half of its source is retried once on
/// a widened window.
pub struct ContentRetrievalStrategy {
    documents: Arc<dyn DocumentSource>,
    guard: CallGuard,
    extractor: Option<GuardedService>,
    widen_window: usize,
}

impl ContentRetrievalStrategy {
    pub fn new(documents: Arc<dyn DocumentSource>, guard: CallGuard) -> Self {
        Self {
            documents,
            guard,
            extractor: None,
            widen_window: 300,
        }
    }

    /// Extracts answers with `service` instead of returning carved text verbatim.
    pub fn with_extractor(mut self, service: GuardedService) -> Self {
        self.extractor = Some(service);
        self
    }

    pub fn widen_window(mut self, window: usize) -> Self {
        self.widen_window = window;
        self
    }

    /// Resolves `reference`, read relative to `scope`.
    pub async fn retrieve(
        &self,
        reference: &LinkedReference,
        scope: &RetrievalScope,
    ) -> std::result::Result<Retrieved, RetrievalFailure> {
        let address = parse_address(reference.reference_text(), scope);
        debug!(reference = reference.reference_text(), ?address, "parsed address");

        let unit = match address {
            ReferenceAddress::Internal { path } => self.locate_internal(&path, scope)?,
            ReferenceAddress::External {
                source_id,
                unit_id,
                sub_path,
            } => {
                self.locate_external(&source_id, unit_id.as_deref(), &sub_path)
                    .await?
            }
            ReferenceAddress::Unaddressable => {
                return Err(RetrievalFailure::not_found(format!(
                    "no address can be derived from \"{}\"",
                    reference.reference_text()
                )))
            }
        };

        let (content, widened) = self
            .extract(&reference.resolution_question, &unit.source_text, &unit.carved)
            .await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("strategy".to_string(), unit.strategy.to_string());
        metadata.insert("source".to_string(), unit.source.clone());
        metadata.insert("unit".to_string(), unit.unit.clone());
        if let Some(sub_unit) = &unit.sub_unit {
            metadata.insert("sub_unit".to_string(), sub_unit.clone());
        }
        metadata.insert(
            "carve_ratio".to_string(),
            format!("{:.2}", carve_ratio(&unit.carved, &unit.source_text)),
        );
        metadata.insert(
            "extraction".to_string(),
            if self.extractor.is_some() {
                "service"
            } else {
                "verbatim"
            }
            .to_string(),
        );
        metadata.insert("widened_retry".to_string(), widened.to_string());

        info!(
            reference = reference.reference_text(),
            strategy = unit.strategy,
            widened,
            "retrieved content"
        );
        Ok(Retrieved {
            content,
            metadata,
            unit_scope: unit.unit_scope,
        })
    }

    fn locate_internal(
        &self,
        path: &[Vec<Marker>],
        scope: &RetrievalScope,
    ) -> std::result::Result<CarvedUnit, RetrievalFailure> {
        if scope.text.trim().is_empty() {
            return Err(RetrievalFailure::not_found(format!(
                "no text available for article {}",
                scope.article_id
            )));
        }
        let carved = carve(&scope.text, path).ok_or_else(|| {
            RetrievalFailure::not_found(format!(
                "{} not found in article {}",
                path_label(path),
                scope.article_id
            ))
        })?;
        Ok(CarvedUnit {
            source_text: scope.text.clone(),
            carved,
            strategy: "internal_carve",
            source: scope.source_id.clone().unwrap_or_default(),
            unit: format!("article {}", scope.article_id),
            sub_unit: (!path.is_empty()).then(|| path_label(path)),
            unit_scope: scope.clone(),
        })
    }

    async fn locate_external(
        &self,
        source_id: &str,
        unit_id: Option<&str>,
        sub_path: &[Vec<Marker>],
    ) -> std::result::Result<CarvedUnit, RetrievalFailure> {
        let sub_unit = (!sub_path.is_empty()).then(|| path_label(sub_path));
        let article_id = unit_id
            .and_then(|u| u.strip_prefix("article "))
            .unwrap_or_default()
            .to_string();
        let scope_of = |text: &str| RetrievalScope {
            article_id: article_id.clone(),
            source_id: Some(source_id.to_string()),
            text: text.to_string(),
        };

        if let Some(unit) = unit_id {
            if !sub_path.is_empty() {
                let fine = sub_unit_id(unit, sub_path);
                if let Some(text) = self.fetch(source_id, &fine).await? {
                    return Ok(CarvedUnit {
                        carved: Carved::whole(&text),
                        strategy: "direct_fetch",
                        source: source_id.to_string(),
                        unit: unit.to_string(),
                        sub_unit,
                        unit_scope: scope_of(&text),
                        source_text: text,
                    });
                }
                if let Some(text) = self.fetch(source_id, unit).await? {
                    let carved = carve(&text, sub_path).ok_or_else(|| {
                        RetrievalFailure::not_found(format!(
                            "{} not found in {} of {}",
                            path_label(sub_path),
                            unit,
                            source_id
                        ))
                    })?;
                    return Ok(CarvedUnit {
                        carved,
                        strategy: "parent_carve",
                        source: source_id.to_string(),
                        unit: unit.to_string(),
                        sub_unit,
                        unit_scope: scope_of(&text),
                        source_text: text,
                    });
                }
            } else if let Some(text) = self.fetch(source_id, unit).await? {
                return Ok(CarvedUnit {
                    carved: Carved::whole(&text),
                    strategy: "direct_fetch",
                    source: source_id.to_string(),
                    unit: unit.to_string(),
                    sub_unit: None,
                    unit_scope: scope_of(&text),
                    source_text: text,
                });
            }
        }

        let full = self.fetch(source_id, "").await?.ok_or_else(|| {
            RetrievalFailure::not_found(format!(
                "no document for {}{}",
                unit_id.map(|u| format!("{} of ", u)).unwrap_or_default(),
                source_id
            ))
        })?;

        let mut path: Vec<Vec<Marker>> = Vec::with_capacity(sub_path.len() + 1);
        if unit_id.is_some() {
            path.push(vec![Marker::Article(normalize_article_id(&article_id))]);
        }
        path.extend(sub_path.iter().cloned());

        let carved = carve(&full, &path).ok_or_else(|| {
            RetrievalFailure::not_found(format!("{} not found in {}", path_label(&path), source_id))
        })?;
        let unit_text = match unit_id {
            Some(_) => carve(&full, &path[..1]).map(|c| c.text).unwrap_or_default(),
            None => full.clone(),
        };
        Ok(CarvedUnit {
            carved,
            strategy: "enclosing_carve",
            source: source_id.to_string(),
            unit: unit_id.unwrap_or_default().to_string(),
            sub_unit,
            unit_scope: scope_of(&unit_text),
            source_text: full,
        })
    }

    async fn fetch(
        &self,
        source_id: &str,
        unit_id: &str,
    ) -> std::result::Result<Option<String>, RetrievalFailure> {
        let documents = &self.documents;
        self.guard
            .run("fetch_document", || documents.fetch(source_id, unit_id))
            .await
            .map_err(|e| RetrievalFailure::from_error(&e, "document fetch failed"))
    }

    /// Extracts the answer from the carve, widening once if it comes back empty.
    ///
    /// Returns the answer and whether the widened retry produced it.
    async fn extract(
        &self,
        question: &str,
        source_text: &str,
        carved: &Carved,
    ) -> std::result::Result<(String, bool), RetrievalFailure> {
        let answer = self.answer(question, &carved.text).await?;
        if !answer.is_empty() {
            return Ok((answer, false));
        }

        if carved.len() * 2 <= source_text.len() {
            let span = widen(source_text, carved.start, carved.end, self.widen_window);
            debug!(
                start = span.start,
                end = span.end,
                "empty extraction, retrying on widened window"
            );
            let answer = self.answer(question, &source_text[span]).await?;
            if !answer.is_empty() {
                return Ok((answer, true));
            }
        }

        Err(RetrievalFailure::new(
            IssueKind::ExtractionEmpty,
            format!("no answer to \"{}\" in the carved text", question),
        ))
    }

    async fn answer(&self, question: &str, text: &str) -> std::result::Result<String, RetrievalFailure> {
        let Some(service) = &self.extractor else {
            return Ok(text.trim().to_string());
        };
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let request = SemanticRequest {
            task: SemanticTask::ExtractAnswer,
            instruction: format!(
                "Answer the question using only the input text. Quote the relevant provision \
                 as it is written; return an empty answer if the text does not answer it.\n\
                 Question: {}",
                question
            ),
            input: text.to_string(),
            schema: ResponseSchema::new().required("answer", FieldKind::String),
        };
        let record = service
            .request(&request)
            .await
            .map_err(|e| RetrievalFailure::from_error(&e, "answer extraction failed"))?;
        Ok(str_field(&record, "answer").unwrap_or_default().trim().to_string())
    }
}

impl std::fmt::Debug for ContentRetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRetrievalStrategy")
            .field("guard", &self.guard)
            .field("extractor", &self.extractor)
            .field("widen_window", &self.widen_window)
            .finish()
    }
}

fn carve_ratio(carved: &Carved, source_text: &str) -> f64 {
    if source_text.is_empty() {
        1.0
    } else {
        carved.len() as f64 / source_text.len() as f64
    }
}

fn path_label(path: &[Vec<Marker>]) -> String {
    let label = sub_unit_id("", path);
    label.trim_start_matches(", ").to_string()
}
