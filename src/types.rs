use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Which fragment of an amendment a reference was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTag {
    /// Found in the text removed by the amendment.
    Deletional,
    /// Found in the text inserted by the amendment.
    Definitional,
}

#[allow(clippy::should_implement_trait)]
impl SourceTag {
    /// Returns the string representation of this tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Deletional => "DELETIONAL",
            SourceTag::Definitional => "DEFINITIONAL",
        }
    }

    /// Parses a string into a `SourceTag`, returning `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<SourceTag> {
        match s {
            "DELETIONAL" => Some(SourceTag::Deletional),
            "DEFINITIONAL" => Some(SourceTag::Definitional),
            _ => None,
        }
    }
}

/// The deleted and inserted spans of one amendment chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragmentPair {
    pub deleted_text: String,
    pub inserted_text: String,
}

impl TextFragmentPair {
    pub fn new(deleted_text: impl Into<String>, inserted_text: impl Into<String>) -> Self {
        Self {
            deleted_text: deleted_text.into(),
            inserted_text: inserted_text.into(),
        }
    }

    /// Returns the fragment a tag refers to.
    pub fn fragment(&self, tag: SourceTag) -> &str {
        match tag {
            SourceTag::Deletional => &self.deleted_text,
            SourceTag::Definitional => &self.inserted_text,
        }
    }
}

/// The article under amendment, before and after the change.
///
/// `before_text` is the context for DELETIONAL references and `after_text`
/// the context for DEFINITIONAL ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleContext {
    /// Identifier of the amended article, e.g. `"L. 254-1"`.
    pub article_id: String,
    /// Code or regulation the article belongs to, e.g. `"code rural et de la pêche maritime"`.
    pub code_id: Option<String>,
    pub before_text: String,
    pub after_text: String,
}

impl ArticleContext {
    /// Returns the context document selected by `tag`.
    pub fn text_for(&self, tag: SourceTag) -> &str {
        match tag {
            SourceTag::Deletional => &self.before_text,
            SourceTag::Definitional => &self.after_text,
        }
    }
}

/// A citation span detected inside one fragment.
///
/// Offsets are byte offsets into the original fragment named by `source_tag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedReference {
    pub id: String,
    pub reference_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub source_tag: SourceTag,
    pub confidence: f64,
    /// Id of the enclosing reference when this hit is nested inside another.
    pub parent_reference: Option<String>,
}

/// A located reference bound to the concept it defines or constrains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedReference {
    pub located: LocatedReference,
    pub object: String,
    pub agreement_rationale: String,
    pub resolution_question: String,
    /// Confidence of the grammatical binding, independent of detection confidence.
    pub confidence: f64,
}

impl LinkedReference {
    pub fn id(&self) -> &str {
        &self.located.id
    }

    pub fn reference_text(&self) -> &str {
        &self.located.reference_text
    }

    pub fn source_tag(&self) -> SourceTag {
        self.located.source_tag
    }

    /// The cycle-detection key of this reference.
    pub fn signature(&self) -> Signature {
        Signature {
            source_tag: self.located.source_tag,
            object: self.object.clone(),
            reference_text: self.located.reference_text.clone(),
        }
    }
}

/// `(source_tag, object, reference_text)`: two stack entries with the same
/// signature are the same resolution problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    pub source_tag: SourceTag,
    pub object: String,
    pub reference_text: String,
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    /// Content was found but some sub-references stayed unresolved.
    Partial,
    Failed,
}

/// A reference together with the content it resolved to.
///
/// Forms a tree through `sub_references`, discovered while re-examining the
/// resolved content of DEFINITIONAL references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub linked_reference: LinkedReference,
    pub resolved_content: String,
    pub retrieval_metadata: BTreeMap<String, String>,
    pub sub_references: Vec<ResolvedReference>,
    pub unresolved_sub_references: Vec<LinkedReference>,
    pub resolution_status: ResolutionStatus,
    pub warnings: Vec<String>,
}

impl ResolvedReference {
    /// Total number of resolved nodes in this tree, including `self`.
    pub fn tree_size(&self) -> usize {
        1 + self
            .sub_references
            .iter()
            .map(ResolvedReference::tree_size)
            .sum::<usize>()
    }
}

/// Why a reference ended up unresolved, or another per-reference issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    LowConfidenceDetection,
    LinkingAmbiguous,
    RetrievalNotFound,
    RetrievalTimeout,
    ExtractionEmpty,
    CycleDetected,
    DepthExceeded,
    MatchNotFoundInFragment,
    /// Judged supplementary by the relevance check; skipped on purpose.
    Supplementary,
    /// Judged ambiguous while ambiguous references are configured to be skipped.
    AmbiguousSkipped,
    /// Never attempted because the fragment pair ran out of budget.
    BudgetExhausted,
    ServiceFailure,
}

#[allow(clippy::should_implement_trait)]
impl IssueKind {
    /// Returns the string representation of this issue kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::LowConfidenceDetection => "low_confidence_detection",
            IssueKind::LinkingAmbiguous => "linking_ambiguous",
            IssueKind::RetrievalNotFound => "retrieval_not_found",
            IssueKind::RetrievalTimeout => "retrieval_timeout",
            IssueKind::ExtractionEmpty => "extraction_empty",
            IssueKind::CycleDetected => "cycle_detected",
            IssueKind::DepthExceeded => "depth_exceeded",
            IssueKind::MatchNotFoundInFragment => "match_not_found_in_fragment",
            IssueKind::Supplementary => "supplementary",
            IssueKind::AmbiguousSkipped => "ambiguous_skipped",
            IssueKind::BudgetExhausted => "budget_exhausted",
            IssueKind::ServiceFailure => "service_failure",
        }
    }

    /// Parses a string into an `IssueKind`, returning `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<IssueKind> {
        match s {
            "low_confidence_detection" => Some(IssueKind::LowConfidenceDetection),
            "linking_ambiguous" => Some(IssueKind::LinkingAmbiguous),
            "retrieval_not_found" => Some(IssueKind::RetrievalNotFound),
            "retrieval_timeout" => Some(IssueKind::RetrievalTimeout),
            "extraction_empty" => Some(IssueKind::ExtractionEmpty),
            "cycle_detected" => Some(IssueKind::CycleDetected),
            "depth_exceeded" => Some(IssueKind::DepthExceeded),
            "match_not_found_in_fragment" => Some(IssueKind::MatchNotFoundInFragment),
            "supplementary" => Some(IssueKind::Supplementary),
            "ambiguous_skipped" => Some(IssueKind::AmbiguousSkipped),
            "budget_exhausted" => Some(IssueKind::BudgetExhausted),
            "service_failure" => Some(IssueKind::ServiceFailure),
            _ => None,
        }
    }

    /// Intentional skips are not failures.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            IssueKind::Supplementary | IssueKind::AmbiguousSkipped | IssueKind::CycleDetected
        )
    }
}

/// A reference that was not resolved, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub reference: LinkedReference,
    pub reason: IssueKind,
    pub detail: String,
    pub depth: usize,
    /// Id of the resolved reference whose content this one was found in.
    pub parent_id: Option<String>,
}

/// Counts reported alongside a resolution run, so accuracy can be audited
/// without reading logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub located: usize,
    pub low_confidence: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub skipped: usize,
    pub cycles: usize,
    pub budget_exhausted: bool,
}

/// Aggregate output of resolving one fragment pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub resolved_deletional: Vec<ResolvedReference>,
    pub resolved_definitional: Vec<ResolvedReference>,
    pub unresolved: Vec<UnresolvedReference>,
    pub stats: ResolutionStats,
}

impl ResolutionResult {
    /// Top-level resolved references for the fragment named by `tag`.
    pub fn resolved_for(&self, tag: SourceTag) -> &[ResolvedReference] {
        match tag {
            SourceTag::Deletional => &self.resolved_deletional,
            SourceTag::Definitional => &self.resolved_definitional,
        }
    }

    /// Returns `true` if `id` occurs anywhere in the result, resolved or not.
    pub fn contains_reference(&self, id: &str) -> bool {
        fn in_tree(r: &ResolvedReference, id: &str) -> bool {
            r.linked_reference.id() == id || r.sub_references.iter().any(|s| in_tree(s, id))
        }
        self.resolved_deletional
            .iter()
            .chain(self.resolved_definitional.iter())
            .any(|r| in_tree(r, id))
            || self.unresolved.iter().any(|u| u.reference.id() == id)
    }
}

/// How resolved content is rendered into a fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Footnote,
    Inline,
    None,
}

#[allow(clippy::should_implement_trait)]
impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Footnote => "footnote",
            RenderMode::Inline => "inline",
            RenderMode::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Option<RenderMode> {
        match s {
            "footnote" => Some(RenderMode::Footnote),
            "inline" => Some(RenderMode::Inline),
            "none" => Some(RenderMode::None),
            _ => None,
        }
    }
}

/// Where an annotation sits in the rendered text.
///
/// Offsets index into [`LegalState::text`], not into the original fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSpan {
    pub marker_index: usize,
    pub reference_text: String,
    pub object: String,
    pub resolved_content: String,
    pub source_tag: SourceTag,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A rendered "before" or "after" state of the amended text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegalState {
    pub text: String,
    pub annotations: Vec<AnnotationSpan>,
}

/// Generates a deterministic reference ID from its scope, tag, start offset
/// and text.
///
/// `scope` is empty for references found in the amendment fragments and is
/// the parent reference id for references found inside resolved content, so
/// that equal offsets in different texts never collide. The ID format is
/// `"ref:16hexchars"`, taken from the SHA-256 hash of the input components.
pub fn generate_reference_id(
    scope: &str,
    tag: SourceTag,
    start_offset: usize,
    reference_text: &str,
) -> String {
    let input = format!(
        "{}:{}:{}:{}",
        scope,
        tag.as_str(),
        start_offset,
        reference_text
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hasher.finalize();
    let hex_str = hex::encode(hash);
    format!("ref:{}", &hex_str[..16])
}
