/// Exact and normalised occurrence search.
pub mod matcher;

/// Footnote and inline rendering helpers.
pub mod render;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ResolverConfig;
use crate::types::{
    AnnotationSpan, LegalState, RenderMode, ResolutionResult, ResolvedReference, SourceTag,
    TextFragmentPair,
};

pub use matcher::find_occurrences;

/// Match accounting for one synthesis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// Annotations rendered across both fragments.
    pub annotated: usize,
    /// Resolved references that could not be placed: absent from the
    /// fragment, or every occurrence lost to a longer overlapping match.
    pub unmatched: usize,
    /// Ids of those references.
    pub unmatched_references: Vec<String>,
    /// Resolved references present in the fragment but left unannotated
    /// because an earlier reference with the same text was annotated.
    pub suppressed: usize,
    /// Ids of those references.
    pub suppressed_references: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub before: LegalState,
    pub after: LegalState,
    pub report: SynthesisReport,
}

/// An occurrence of a resolved reference in the fragment.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    start: usize,
    end: usize,
    reference: usize,
}

impl Candidate {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Candidates kept for rendering, and the references dropped only by the
/// first-occurrence rule.
struct Selection {
    kept: Vec<Candidate>,
    suppressed: HashSet<usize>,
}

/// Renders resolved references into their fragments.
#[derive(Debug, Clone)]
pub struct LegalStateSynthesizer {
    mode: RenderMode,
    annotate_all: bool,
    footnote_max_len: usize,
}

impl Default for LegalStateSynthesizer {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl LegalStateSynthesizer {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            mode: config.render_mode,
            annotate_all: config.annotate_all_occurrences,
            footnote_max_len: config.footnote_max_len,
        }
    }

    pub fn annotate_all_occurrences(mut self, enabled: bool) -> Self {
        self.annotate_all = enabled;
        self
    }

    pub fn footnote_max_len(mut self, max_len: usize) -> Self {
        self.footnote_max_len = max_len;
        self
    }

    /// Renders the before state from `deleted_text` and the after state from
    /// `inserted_text`.
    pub fn synthesize(&self, result: &ResolutionResult, pair: &TextFragmentPair) -> SynthesisOutput {
        let mut report = SynthesisReport::default();
        let before = self.render_fragment(
            &pair.deleted_text,
            result.resolved_for(SourceTag::Deletional),
            &mut report,
        );
        let after = self.render_fragment(
            &pair.inserted_text,
            result.resolved_for(SourceTag::Definitional),
            &mut report,
        );
        SynthesisOutput {
            before,
            after,
            report,
        }
    }

    /// Renders one fragment with the resolved references found in it.
    pub fn render_fragment(
        &self,
        fragment: &str,
        resolved: &[ResolvedReference],
        report: &mut SynthesisReport,
    ) -> LegalState {
        let Selection {
            kept: accepted,
            suppressed,
        } = self.accept(fragment, resolved);

        let mut annotated_refs: HashSet<usize> = HashSet::new();
        for c in &accepted {
            annotated_refs.insert(c.reference);
        }
        for (i, r) in resolved.iter().enumerate() {
            if annotated_refs.contains(&i) {
                continue;
            }
            if suppressed.contains(&i) {
                debug!(
                    reference = r.linked_reference.reference_text(),
                    "reference text already annotated at an earlier occurrence"
                );
                report.suppressed += 1;
                report
                    .suppressed_references
                    .push(r.linked_reference.id().to_string());
            } else {
                debug!(
                    reference = r.linked_reference.reference_text(),
                    "resolved reference could not be placed in fragment"
                );
                report.unmatched += 1;
                report
                    .unmatched_references
                    .push(r.linked_reference.id().to_string());
            }
        }
        report.annotated += accepted.len();

        let mut text = String::with_capacity(fragment.len());
        let mut annotations = Vec::with_capacity(accepted.len());
        let mut footnotes = Vec::new();
        let mut cursor = 0;

        for (n, c) in accepted.iter().enumerate() {
            let marker_index = n + 1;
            let r = &resolved[c.reference];
            let linked = &r.linked_reference;
            let matched = &fragment[c.start..c.end];

            text.push_str(&fragment[cursor..c.start]);
            let start_offset = text.len();
            match self.mode {
                RenderMode::Footnote => {
                    text.push_str(&render::footnote_marker(marker_index));
                    footnotes.push(render::footnote_entry(
                        marker_index,
                        linked.reference_text(),
                        &linked.object,
                        &r.resolved_content,
                        linked.source_tag(),
                        self.footnote_max_len,
                    ));
                }
                RenderMode::Inline => text.push_str(&render::inline_annotation(
                    matched,
                    &linked.object,
                    &r.resolved_content,
                )),
                RenderMode::None => text.push_str(matched),
            }
            cursor = c.end;

            annotations.push(AnnotationSpan {
                marker_index,
                reference_text: linked.reference_text().to_string(),
                object: linked.object.clone(),
                resolved_content: r.resolved_content.clone(),
                source_tag: linked.source_tag(),
                start_offset,
                end_offset: text.len(),
            });
        }
        text.push_str(&fragment[cursor..]);

        if !footnotes.is_empty() {
            text.push_str("\n\n");
            text.push_str(&footnotes.join("\n"));
        }

        LegalState { text, annotations }
    }

    /// Finds, orders and de-overlaps the spans to annotate.
    ///
    /// A span found by several references belongs to the one located there,
    /// so references sharing a text each keep their own occurrence.
    fn accept(&self, fragment: &str, resolved: &[ResolvedReference]) -> Selection {
        let mut candidates: Vec<Candidate> = Vec::new();
        for (i, r) in resolved.iter().enumerate() {
            let located = &r.linked_reference.located;
            let text = r.linked_reference.reference_text();
            let own_span = (fragment.get(located.start_offset..located.end_offset) == Some(text))
                .then_some((located.start_offset, located.end_offset));

            for (start, end) in find_occurrences(fragment, text) {
                match candidates
                    .iter_mut()
                    .find(|c| c.start == start && c.end == end)
                {
                    Some(existing) if own_span == Some((start, end)) => existing.reference = i,
                    Some(_) => {}
                    None => candidates.push(Candidate {
                        start,
                        end,
                        reference: i,
                    }),
                }
            }
        }
        candidates.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.len().cmp(&a.len())));

        // Greedy sweep: an overlapping candidate replaces the last kept one
        // only when it is strictly longer.
        let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for c in candidates {
            match kept.last() {
                Some(last) if c.start < last.end => {
                    if c.len() > last.len() {
                        kept.pop();
                        kept.push(c);
                    }
                }
                _ => kept.push(c),
            }
        }

        let mut suppressed = HashSet::new();
        if !self.annotate_all {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut dropped = Vec::new();
            kept.retain(|c| {
                let first = seen.insert(resolved[c.reference].linked_reference.reference_text());
                if !first {
                    dropped.push(c.reference);
                }
                first
            });
            let annotated: HashSet<usize> = kept.iter().map(|c| c.reference).collect();
            suppressed.extend(dropped.into_iter().filter(|r| !annotated.contains(r)));
        }
        Selection { kept, suppressed }
    }
}
