//! Resolution orchestration: drives linked references through relevance
//! checks and retrieval, discovering sub-references in resolved
//! DEFINITIONAL content.
//!
//! Work is kept on an explicit stack with depth counters and a
//! visited-signature set; resolved nodes live in an arena and are folded into
//! `ResolvedReference` trees once the stack drains.

/// Relevance check of linked references.
pub mod relevance;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::linker::{ReferenceObjectLinker, AMBIGUOUS_LINK_CONFIDENCE};
use crate::locator::ReferenceLocator;
use crate::retrieval::{
    parse_address, ContentRetrievalStrategy, ReferenceAddress, RetrievalScope, Retrieved,
};
use crate::types::{
    ArticleContext, IssueKind, LinkedReference, ResolutionResult, ResolutionStats,
    ResolutionStatus, ResolvedReference, Signature, SourceTag, TextFragmentPair,
    UnresolvedReference,
};

pub use relevance::{assess_by_rules, Assessment, Relevance, RelevanceAssessor};

/// One pending resolution.
#[derive(Debug)]
struct Entry {
    reference: LinkedReference,
    depth: usize,
    /// Arena index of the resolved reference this one was found in.
    parent: Option<usize>,
    /// Text the reference was found in.
    origin: Arc<str>,
    scope: Arc<RetrievalScope>,
}

#[derive(Debug)]
struct Node {
    resolved: ResolvedReference,
    children: Vec<usize>,
}

/// Outcome of one resolution attempt, computed without touching run state.
enum Attempt {
    Resolved {
        retrieved: Retrieved,
        warnings: Vec<String>,
        children: Vec<LinkedReference>,
    },
    Unresolved {
        reason: IssueKind,
        detail: String,
    },
}

/// Mutable state of one fragment pair's resolution.
#[derive(Debug, Default)]
struct Run {
    stack: Vec<Entry>,
    /// Signatures of every top-level reference plus every sub-reference taken up.
    visited: HashSet<Signature>,
    /// Top-level signatures already taken up by an earlier top-level entry.
    claimed_roots: HashSet<Signature>,
    arena: Vec<Node>,
    roots: Vec<usize>,
    unresolved: Vec<UnresolvedReference>,
    stats: ResolutionStats,
}

impl Run {
    fn record_unresolved(&mut self, entry: Entry, reason: IssueKind, detail: String) {
        if reason.is_skip() {
            self.stats.skipped += 1;
        } else {
            self.stats.unresolved += 1;
        }
        debug!(
            reference = entry.reference.reference_text(),
            depth = entry.depth,
            reason = reason.as_str(),
            %detail,
            "reference unresolved"
        );

        let parent_id = entry.parent.map(|p| {
            let parent = &mut self.arena[p].resolved;
            if !reason.is_skip() {
                parent.unresolved_sub_references.push(entry.reference.clone());
            }
            parent.linked_reference.id().to_string()
        });
        self.unresolved.push(UnresolvedReference {
            reference: entry.reference,
            reason,
            detail,
            depth: entry.depth,
            parent_id,
        });
    }

    /// Adds a resolved node and returns its arena index.
    fn record_resolved(&mut self, entry: Entry, retrieved: Retrieved, warnings: Vec<String>) -> usize {
        let idx = self.arena.len();
        self.arena.push(Node {
            resolved: ResolvedReference {
                linked_reference: entry.reference,
                resolved_content: retrieved.content,
                retrieval_metadata: retrieved.metadata,
                sub_references: Vec::new(),
                unresolved_sub_references: Vec::new(),
                resolution_status: ResolutionStatus::Resolved,
                warnings,
            },
            children: Vec::new(),
        });
        match entry.parent {
            Some(p) => self.arena[p].children.push(idx),
            None => self.roots.push(idx),
        }
        self.stats.resolved += 1;
        idx
    }

    /// Marks `first` and everything left on the stack as never attempted.
    fn abandon(&mut self, first: Option<Entry>, detail: &str) {
        self.stats.budget_exhausted = true;
        let mut pending: Vec<Entry> = first.into_iter().collect();
        pending.extend(std::mem::take(&mut self.stack).into_iter().rev());
        warn!(abandoned = pending.len(), detail, "abandoning remaining references");
        for entry in pending {
            self.record_unresolved(entry, IssueKind::BudgetExhausted, detail.to_string());
        }
    }

    fn into_result(self) -> ResolutionResult {
        let (mut built, children): (Vec<Option<ResolvedReference>>, Vec<Vec<usize>>) = self
            .arena
            .into_iter()
            .map(|n| (Some(n.resolved), n.children))
            .unzip();

        // Children always sit after their parent in the arena.
        for idx in (0..built.len()).rev() {
            let subs: Vec<ResolvedReference> = children[idx]
                .iter()
                .filter_map(|c| built[*c].take())
                .collect();
            if let Some(node) = built[idx].as_mut() {
                node.sub_references = subs;
                if !node.unresolved_sub_references.is_empty() {
                    node.resolution_status = ResolutionStatus::Partial;
                }
            }
        }

        let mut result = ResolutionResult {
            stats: self.stats,
            unresolved: self.unresolved,
            ..Default::default()
        };
        for root in self.roots {
            if let Some(node) = built[root].take() {
                match node.linked_reference.source_tag() {
                    SourceTag::Deletional => result.resolved_deletional.push(node),
                    SourceTag::Definitional => result.resolved_definitional.push(node),
                }
            }
        }
        result
    }
}

/// Resolves the linked references of one fragment pair.
///
/// Holds no per-run state, so one orchestrator can serve concurrent
/// fragment pairs.
#[derive(Debug)]
pub struct ResolutionOrchestrator {
    locator: ReferenceLocator,
    linker: ReferenceObjectLinker,
    relevance: RelevanceAssessor,
    retrieval: ContentRetrievalStrategy,
    max_depth: usize,
    max_stack_entries: usize,
    resolve_ambiguous: bool,
    budget: Duration,
}

impl ResolutionOrchestrator {
    pub fn new(
        locator: ReferenceLocator,
        linker: ReferenceObjectLinker,
        relevance: RelevanceAssessor,
        retrieval: ContentRetrievalStrategy,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            locator,
            linker,
            relevance,
            retrieval,
            max_depth: config.max_depth,
            max_stack_entries: config.max_stack_entries,
            resolve_ambiguous: config.resolve_ambiguous,
            budget: config.wall_clock_budget(),
        }
    }

    /// Resolves `references`, which were located in `pair` and linked
    /// against `context`.
    ///
    /// Per-reference failures are recorded and never stop siblings. Running
    /// out of wall-clock budget or stack space stops the run; what was
    /// resolved so far is kept and everything else is reported as
    /// [`IssueKind::BudgetExhausted`].
    pub async fn resolve(
        &self,
        references: Vec<LinkedReference>,
        pair: &TextFragmentPair,
        context: &ArticleContext,
    ) -> ResolutionResult {
        let deadline = Instant::now() + self.budget;
        let mut run = Run {
            stats: ResolutionStats {
                located: references.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        let deletional: (Arc<str>, Arc<RetrievalScope>) = (
            Arc::from(pair.deleted_text.as_str()),
            Arc::new(RetrievalScope::for_article(context, SourceTag::Deletional)),
        );
        let definitional: (Arc<str>, Arc<RetrievalScope>) = (
            Arc::from(pair.inserted_text.as_str()),
            Arc::new(RetrievalScope::for_article(context, SourceTag::Definitional)),
        );

        for reference in references.into_iter().rev() {
            run.visited.insert(reference.signature());
            let (origin, scope) = match reference.source_tag() {
                SourceTag::Deletional => &deletional,
                SourceTag::Definitional => &definitional,
            };
            run.stack.push(Entry {
                origin: Arc::clone(origin),
                scope: Arc::clone(scope),
                reference,
                depth: 0,
                parent: None,
            });
        }
        if run.stack.len() > self.max_stack_entries {
            run.abandon(None, "initial references exceed max_stack_entries");
            return run.into_result();
        }

        while let Some(entry) = run.stack.pop() {
            if Instant::now() >= deadline {
                run.abandon(Some(entry), "wall-clock budget exhausted");
                break;
            }
            if entry.depth >= self.max_depth {
                let detail = format!("depth {} reaches max_depth {}", entry.depth, self.max_depth);
                run.record_unresolved(entry, IssueKind::DepthExceeded, detail);
                continue;
            }
            if entry.parent.is_none() {
                // Top-level signatures are pre-registered in `visited`, so a
                // sub-reference repeating one is skipped in its favour.
                if !run.claimed_roots.insert(entry.reference.signature()) {
                    run.stats.cycles += 1;
                    run.record_unresolved(
                        entry,
                        IssueKind::CycleDetected,
                        "repeats an earlier reference of the fragment pair".to_string(),
                    );
                    continue;
                }
            } else if !run.visited.insert(entry.reference.signature()) {
                run.stats.cycles += 1;
                debug!(
                    reference = entry.reference.reference_text(),
                    depth = entry.depth,
                    "signature already visited, skipping"
                );
                continue;
            }

            let attempt = match tokio::time::timeout_at(deadline, self.attempt(&entry)).await {
                Ok(attempt) => attempt,
                Err(_) => {
                    run.abandon(Some(entry), "wall-clock budget exhausted");
                    break;
                }
            };

            match attempt {
                Attempt::Unresolved { reason, detail } => {
                    run.record_unresolved(entry, reason, detail);
                }
                Attempt::Resolved {
                    retrieved,
                    warnings,
                    children,
                } => {
                    let depth = entry.depth;
                    let origin: Arc<str> = Arc::from(retrieved.content.as_str());
                    let scope = Arc::new(retrieved.unit_scope.clone());
                    let idx = run.record_resolved(entry, retrieved, warnings);

                    let overflow = run.stack.len() + children.len() > self.max_stack_entries;
                    for child in children.into_iter().rev() {
                        run.stack.push(Entry {
                            reference: child,
                            depth: depth + 1,
                            parent: Some(idx),
                            origin: Arc::clone(&origin),
                            scope: Arc::clone(&scope),
                        });
                    }
                    if overflow {
                        run.abandon(None, "stack exceeded max_stack_entries");
                        break;
                    }
                }
            }
        }

        info!(
            resolved = run.stats.resolved,
            unresolved = run.stats.unresolved,
            skipped = run.stats.skipped,
            cycles = run.stats.cycles,
            budget_exhausted = run.stats.budget_exhausted,
            "resolution finished"
        );
        run.into_result()
    }

    /// Runs relevance, retrieval and sub-reference discovery for one entry.
    async fn attempt(&self, entry: &Entry) -> Attempt {
        let reference = &entry.reference;
        let mut warnings = Vec::new();
        if reference.confidence < AMBIGUOUS_LINK_CONFIDENCE {
            warnings.push(format!(
                "{}: {}",
                IssueKind::LinkingAmbiguous.as_str(),
                reference.agreement_rationale
            ));
        }

        let assessment = self.relevance.assess(reference, &entry.origin).await;
        match assessment.relevance {
            Relevance::Required => {}
            Relevance::Supplementary => {
                return Attempt::Unresolved {
                    reason: IssueKind::Supplementary,
                    detail: assessment.rationale,
                }
            }
            Relevance::Ambiguous if !self.resolve_ambiguous => {
                return Attempt::Unresolved {
                    reason: IssueKind::AmbiguousSkipped,
                    detail: assessment.rationale,
                }
            }
            Relevance::Ambiguous => {
                warnings.push(format!("ambiguous relevance: {}", assessment.rationale));
            }
        }

        let retrieved = match self.retrieval.retrieve(reference, &entry.scope).await {
            Ok(retrieved) => retrieved,
            Err(failure) => {
                warn!(
                    reference = reference.reference_text(),
                    reason = failure.kind.as_str(),
                    detail = %failure.detail,
                    "retrieval failed"
                );
                return Attempt::Unresolved {
                    reason: failure.kind,
                    detail: failure.detail,
                };
            }
        };

        // Sub-references are only followed in definitional content.
        let children = if reference.source_tag() == SourceTag::Definitional {
            let found = self
                .locator
                .locate_in(&retrieved.content, SourceTag::Definitional, reference.id())
                .await;
            let mut children = Vec::with_capacity(found.references.len());
            for located in &found.references {
                // A unit citing itself, e.g. its own "Article 47" heading.
                if matches!(
                    parse_address(&located.reference_text, &retrieved.unit_scope),
                    ReferenceAddress::Internal { ref path } if path.is_empty()
                ) {
                    continue;
                }
                children.push(
                    self.linker
                        .link(located, &retrieved.content, &retrieved.unit_scope.text)
                        .await,
                );
            }
            if !children.is_empty() {
                debug!(
                    reference = reference.reference_text(),
                    depth = entry.depth,
                    found = children.len(),
                    "discovered sub-references"
                );
            }
            children
        } else {
            Vec::new()
        };

        Attempt::Resolved {
            retrieved,
            warnings,
            children,
        }
    }
}
