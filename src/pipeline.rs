use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{load_config, ResolverConfig};
use crate::errors::{NormRefError, Result};
use crate::limiter::RateLimiter;
use crate::linker::ReferenceObjectLinker;
use crate::locator::{LocatorOutput, ReferenceLocator};
use crate::orchestrator::{RelevanceAssessor, ResolutionOrchestrator};
use crate::retrieval::{ContentRetrievalStrategy, DocumentSource, InMemoryDocumentSource};
use crate::semantic::{CallGuard, GuardedService, SemanticService};
use crate::synthesis::{LegalStateSynthesizer, SynthesisReport};
use crate::types::{
    ArticleContext, LegalState, ResolutionResult, ResolvedReference, TextFragmentPair,
};

/// Everything produced for one fragment pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendmentOutcome {
    /// Located references, including the low-confidence list kept for review.
    pub located: LocatorOutput,
    pub resolution: ResolutionResult,
    pub before: LegalState,
    pub after: LegalState,
    pub synthesis: SynthesisReport,
}

/// End-to-end driver: locate, link, resolve and synthesise.
///
/// Cheap to share behind an `Arc`; every fragment pair gets its own
/// resolution state, while the rate limiter is shared by all of them.
#[derive(Debug)]
pub struct AmendmentResolver {
    config: ResolverConfig,
    locator: ReferenceLocator,
    linker: ReferenceObjectLinker,
    orchestrator: ResolutionOrchestrator,
    synthesizer: LegalStateSynthesizer,
    limiter: Arc<RateLimiter>,
}

/// Assembles an [`AmendmentResolver`] from its collaborators.
#[derive(Default)]
pub struct AmendmentResolverBuilder {
    config: ResolverConfig,
    documents: Option<Arc<dyn DocumentSource>>,
    service: Option<Arc<dyn SemanticService>>,
    limiter: Option<Arc<RateLimiter>>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl AmendmentResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the configuration stored under `project_root/.normref`,
    /// or the defaults if there is none.
    pub fn from_project(project_root: &Path) -> Result<Self> {
        Ok(Self::new().config(load_config(project_root)?))
    }

    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn semantic_service(mut self, service: Arc<dyn SemanticService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Uses an existing limiter, e.g. one shared with another resolver.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<AmendmentResolver> {
        let config = self.config;
        config.validate()?;

        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(config.requests_per_second)));
        let guard = CallGuard::from_config(Arc::clone(&limiter), &config);
        let documents = self
            .documents
            .unwrap_or_else(|| Arc::new(InMemoryDocumentSource::new()));
        let service = self
            .service
            .map(|s| GuardedService::new(s, guard.clone()));

        let mut locator = ReferenceLocator::new(config.confidence_threshold);
        let mut linker = ReferenceObjectLinker::new();
        let mut relevance = RelevanceAssessor::new();
        let mut retrieval =
            ContentRetrievalStrategy::new(documents, guard).widen_window(config.widen_window);
        if let Some(service) = service {
            info!(service = service.name(), "semantic service attached");
            locator = locator
                .with_service(service.clone())
                .semantic_detection(config.semantic_detection);
            linker = linker.with_service(service.clone());
            relevance = relevance.with_service(service.clone());
            retrieval = retrieval.with_extractor(service);
        }

        let orchestrator = ResolutionOrchestrator::new(
            locator.clone(),
            linker.clone(),
            relevance,
            retrieval,
            &config,
        );
        Ok(AmendmentResolver {
            synthesizer: LegalStateSynthesizer::from_config(&config),
            config,
            locator,
            linker,
            orchestrator,
            limiter,
        })
    }
}

impl AmendmentResolver {
    pub fn builder() -> AmendmentResolverBuilder {
        AmendmentResolverBuilder::new()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

impl AmendmentResolver {
    /// Processes one fragment pair amending the article described by `context`.
    ///
    /// Never fails: per-reference problems are reported in the outcome and
    /// both legal states are always rendered.
    pub async fn process(&self, pair: &TextFragmentPair, context: &ArticleContext) -> AmendmentOutcome {
        let started = Instant::now();

        let located = self.locator.locate(pair).await;
        let linked = self
            .linker
            .link_all(&located.references, pair, context)
            .await;
        let mut resolution = self.orchestrator.resolve(linked, pair, context).await;
        resolution.stats.low_confidence = located.low_confidence.len();

        let synthesis = self.synthesizer.synthesize(&resolution, pair);

        info!(
            article = %context.article_id,
            located = resolution.stats.located,
            low_confidence = resolution.stats.low_confidence,
            resolved = resolution.stats.resolved,
            tree_nodes = resolution
                .resolved_deletional
                .iter()
                .chain(&resolution.resolved_definitional)
                .map(ResolvedReference::tree_size)
                .sum::<usize>(),
            unresolved = resolution.stats.unresolved,
            skipped = resolution.stats.skipped,
            annotated = synthesis.report.annotated,
            duration_ms = started.elapsed().as_millis() as u64,
            "processed amendment"
        );

        AmendmentOutcome {
            located,
            resolution,
            before: synthesis.before,
            after: synthesis.after,
            synthesis: synthesis.report,
        }
    }

    /// Processes independent fragment pairs on at most `max_workers`
    /// concurrent tasks. Results are returned in input order.
    pub async fn process_batch(
        self: &Arc<Self>,
        jobs: Vec<(TextFragmentPair, ArticleContext)>,
    ) -> Vec<Result<AmendmentOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut set = JoinSet::new();
        let total = jobs.len();

        for (idx, (pair, context)) in jobs.into_iter().enumerate() {
            let resolver = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => Ok(resolver.process(&pair, &context).await),
                    Err(e) => Err(NormRefError::Worker {
                        message: format!("worker pool closed: {}", e),
                    }),
                };
                (idx, outcome)
            });
        }

        let mut results: Vec<Option<Result<AmendmentOutcome>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => results[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "amendment worker failed"),
            }
        }

        results
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| {
                    Err(NormRefError::Worker {
                        message: "worker task did not complete".to_string(),
                    })
                })
            })
            .collect()
    }
}
