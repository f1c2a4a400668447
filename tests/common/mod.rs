#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use normref::config::ResolverConfig;
use normref::errors::Result;
use normref::limiter::RateLimiter;
use normref::semantic::{CallGuard, GuardedService, SemanticRequest, SemanticService, SemanticTask};
use normref::types::{ArticleContext, LinkedReference, LocatedReference, SourceTag, generate_reference_id};
use serde_json::Value;

/// Article L. 254-1 of the code rural et de la pêche maritime, before amendment.
pub const ARTICLE_BEFORE: &str = "\
I. - Est subordonné à la détention d'un agrément l'exercice des activités suivantes.
II. - Les activités mentionnées au I sont :
1° La mise en vente, la vente ou la distribution à titre gratuit des produits phytopharmaceutiques ;
2° L'application en qualité de prestataire de services des produits phytopharmaceutiques ;
3° Le conseil à l'utilisation des produits phytopharmaceutiques.
III. - L'agrément est délivré par l'autorité administrative.
IV. - Le conseil stratégique est délivré par écrit.
";

/// The same article after amendment.
pub const ARTICLE_AFTER: &str = "\
I. - Est subordonné à la détention d'un agrément l'exercice des activités suivantes.
II. - Les activités mentionnées au I sont :
1° La mise en vente ou la vente des produits phytopharmaceutiques ;
2° L'application des produits phytopharmaceutiques ;
III. - L'exercice de l'activité de conseil est incompatible avec celui des activités mentionnées aux 1° ou 2° du II, sauf pour les produits de biocontrôle.
";

pub const CODE: &str = "code rural et de la pêche maritime";
pub const REGULATION: &str = "règlement (CE) n° 1107/2009";

/// Article 47 of regulation 1107/2009, served as a direct sub-unit.
pub const REGULATION_ARTICLE_47: &str = "\
Article 47
Mise sur le marché de produits phytopharmaceutiques à faible risque
1. Lorsque toutes les substances actives contenues dans un produit phytopharmaceutique sont des substances actives à faible risque, ce produit est autorisé en tant que produit phytopharmaceutique à faible risque.
";

pub fn article_context() -> ArticleContext {
    ArticleContext {
        article_id: "L. 254-1".to_string(),
        code_id: Some(CODE.to_string()),
        before_text: ARTICLE_BEFORE.to_string(),
        after_text: ARTICLE_AFTER.to_string(),
    }
}

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_logging() {
    normref::logging::init_tracing("normref=debug");
}

/// Defaults, without rate limiting delays worth waiting for.
pub fn fast_config() -> ResolverConfig {
    ResolverConfig {
        requests_per_second: 10_000.0,
        retry_backoff_ms: 1,
        ..ResolverConfig::default()
    }
}

pub fn unlimited_guard(max_retries: u32) -> CallGuard {
    CallGuard::new(
        Arc::new(RateLimiter::unlimited()),
        Duration::from_secs(10),
        max_retries,
        Duration::from_millis(1),
    )
}

pub fn guarded(service: Arc<dyn SemanticService>, max_retries: u32) -> GuardedService {
    GuardedService::new(service, unlimited_guard(max_retries))
}

/// A located reference found verbatim in `fragment`.
pub fn located_in(fragment: &str, reference: &str, tag: SourceTag, confidence: f64) -> LocatedReference {
    let start = fragment.find(reference).expect("reference present in fragment");
    LocatedReference {
        id: generate_reference_id("", tag, start, reference),
        reference_text: reference.to_string(),
        start_offset: start,
        end_offset: start + reference.len(),
        source_tag: tag,
        confidence,
        parent_reference: None,
    }
}

pub fn linked(located: LocatedReference, object: &str) -> LinkedReference {
    LinkedReference {
        resolution_question: format!("What does \"{}\" contain?", located.reference_text),
        located,
        object: object.to_string(),
        agreement_rationale: "test".to_string(),
        confidence: 0.9,
    }
}

type Handler = dyn Fn(&SemanticRequest) -> Result<Value> + Send + Sync;

/// In-process semantic service answering from a closure and recording every call.
pub struct ScriptedService {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: Mutex<Vec<SemanticRequest>>,
}

impl ScriptedService {
    pub fn new(handler: impl Fn(&SemanticRequest) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<SemanticRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, task: SemanticTask) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.task == task).count()
    }
}

#[async_trait]
impl SemanticService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, request: &SemanticRequest) -> Result<Value> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request)
    }
}
