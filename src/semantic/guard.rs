use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::errors::{NormRefError, Result};
use crate::limiter::RateLimiter;

use super::{SemanticRequest, SemanticService};

/// Applies the shared rate limiter, a per-call timeout and bounded retries to
/// an async operation.
///
/// Only retriable failures (see [`NormRefError::is_retriable`]) are re-issued;
/// the backoff grows linearly with the attempt number.
#[derive(Debug, Clone)]
pub struct CallGuard {
    limiter: Arc<RateLimiter>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl CallGuard {
    pub fn new(limiter: Arc<RateLimiter>, timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            limiter,
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Builds a guard from the timeout and retry settings of `config`.
    pub fn from_config(limiter: Arc<RateLimiter>, config: &ResolverConfig) -> Self {
        Self::new(
            limiter,
            config.call_timeout(),
            config.max_retries,
            config.retry_backoff(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `op`, retrying retriable failures.
    ///
    /// Every attempt, retries included, waits for a rate-limiter permit.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;

            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(NormRefError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retriable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(operation, attempt, error = %e, "retrying call");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A semantic service behind a [`CallGuard`], with schema validation of every
/// returned record.
#[derive(Clone)]
pub struct GuardedService {
    inner: Arc<dyn SemanticService>,
    guard: CallGuard,
}

impl GuardedService {
    pub fn new(inner: Arc<dyn SemanticService>, guard: CallGuard) -> Self {
        Self { inner, guard }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Issues `request` and returns a record that satisfies `request.schema`.
    ///
    /// Schema violations count as retriable failures.
    pub async fn request(&self, request: &SemanticRequest) -> Result<Value> {
        let inner = &self.inner;
        self.guard
            .run(request.task.as_str(), move || async move {
                let record = inner.call(request).await?;
                request.schema.validate(&record)?;
                Ok(record)
            })
            .await
    }
}

impl std::fmt::Debug for GuardedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedService")
            .field("inner", &self.inner.name())
            .field("guard", &self.guard)
            .finish()
    }
}
