//! Run context: process-wide state for one invocation.
//!
//! Created at run start and dropped at run end. Holds the artifact store,
//! the concurrency budgets, the provider rate limiters, and the cancellation
//! token. Nothing here is global; every component that needs shared state
//! receives it from the context.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use reelsmith_common::config::AppConfig;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_common::rate::TokenBucket;
use reelsmith_common::retry::RetryPolicy;
use reelsmith_story_model::{ArtifactStore, OutputLayout};

/// Per-provider request rate limiters shared by every item in the run.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub source: Arc<TokenBucket>,
    pub rewrite: Arc<TokenBucket>,
    pub tts: Arc<TokenBucket>,
}

impl RateLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            source: Arc::new(TokenBucket::per_second("source", p.source_rps)),
            rewrite: Arc::new(TokenBucket::per_second("rewrite", p.rewrite_rps)),
            tts: Arc::new(TokenBucket::per_second("tts", p.tts_rps)),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            source: Arc::new(TokenBucket::unlimited("source")),
            rewrite: Arc::new(TokenBucket::unlimited("rewrite")),
            tts: Arc::new(TokenBucket::unlimited("tts")),
        }
    }
}

pub struct RunContext {
    pub config: Arc<AppConfig>,
    pub store: ArtifactStore,
    pub retry: RetryPolicy,
    pub limits: RateLimits,
    pub cancel: CancellationToken,
    items: Arc<Semaphore>,
    network: Arc<Semaphore>,
    encode: Arc<Semaphore>,
}

impl RunContext {
    /// Open the output directory and sweep interrupted writes.
    pub fn new(config: AppConfig) -> ReelResult<Self> {
        let limits = RateLimits::from_config(&config);
        Self::with_limits(config, limits)
    }

    pub fn with_limits(config: AppConfig, limits: RateLimits) -> ReelResult<Self> {
        let store = ArtifactStore::open(OutputLayout::new(&config.pipeline.output_dir))
            .map_err(|e| ReelError::store(e.to_string()))?;
        let swept = store
            .sweep_partials()
            .map_err(|e| ReelError::store(e.to_string()))?;
        if swept > 0 {
            tracing::info!(swept, "Removed interrupted writes from a previous run");
        }

        let p = &config.pipeline;
        let ctx = Self {
            retry: RetryPolicy::from_config(p),
            items: Arc::new(Semaphore::new(p.max_concurrent_items.max(1))),
            network: Arc::new(Semaphore::new(p.network_concurrency.max(1))),
            encode: Arc::new(Semaphore::new(p.encode_concurrency.max(1))),
            store,
            limits,
            cancel: CancellationToken::new(),
            config: Arc::new(config),
        };
        tracing::info!(
            output_dir = %ctx.config.pipeline.output_dir.display(),
            max_items = ctx.config.pipeline.max_concurrent_items,
            network = ctx.config.pipeline.network_concurrency,
            encode = ctx.config.pipeline.encode_concurrency,
            "Run context ready"
        );
        Ok(ctx)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Slot for one in-flight item; `None` once the run is cancelled.
    pub async fn item_slot(&self) -> Option<OwnedSemaphorePermit> {
        acquire(&self.items, &self.cancel).await
    }

    /// Slot for one network-bound stage call.
    pub async fn network_slot(&self) -> Option<OwnedSemaphorePermit> {
        acquire(&self.network, &self.cancel).await
    }

    /// Slot for one encode.
    pub async fn encode_slot(&self) -> Option<OwnedSemaphorePermit> {
        acquire(&self.encode, &self.cancel).await
    }
}

async fn acquire(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
    }
}
