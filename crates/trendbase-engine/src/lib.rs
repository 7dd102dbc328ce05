//! The trendbase service object.
//!
//! [`TrendEngine`] owns a handle to an [`EntityStore`], the name-similarity
//! strategy, and the homepage section cache. Binaries construct one at
//! startup and share it behind an `Arc`.

pub mod admin;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod recalc;
pub mod resolver;
pub mod sections;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use trendbase_core::{
    compose, recompute_base, AppConfig, Entity, EntityId, EntityStore, NameSimilarity,
    ScoreBreakdown, Signal, SignalSource, TokenSetSimilarity,
};

pub use admin::{MomentumSnapshotReport, ReconcileReport};
pub use error::EngineError;
pub use ingest::{IngestFailure, IngestReport, Rejection};
pub use memory::MemoryStore;
pub use resolver::{ResolutionKind, ResolveOutcome};

use sections::SectionCache;

const DEFAULT_CANDIDATE_LIMIT: i64 = 200;

/// Tunables for the engine, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub match_threshold: f64,
    pub match_brand_bonus: f64,
    pub resolver_max_retries: u32,
    /// Upper bound on fuzzy candidates loaded per observation.
    ///
    /// Stores return brand matches first, then the newest entities.
    pub candidate_limit: i64,
    pub recalc_concurrency: usize,
    pub section_cache_ttl: Duration,
    pub section_query_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            match_brand_bonus: 0.12,
            resolver_max_retries: 3,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            recalc_concurrency: 4,
            section_cache_ttl: Duration::from_secs(300),
            section_query_timeout: Duration::from_millis(2000),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            match_brand_bonus: config.match_brand_bonus,
            resolver_max_retries: config.resolver_max_retries,
            candidate_limit: config.match_candidate_limit.max(1),
            recalc_concurrency: config.recalc_concurrency.max(1),
            section_cache_ttl: Duration::from_secs(config.section_cache_ttl_secs),
            section_query_timeout: Duration::from_millis(config.section_query_timeout_ms),
        }
    }
}

/// An entity together with its live score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDetail {
    #[serde(flatten)]
    pub entity: Entity,
    pub dropped_off: bool,
    pub breakdown: ScoreBreakdown,
    pub signals: Vec<Signal>,
}

pub struct TrendEngine {
    store: Arc<dyn EntityStore>,
    similarity: Arc<dyn NameSimilarity>,
    config: EngineConfig,
    sections: SectionCache,
}

impl TrendEngine {
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        let sections = SectionCache::new(config.section_cache_ttl);
        Self {
            store,
            similarity: Arc::new(TokenSetSimilarity),
            config,
            sections,
        }
    }

    /// Replace the default token-set similarity strategy.
    #[must_use]
    pub fn with_similarity(mut self, similarity: Arc<dyn NameSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceUnavailable`] when the store does not answer.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.store.ping().await.map_err(EngineError::from)
    }

    /// Load an entity with its signals and current score breakdown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub async fn entity_detail(&self, id: EntityId) -> Result<EntityDetail, EngineError> {
        let entity = self.store.get_entity(id).await?;
        let signals = self.store.list_signals(id).await?;
        let breakdown = compose(
            signals.iter().map(|s| (s.source, s.magnitude)),
            entity.on_momentum_list,
        );
        Ok(EntityDetail {
            dropped_off: entity.dropped_off(),
            entity,
            breakdown,
            signals,
        })
    }
}

/// Recompose an entity's base score from the full signal set it owns.
///
/// Returns the breakdown; `entity.base_score` and `entity.early_signal` are
/// updated in place.
pub(crate) fn rescore<I>(entity: &mut Entity, signals: I) -> ScoreBreakdown
where
    I: IntoIterator<Item = (SignalSource, f64)>,
{
    let breakdown = compose(signals, entity.on_momentum_list);
    entity.base_score = recompute_base(entity.base_score, breakdown.total(), entity.dropped_off());
    entity.early_signal = breakdown.early_signal();
    breakdown
}
