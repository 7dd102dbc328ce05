//! Entity resolution: exact canonical key first, then fuzzy name matching.
//!
//! Every attach, merge, and create is a read-merge-write checked against the
//! entity `version`. A conflicting concurrent write restarts the whole
//! resolution, up to the configured retry budget.

use std::cmp::Ordering;
use std::slice;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use trendbase_core::similarity::{brand_key, brands_match, leading_token};
use trendbase_core::{
    compose, CandidateFilter, Entity, EntityStatus, NameSimilarity, NewEntity, Observation,
    SignalSource,
};

use crate::{rescore, EngineError, TrendEngine};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionKind {
    Created,
    AttachedByKey,
    AttachedByName { similarity: f64 },
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub entity: Entity,
    pub kind: ResolutionKind,
    /// Entities sharing the observation's canonical key that were folded into
    /// the survivor along the way.
    pub merged_duplicates: usize,
}

impl TrendEngine {
    /// Attach `observation` to an existing entity or create a new one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Conflict`] once the retry budget is spent, or
    /// [`EngineError::PersistenceUnavailable`] when the store fails.
    pub async fn resolve(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, EngineError> {
        let mut attempt = 0_u32;
        loop {
            match self.resolve_once(observation, now).await {
                Err(EngineError::Conflict(entity_id))
                    if attempt < self.config.resolver_max_retries =>
                {
                    attempt += 1;
                    debug!(entity_id, attempt, "write conflict during resolution, retrying");
                }
                result => return result,
            }
        }
    }

    async fn resolve_once(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, EngineError> {
        if let Some(key) = observation.canonical_key.as_deref() {
            let holders = self.store.find_by_canonical_key(key).await?;
            if let Some((survivor, losers)) = split_survivor(holders) {
                let merged_duplicates = losers.len();
                let survivor = self.fold_duplicates(survivor, losers).await?;
                let entity = self.attach(survivor, observation, now).await?;
                return Ok(ResolveOutcome {
                    entity,
                    kind: ResolutionKind::AttachedByKey,
                    merged_duplicates,
                });
            }
        }

        match self.find_fuzzy_match(observation).await {
            Ok((candidate, similarity)) => {
                let entity = self.attach(candidate, observation, now).await?;
                Ok(ResolveOutcome {
                    entity,
                    kind: ResolutionKind::AttachedByName { similarity },
                    merged_duplicates: 0,
                })
            }
            Err(err @ EngineError::MergeAmbiguous { .. }) => {
                debug!(error = %err, "no fuzzy match, creating entity");
                let entity = self.create(observation, now).await?;
                info!(entity_id = entity.id, name = %entity.canonical_name, "created entity");
                Ok(ResolveOutcome {
                    entity,
                    kind: ResolutionKind::Created,
                    merged_duplicates: 0,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Best fuzzy candidate at or above the match threshold.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MergeAmbiguous`] when nothing qualifies.
    pub async fn find_fuzzy_match(
        &self,
        observation: &Observation,
    ) -> Result<(Entity, f64), EngineError> {
        let filter = CandidateFilter {
            leading_token: leading_token(&observation.name),
            brand_key: observation.brand.as_deref().and_then(brand_key),
            limit: self.config.candidate_limit,
        };

        let candidates = if filter.leading_token.is_none() && filter.brand_key.is_none() {
            Vec::new()
        } else {
            self.store.list_match_candidates(&filter).await?
        };

        let best = best_candidate(
            self.similarity.as_ref(),
            observation,
            candidates,
            self.config.match_brand_bonus,
        );

        match best {
            Some((entity, score)) if score >= self.config.match_threshold => Ok((entity, score)),
            other => Err(EngineError::MergeAmbiguous {
                name: observation.name.clone(),
                best_id: other.as_ref().map(|(e, _)| e.id),
                best_score: other.map_or(0.0, |(_, s)| s),
            }),
        }
    }

    /// Fold every loser into `survivor`, one merge at a time.
    pub(crate) async fn fold_duplicates(
        &self,
        mut survivor: Entity,
        losers: Vec<Entity>,
    ) -> Result<Entity, EngineError> {
        for loser in losers {
            let loser_id = loser.id;
            survivor = self.merge_pair(survivor, &loser).await?;
            info!(
                survivor_id = survivor.id,
                loser_id,
                canonical_key = survivor.canonical_key.as_deref().unwrap_or(""),
                "merged duplicate entity"
            );
        }
        Ok(survivor)
    }

    /// Merge `loser` into `survivor`: combine fields, recompose the score from
    /// the union of both signal sets, and persist atomically.
    pub(crate) async fn merge_pair(
        &self,
        survivor: Entity,
        loser: &Entity,
    ) -> Result<Entity, EngineError> {
        let survivor_signals = self.store.list_signals(survivor.id).await?;
        let loser_signals = self.store.list_signals(loser.id).await?;

        let mut merged = survivor;
        merge_fields(&mut merged, loser);
        rescore(
            &mut merged,
            survivor_signals
                .iter()
                .chain(&loser_signals)
                .map(|s| (s.source, s.magnitude)),
        );

        Ok(self.store.merge_entities(&merged, loser).await?)
    }

    async fn attach(
        &self,
        entity: Entity,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<Entity, EngineError> {
        let existing = self.store.list_signals(entity.id).await?;

        let mut entity = entity;
        attach_observation(&mut entity, observation, now);
        let incoming = (observation.signal.source, observation.signal.magnitude);
        rescore(
            &mut entity,
            existing
                .iter()
                .map(|s| (s.source, s.magnitude))
                .chain(std::iter::once(incoming)),
        );

        Ok(self
            .store
            .save_entity(&entity, slice::from_ref(&observation.signal))
            .await?)
    }

    async fn create(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<Entity, EngineError> {
        let signal = &observation.signal;
        let on_list = signal.source == SignalSource::Momentum;
        let breakdown = compose([(signal.source, signal.magnitude)], on_list);

        let new = NewEntity {
            canonical_name: observation.name.clone(),
            brand: observation.brand.clone(),
            category: observation.category.clone(),
            price: observation.price,
            canonical_key: observation.canonical_key.clone(),
            status: EntityStatus::Draft,
            base_score: breakdown.total(),
            early_signal: breakdown.early_signal(),
            first_detected_at: Some(signal.observed_at.min(now)),
            on_momentum_list: on_list,
            last_seen_on_momentum_list_at: on_list.then_some(signal.observed_at),
        };

        Ok(self
            .store
            .create_entity(&new, slice::from_ref(signal))
            .await?)
    }
}

/// Survivor priority for entities sharing a canonical key: published first,
/// then on the momentum list, then earliest created, then lowest id.
pub(crate) fn survivor_order(a: &Entity, b: &Entity) -> Ordering {
    let published = |e: &Entity| e.status == EntityStatus::Published;
    published(b)
        .cmp(&published(a))
        .then_with(|| b.on_momentum_list.cmp(&a.on_momentum_list))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Split a duplicate group into its survivor and the entities to merge away.
pub(crate) fn split_survivor(mut holders: Vec<Entity>) -> Option<(Entity, Vec<Entity>)> {
    if holders.is_empty() {
        return None;
    }
    holders.sort_by(survivor_order);
    let survivor = holders.remove(0);
    Some((survivor, holders))
}

/// Similarity of `candidate` to the observation, including the brand bonus.
///
/// `None` when both carry different canonical keys: those are distinct
/// listings and never fuzzy-match.
pub(crate) fn candidate_score(
    similarity: &dyn NameSimilarity,
    observation: &Observation,
    candidate: &Entity,
    brand_bonus: f64,
) -> Option<f64> {
    if let (Some(ours), Some(theirs)) = (&observation.canonical_key, &candidate.canonical_key) {
        if ours != theirs {
            return None;
        }
    }

    let mut score = similarity.score(&observation.name, &candidate.canonical_name);
    if brands_match(observation.brand.as_deref(), candidate.brand.as_deref()) {
        score += brand_bonus;
    }
    Some(score.min(1.0))
}

fn best_candidate(
    similarity: &dyn NameSimilarity,
    observation: &Observation,
    candidates: Vec<Entity>,
    brand_bonus: f64,
) -> Option<(Entity, f64)> {
    let mut best: Option<(Entity, f64)> = None;
    for candidate in candidates {
        let Some(score) = candidate_score(similarity, observation, &candidate, brand_bonus) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((current, current_score)) => {
                score > *current_score
                    || ((score - current_score).abs() < f64::EPSILON && candidate.id < current.id)
            }
        };
        if better {
            best = Some((candidate, score));
        }
    }
    best
}

/// Fold an observation's descriptive fields and momentum presence into an entity.
pub(crate) fn attach_observation(entity: &mut Entity, observation: &Observation, now: DateTime<Utc>) {
    if entity.brand.is_none() {
        entity.brand.clone_from(&observation.brand);
    }
    if entity.category.is_none() {
        entity.category.clone_from(&observation.category);
    }
    if entity.price.is_none() {
        entity.price = observation.price;
    }
    if entity.canonical_key.is_none() {
        entity.canonical_key.clone_from(&observation.canonical_key);
    }

    let observed_at = observation.signal.observed_at;
    entity.first_detected_at.get_or_insert(observed_at.min(now));

    if observation.signal.source == SignalSource::Momentum {
        entity.on_momentum_list = true;
        entity.last_seen_on_momentum_list_at = Some(
            entity
                .last_seen_on_momentum_list_at
                .map_or(observed_at, |previous| previous.max(observed_at)),
        );
    }
}

/// Combine the loser's fields into the survivor. Survivor values win where
/// both are present.
pub(crate) fn merge_fields(survivor: &mut Entity, loser: &Entity) {
    if survivor.brand.is_none() {
        survivor.brand.clone_from(&loser.brand);
    }
    if survivor.category.is_none() {
        survivor.category.clone_from(&loser.category);
    }
    if survivor.price.is_none() {
        survivor.price = loser.price;
    }
    if survivor.canonical_key.is_none() {
        survivor.canonical_key.clone_from(&loser.canonical_key);
    }
    if survivor.first_detected_at.is_none() {
        survivor.first_detected_at = loser.first_detected_at;
    }

    survivor.base_score = survivor.base_score.max(loser.base_score);
    survivor.on_momentum_list |= loser.on_momentum_list;
    survivor.last_seen_on_momentum_list_at = later(
        survivor.last_seen_on_momentum_list_at,
        loser.last_seen_on_momentum_list_at,
    );
    survivor.page_views = survivor.page_views.saturating_add(loser.page_views);
    survivor.clicks = survivor.clicks.saturating_add(loser.clicks);
    survivor.peak_score = survivor.peak_score.max(loser.peak_score);
}

fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
