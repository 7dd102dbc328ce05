//! Administrative mutations, the momentum snapshot, and reconciliation.
//!
//! None of these retry on a version conflict; the caller sees
//! [`EngineError::Conflict`] and may resubmit.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use trendbase_core::entity::normalize_canonical_key;
use trendbase_core::scoring::apply_drop_off;
use trendbase_core::{Entity, EntityId, EntityStatus, RecalcRun, RecalcTrigger, ValidationError};

use crate::resolver::split_survivor;
use crate::{rescore, EngineError, TrendEngine};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MomentumSnapshotReport {
    /// Entities that were on the momentum list before the snapshot.
    pub checked: usize,
    pub still_listed: usize,
    pub dropped: Vec<EntityId>,
    /// On-list entities without a canonical key cannot be matched against
    /// the snapshot and are left alone.
    pub skipped_without_key: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub duplicate_keys: usize,
    pub merged_duplicates: usize,
    pub merge_failed: usize,
    pub rescored: usize,
    pub rescore_failed: usize,
    pub recalc: RecalcRun,
}

enum RescoreOutcome {
    Changed,
    Unchanged,
    Failed,
}

impl TrendEngine {
    /// Mark an entity as present on, or absent from, the momentum list.
    ///
    /// Leaving the list applies the drop-off reduction to the base score.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub async fn set_momentum_presence(
        &self,
        id: EntityId,
        present: bool,
        now: DateTime<Utc>,
    ) -> Result<Entity, EngineError> {
        let entity = self.store.get_entity(id).await?;
        let updated = self.update_presence(entity, present, now).await?;
        self.invalidate_sections().await;
        Ok(updated)
    }

    async fn update_presence(
        &self,
        entity: Entity,
        present: bool,
        now: DateTime<Utc>,
    ) -> Result<Entity, EngineError> {
        let mut entity = entity;
        let before = entity.base_score;
        if !apply_presence(&mut entity, present, now) {
            return Ok(entity);
        }

        let signals = self.store.list_signals(entity.id).await?;
        rescore(&mut entity, signals.iter().map(|s| (s.source, s.magnitude)));
        let saved = self.store.save_entity(&entity, &[]).await?;

        info!(
            entity_id = saved.id,
            present,
            base_before = before,
            base_after = saved.base_score,
            "momentum presence changed"
        );
        Ok(saved)
    }

    /// Override an entity's base score.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a score outside `0..=100`.
    pub async fn set_base_score(&self, id: EntityId, score: i64) -> Result<Entity, EngineError> {
        let score = i16::try_from(score)
            .ok()
            .filter(|s| (0..=100).contains(s))
            .ok_or(ValidationError::ScoreOutOfRange(score))?;

        let mut entity = self.store.get_entity(id).await?;
        let before = entity.base_score;
        entity.base_score = score;
        let saved = self.store.save_entity(&entity, &[]).await?;
        self.invalidate_sections().await;

        info!(entity_id = id, before, after = score, "base score overridden");
        Ok(saved)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub async fn set_status(
        &self,
        id: EntityId,
        status: EntityStatus,
    ) -> Result<Entity, EngineError> {
        let mut entity = self.store.get_entity(id).await?;
        if entity.status == status {
            return Ok(entity);
        }
        let previous = entity.status;
        entity.status = status;
        let saved = self.store.save_entity(&entity, &[]).await?;
        self.invalidate_sections().await;

        info!(entity_id = id, from = %previous, to = %status, "status changed");
        Ok(saved)
    }

    /// Record whether generated content exists for the entity.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub async fn set_content_ready(
        &self,
        id: EntityId,
        ready: bool,
    ) -> Result<Entity, EngineError> {
        let mut entity = self.store.get_entity(id).await?;
        if entity.has_content == ready {
            return Ok(entity);
        }
        entity.has_content = ready;
        let saved = self.store.save_entity(&entity, &[]).await?;
        self.invalidate_sections().await;
        Ok(saved)
    }

    /// Add page views and clicks to an entity's traffic counters.
    ///
    /// The boost takes effect at the next recalculation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for negative deltas.
    pub async fn record_traffic(
        &self,
        id: EntityId,
        page_views: i64,
        clicks: i64,
    ) -> Result<Entity, EngineError> {
        if page_views < 0 || clicks < 0 {
            return Err(
                ValidationError::Invalid("traffic deltas must not be negative".to_string()).into(),
            );
        }

        let mut entity = self.store.get_entity(id).await?;
        entity.page_views = entity.page_views.saturating_add(page_views);
        entity.clicks = entity.clicks.saturating_add(clicks);
        Ok(self.store.save_entity(&entity, &[]).await?)
    }

    /// Merge `loser_id` into `winner_id`, moving every signal to the winner.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when both ids are the same, or
    /// [`EngineError::NotFound`] when either entity is missing.
    pub async fn merge_entities(
        &self,
        winner_id: EntityId,
        loser_id: EntityId,
    ) -> Result<Entity, EngineError> {
        if winner_id == loser_id {
            return Err(
                ValidationError::Invalid("cannot merge an entity into itself".to_string()).into(),
            );
        }

        let winner = self.store.get_entity(winner_id).await?;
        let loser = self.store.get_entity(loser_id).await?;
        let merged = self.merge_pair(winner, &loser).await?;
        self.invalidate_sections().await;

        info!(winner_id, loser_id, base_score = merged.base_score, "entities merged");
        Ok(merged)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub async fn delete_entity(&self, id: EntityId) -> Result<(), EngineError> {
        self.store.delete_entity(id).await?;
        self.invalidate_sections().await;
        info!(entity_id = id, "entity deleted");
        Ok(())
    }

    /// Apply the authoritative set of canonical keys currently on the
    /// momentum list. Every on-list entity whose key is absent drops off.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a snapshot without any usable
    /// key, or [`EngineError::PersistenceUnavailable`] when the on-list
    /// entities cannot be loaded.
    pub async fn apply_momentum_snapshot(
        &self,
        keys: &[String],
        now: DateTime<Utc>,
    ) -> Result<MomentumSnapshotReport, EngineError> {
        let listed: HashSet<String> = keys
            .iter()
            .filter_map(|k| normalize_canonical_key(Some(k)))
            .collect();
        if listed.is_empty() {
            return Err(ValidationError::Invalid(
                "momentum snapshot must contain at least one canonical key".to_string(),
            )
            .into());
        }

        let on_list = self.store.list_on_momentum_list().await?;
        let mut report = MomentumSnapshotReport::default();

        for entity in on_list {
            report.checked += 1;
            let still_listed = match entity.canonical_key.as_deref() {
                None => {
                    report.skipped_without_key += 1;
                    continue;
                }
                Some(key) => listed.contains(key),
            };
            if still_listed {
                report.still_listed += 1;
                continue;
            }

            let id = entity.id;
            match self.update_presence(entity, false, now).await {
                Ok(_) => report.dropped.push(id),
                Err(err) => {
                    warn!(entity_id = id, error = %err, "failed to apply drop-off");
                    report.failed += 1;
                }
            }
        }

        if !report.dropped.is_empty() {
            self.invalidate_sections().await;
        }

        info!(
            listed = listed.len(),
            checked = report.checked,
            dropped = report.dropped.len(),
            failed = report.failed,
            "momentum snapshot applied"
        );
        Ok(report)
    }

    /// Merge duplicate canonical keys, recompose every base score from its
    /// signals, then run the recalculation pass.
    ///
    /// Running it twice with the same `now` changes nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceUnavailable`] when the store cannot
    /// list duplicates or entities, or when the recalculation pass fails.
    pub async fn reconcile(
        &self,
        trigger: RecalcTrigger,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, EngineError> {
        let duplicate_keys = self.store.list_duplicate_canonical_keys().await?;
        let mut merged_duplicates = 0;
        let mut merge_failed = 0;

        for key in &duplicate_keys {
            let holders = self.store.find_by_canonical_key(key).await?;
            let Some((survivor, losers)) = split_survivor(holders) else {
                continue;
            };
            let count = losers.len();
            match self.fold_duplicates(survivor, losers).await {
                Ok(_) => merged_duplicates += count,
                Err(err) => {
                    warn!(canonical_key = %key, error = %err, "failed to merge duplicate key");
                    merge_failed += 1;
                }
            }
        }

        let ids = self.store.list_entity_ids().await?;
        let outcomes: Vec<RescoreOutcome> = stream::iter(ids)
            .map(|id| self.rescore_entity(id))
            .buffer_unordered(self.config.recalc_concurrency.max(1))
            .collect()
            .await;

        let mut rescored = 0;
        let mut rescore_failed = 0;
        for outcome in &outcomes {
            match outcome {
                RescoreOutcome::Changed => rescored += 1,
                RescoreOutcome::Unchanged => {}
                RescoreOutcome::Failed => rescore_failed += 1,
            }
        }

        let recalc = self.recalculate_all(trigger, now).await?;

        info!(
            duplicate_keys = duplicate_keys.len(),
            merged_duplicates,
            merge_failed,
            rescored,
            rescore_failed,
            run_id = recalc.id,
            "reconciliation complete"
        );

        Ok(ReconcileReport {
            duplicate_keys: duplicate_keys.len(),
            merged_duplicates,
            merge_failed,
            rescored,
            rescore_failed,
            recalc,
        })
    }

    async fn rescore_entity(&self, id: EntityId) -> RescoreOutcome {
        match self.try_rescore(id).await {
            Ok(true) => RescoreOutcome::Changed,
            Ok(false) => RescoreOutcome::Unchanged,
            Err(err) => {
                warn!(entity_id = id, error = %err, "failed to rescore entity");
                RescoreOutcome::Failed
            }
        }
    }

    async fn try_rescore(&self, id: EntityId) -> Result<bool, EngineError> {
        let mut entity = self.store.get_entity(id).await?;
        let signals = self.store.list_signals(id).await?;
        let before = (entity.base_score, entity.early_signal);
        rescore(&mut entity, signals.iter().map(|s| (s.source, s.magnitude)));
        if (entity.base_score, entity.early_signal) == before {
            return Ok(false);
        }
        self.store.save_entity(&entity, &[]).await?;
        Ok(true)
    }
}

/// Apply a momentum-list transition. Returns whether anything changed.
pub(crate) fn apply_presence(entity: &mut Entity, present: bool, now: DateTime<Utc>) -> bool {
    match (entity.on_momentum_list, present) {
        (false, true) => {
            entity.on_momentum_list = true;
            entity.last_seen_on_momentum_list_at = Some(
                entity
                    .last_seen_on_momentum_list_at
                    .map_or(now, |previous| previous.max(now)),
            );
            entity.first_detected_at.get_or_insert(now);
            true
        }
        (true, false) => {
            entity.base_score = apply_drop_off(entity.base_score);
            entity.on_momentum_list = false;
            entity.last_seen_on_momentum_list_at.get_or_insert(now);
            true
        }
        _ => false,
    }
}
