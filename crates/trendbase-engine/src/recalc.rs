//! The batch age-decay pass over every tracked entity.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};
use trendbase_core::{DecayOutcome, Entity, RecalcRun, RecalcRunStatus, RecalcTotals, RecalcTrigger};

use crate::{EngineError, TrendEngine};

enum EntityOutcome {
    Updated,
    Unchanged,
    Failed,
}

impl TrendEngine {
    /// Recompute derived scores for every tracked entity and record the run.
    ///
    /// Per-entity failures are counted, never propagated. Entities whose
    /// derived fields would not change are not written, so a second pass with
    /// the same `now` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceUnavailable`] when the run record
    /// cannot be created or the tracked entities cannot be listed.
    pub async fn recalculate_all(
        &self,
        trigger: RecalcTrigger,
        now: DateTime<Utc>,
    ) -> Result<RecalcRun, EngineError> {
        let run = self.store.start_recalc_run(trigger, now).await?;

        let entities = match self.store.list_tracked_entities().await {
            Ok(entities) => entities,
            Err(err) => {
                let message = err.to_string();
                self.fail_run_best_effort(run.id, &message).await;
                return Err(err.into());
            }
        };

        let outcomes: Vec<EntityOutcome> = stream::iter(entities)
            .map(|entity| self.recalc_entity(entity, now))
            .buffer_unordered(self.config.recalc_concurrency.max(1))
            .collect()
            .await;

        let mut totals = RecalcTotals::default();
        for outcome in &outcomes {
            totals.processed += 1;
            match outcome {
                EntityOutcome::Updated => totals.updated += 1,
                EntityOutcome::Unchanged => totals.unchanged += 1,
                EntityOutcome::Failed => totals.failed += 1,
            }
        }

        let status = RecalcRunStatus::from_totals(&totals);
        let message = (status == RecalcRunStatus::Failed)
            .then(|| format!("all {} entities failed recalculation", totals.failed));
        let finished = self
            .store
            .finish_recalc_run(run.id, &totals, status, message.as_deref())
            .await?;

        if status != RecalcRunStatus::Failed {
            self.invalidate_sections().await;
        }

        info!(
            run_id = finished.id,
            trigger = trigger.as_str(),
            status = status.as_str(),
            processed = totals.processed,
            updated = totals.updated,
            unchanged = totals.unchanged,
            failed = totals.failed,
            "recalculation complete"
        );

        Ok(finished)
    }

    async fn recalc_entity(&self, entity: Entity, now: DateTime<Utc>) -> EntityOutcome {
        let Some(outcome) = DecayOutcome::evaluate(&entity, now) else {
            return EntityOutcome::Unchanged;
        };

        let mut entity = entity;
        if !outcome.apply_to(&mut entity) {
            return EntityOutcome::Unchanged;
        }

        match self.store.save_entity(&entity, &[]).await {
            Ok(_) => EntityOutcome::Updated,
            Err(err) => {
                warn!(entity_id = entity.id, error = %err, "failed to persist recalculated scores");
                EntityOutcome::Failed
            }
        }
    }

    /// Mark a run as failed, logging any secondary error.
    async fn fail_run_best_effort(&self, run_id: i64, message: &str) {
        if let Err(mark_err) = self
            .store
            .finish_recalc_run(
                run_id,
                &RecalcTotals::default(),
                RecalcRunStatus::Failed,
                Some(message),
            )
            .await
        {
            error!(run_id, error = %mark_err, "failed to mark recalc run as failed");
        }
    }

    /// Most recent recalculation runs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PersistenceUnavailable`] when the store fails.
    pub async fn recent_recalc_runs(&self, limit: i64) -> Result<Vec<RecalcRun>, EngineError> {
        Ok(self.store.list_recalc_runs(limit).await?)
    }
}
