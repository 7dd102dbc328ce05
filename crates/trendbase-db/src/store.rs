//! [`EntityStore`] backed by Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use trendbase_core::{
    CandidateFilter, Entity, EntityId, EntityStore, NewEntity, NewSignal, RecalcRun,
    RecalcRunStatus, RecalcTotals, RecalcTrigger, Signal, StoreError,
};

use crate::{entities, recalc_runs, signals, DbError};

#[derive(Debug, Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn get_entity(&self, id: EntityId) -> Result<Entity, StoreError> {
        Ok(entities::get_entity(&self.pool, id).await?)
    }

    async fn find_by_canonical_key(&self, key: &str) -> Result<Vec<Entity>, StoreError> {
        Ok(entities::find_by_canonical_key(&self.pool, key).await?)
    }

    async fn list_match_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<Entity>, StoreError> {
        Ok(entities::list_match_candidates(&self.pool, filter).await?)
    }

    async fn list_tracked_entities(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(entities::list_tracked_entities(&self.pool).await?)
    }

    async fn list_section_candidates(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(entities::list_section_candidates(&self.pool).await?)
    }

    async fn list_entity_ids(&self) -> Result<Vec<EntityId>, StoreError> {
        Ok(entities::list_entity_ids(&self.pool).await?)
    }

    async fn list_duplicate_canonical_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(entities::list_duplicate_canonical_keys(&self.pool).await?)
    }

    async fn list_on_momentum_list(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(entities::list_on_momentum_list(&self.pool).await?)
    }

    async fn list_signals(&self, entity_id: EntityId) -> Result<Vec<Signal>, StoreError> {
        Ok(signals::list_signals(&self.pool, entity_id).await?)
    }

    async fn create_entity(
        &self,
        entity: &NewEntity,
        new_signals: &[NewSignal],
    ) -> Result<Entity, StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let created = entities::insert_entity(&mut tx, entity).await?;
        signals::insert_signals(&mut tx, created.id, new_signals).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(created)
    }

    async fn save_entity(
        &self,
        entity: &Entity,
        new_signals: &[NewSignal],
    ) -> Result<Entity, StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let saved = entities::update_entity(&mut tx, entity).await?;
        signals::insert_signals(&mut tx, saved.id, new_signals).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(saved)
    }

    async fn merge_entities(
        &self,
        survivor: &Entity,
        loser: &Entity,
    ) -> Result<Entity, StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let saved = entities::update_entity(&mut tx, survivor).await?;
        signals::reassign_signals(&mut tx, loser.id, survivor.id).await?;
        entities::delete_entity_at_version(&mut tx, loser.id, loser.version).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(saved)
    }

    async fn delete_entity(&self, id: EntityId) -> Result<(), StoreError> {
        Ok(entities::delete_entity(&self.pool, id).await?)
    }

    async fn start_recalc_run(
        &self,
        trigger: RecalcTrigger,
        started_at: DateTime<Utc>,
    ) -> Result<RecalcRun, StoreError> {
        Ok(recalc_runs::create_recalc_run(&self.pool, trigger, started_at).await?)
    }

    async fn finish_recalc_run(
        &self,
        id: i64,
        totals: &RecalcTotals,
        status: RecalcRunStatus,
        error_message: Option<&str>,
    ) -> Result<RecalcRun, StoreError> {
        Ok(recalc_runs::finish_recalc_run(&self.pool, id, totals, status, error_message).await?)
    }

    async fn list_recalc_runs(&self, limit: i64) -> Result<Vec<RecalcRun>, StoreError> {
        Ok(recalc_runs::list_recalc_runs(&self.pool, limit).await?)
    }
}
