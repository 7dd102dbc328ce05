//! An in-process [`EntityStore`] used by tests and local tooling.
//!
//! Behaves like the Postgres store, including version checks, and can be
//! told to fail or slow down to exercise degraded paths.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trendbase_core::similarity::{brand_key, leading_token};
use trendbase_core::{
    CandidateFilter, Entity, EntityId, EntityStatus, EntityStore, NewEntity, NewSignal,
    RecalcRun, RecalcRunStatus, RecalcTotals, RecalcTrigger, Signal, StoreError,
};

#[derive(Default)]
struct Inner {
    entities: BTreeMap<EntityId, Entity>,
    signals: BTreeMap<i64, Signal>,
    runs: Vec<RecalcRun>,
    next_entity_id: EntityId,
    next_signal_id: i64,
    next_run_id: i64,
    unavailable: bool,
    pending_conflicts: u32,
    latency: Option<Duration>,
}

impl Inner {
    fn append_signals(&mut self, entity_id: EntityId, signals: &[NewSignal]) {
        for signal in signals {
            self.next_signal_id += 1;
            let id = self.next_signal_id;
            self.signals.insert(
                id,
                Signal {
                    id,
                    entity_id,
                    source: signal.source,
                    signal_type: signal.signal_type.clone(),
                    magnitude: signal.magnitude,
                    metadata: signal.metadata.clone(),
                    observed_at: signal.observed_at,
                },
            );
        }
    }

    fn check_version(&mut self, entity: &Entity) -> Result<&Entity, StoreError> {
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(StoreError::Conflict(entity.id));
        }
        let stored = self
            .entities
            .get(&entity.id)
            .ok_or(StoreError::NotFound(entity.id))?;
        if stored.version != entity.version {
            return Err(StoreError::Conflict(entity.id));
        }
        Ok(stored)
    }

    fn write(&mut self, entity: &Entity) -> Result<Entity, StoreError> {
        let created_at = self.check_version(entity)?.created_at;
        let mut stored = entity.clone();
        stored.version += 1;
        stored.created_at = created_at;
        stored.last_updated_at = Utc::now();
        self.entities.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn filtered<F>(&self, keep: F) -> Vec<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.entities.values().filter(|e| keep(*e)).cloned().collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Fail the next `count` versioned writes with [`StoreError::Conflict`].
    pub fn inject_conflicts(&self, count: u32) {
        self.lock().pending_conflicts = count;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply configured latency and availability before touching state.
    async fn enter(&self) -> Result<(), StoreError> {
        let (latency, unavailable) = {
            let inner = self.lock();
            (inner.latency, inner.unavailable)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if unavailable {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await
    }

    async fn get_entity(&self, id: EntityId) -> Result<Entity, StoreError> {
        self.enter().await?;
        self.lock()
            .entities
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find_by_canonical_key(&self, key: &str) -> Result<Vec<Entity>, StoreError> {
        self.enter().await?;
        let mut holders = self
            .lock()
            .filtered(|e| e.canonical_key.as_deref() == Some(key));
        holders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(holders)
    }

    async fn list_match_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<Entity>, StoreError> {
        self.enter().await?;
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        let brand_hit = |e: &Entity| {
            filter.brand_key.is_some() && e.brand.as_deref().and_then(brand_key) == filter.brand_key
        };
        let mut candidates = self.lock().filtered(|e| {
            let token_hit = filter.leading_token.is_some()
                && leading_token(&e.canonical_name) == filter.leading_token;
            token_hit || brand_hit(e)
        });
        candidates.sort_by_key(|e| (std::cmp::Reverse(brand_hit(e)), std::cmp::Reverse(e.id)));
        Ok(candidates.into_iter().take(limit).collect())
    }

    async fn list_tracked_entities(&self) -> Result<Vec<Entity>, StoreError> {
        self.enter().await?;
        Ok(self.lock().filtered(Entity::is_tracked))
    }

    async fn list_section_candidates(&self) -> Result<Vec<Entity>, StoreError> {
        self.enter().await?;
        Ok(self
            .lock()
            .filtered(|e| e.status == EntityStatus::Published && e.has_content))
    }

    async fn list_entity_ids(&self) -> Result<Vec<EntityId>, StoreError> {
        self.enter().await?;
        Ok(self.lock().entities.keys().copied().collect())
    }

    async fn list_duplicate_canonical_keys(&self) -> Result<Vec<String>, StoreError> {
        self.enter().await?;
        let inner = self.lock();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for key in inner.entities.values().filter_map(|e| e.canonical_key.as_deref()) {
            *counts.entry(key).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(key, _)| key.to_string())
            .collect())
    }

    async fn list_on_momentum_list(&self) -> Result<Vec<Entity>, StoreError> {
        self.enter().await?;
        Ok(self.lock().filtered(|e| e.on_momentum_list))
    }

    async fn list_signals(&self, entity_id: EntityId) -> Result<Vec<Signal>, StoreError> {
        self.enter().await?;
        let mut signals: Vec<Signal> = self
            .lock()
            .signals
            .values()
            .filter(|s| s.entity_id == entity_id)
            .cloned()
            .collect();
        signals.sort_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.id.cmp(&b.id)));
        Ok(signals)
    }

    async fn create_entity(
        &self,
        entity: &NewEntity,
        signals: &[NewSignal],
    ) -> Result<Entity, StoreError> {
        self.enter().await?;
        let mut inner = self.lock();
        inner.next_entity_id += 1;
        let id = inner.next_entity_id;
        let now = Utc::now();
        let created = Entity {
            id,
            canonical_name: entity.canonical_name.clone(),
            brand: entity.brand.clone(),
            category: entity.category.clone(),
            price: entity.price,
            canonical_key: entity.canonical_key.clone(),
            status: entity.status,
            has_content: false,
            base_score: entity.base_score,
            current_score: None,
            peak_score: None,
            days_trending: None,
            should_show_on_homepage: false,
            early_signal: entity.early_signal,
            first_detected_at: entity.first_detected_at,
            last_updated_at: now,
            on_momentum_list: entity.on_momentum_list,
            last_seen_on_momentum_list_at: entity.last_seen_on_momentum_list_at,
            page_views: 0,
            clicks: 0,
            created_at: now,
            version: 1,
        };
        inner.entities.insert(id, created.clone());
        inner.append_signals(id, signals);
        Ok(created)
    }

    async fn save_entity(
        &self,
        entity: &Entity,
        signals: &[NewSignal],
    ) -> Result<Entity, StoreError> {
        self.enter().await?;
        let mut inner = self.lock();
        let stored = inner.write(entity)?;
        inner.append_signals(stored.id, signals);
        Ok(stored)
    }

    async fn merge_entities(
        &self,
        survivor: &Entity,
        loser: &Entity,
    ) -> Result<Entity, StoreError> {
        self.enter().await?;
        let mut inner = self.lock();
        inner.check_version(loser)?;
        let stored = inner.write(survivor)?;
        for signal in inner.signals.values_mut() {
            if signal.entity_id == loser.id {
                signal.entity_id = stored.id;
            }
        }
        inner.entities.remove(&loser.id);
        Ok(stored)
    }

    async fn delete_entity(&self, id: EntityId) -> Result<(), StoreError> {
        self.enter().await?;
        let mut inner = self.lock();
        if inner.entities.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        inner.signals.retain(|_, s| s.entity_id != id);
        Ok(())
    }

    async fn start_recalc_run(
        &self,
        trigger: RecalcTrigger,
        started_at: DateTime<Utc>,
    ) -> Result<RecalcRun, StoreError> {
        self.enter().await?;
        let mut inner = self.lock();
        inner.next_run_id += 1;
        let run = RecalcRun {
            id: inner.next_run_id,
            trigger,
            status: RecalcRunStatus::Running,
            started_at,
            completed_at: None,
            totals: RecalcTotals::default(),
            error_message: None,
        };
        inner.runs.push(run.clone());
        Ok(run)
    }

    async fn finish_recalc_run(
        &self,
        id: i64,
        totals: &RecalcTotals,
        status: RecalcRunStatus,
        error_message: Option<&str>,
    ) -> Result<RecalcRun, StoreError> {
        self.enter().await?;
        let mut inner = self.lock();
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == id && r.status == RecalcRunStatus::Running)
            .ok_or(StoreError::RunNotFound(id))?;
        run.status = status;
        run.totals = *totals;
        run.completed_at = Some(Utc::now());
        run.error_message = error_message.map(ToOwned::to_owned);
        Ok(run.clone())
    }

    async fn list_recalc_runs(&self, limit: i64) -> Result<Vec<RecalcRun>, StoreError> {
        self.enter().await?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.lock().runs.iter().rev().take(limit).cloned().collect())
    }
}
