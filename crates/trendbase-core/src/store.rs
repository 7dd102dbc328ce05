//! The persistence seam between the engine and a concrete store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{Entity, EntityId, NewEntity, NewSignal, Signal, ValidationError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity {0} not found")]
    NotFound(EntityId),

    /// The write carried a stale `version`.
    #[error("entity {0} was modified concurrently")]
    Conflict(EntityId),

    #[error("recalc run {0} not found")]
    RunNotFound(i64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Prefilter for fuzzy-match candidates: entities whose name starts with the
/// same normalized token, or whose normalized brand is identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    pub leading_token: Option<String>,
    pub brand_key: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecalcTrigger {
    Cron,
    Cli,
    Api,
}

impl RecalcTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecalcTrigger::Cron => "cron",
            RecalcTrigger::Cli => "cli",
            RecalcTrigger::Api => "api",
        }
    }
}

impl FromStr for RecalcTrigger {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(RecalcTrigger::Cron),
            "cli" => Ok(RecalcTrigger::Cli),
            "api" => Ok(RecalcTrigger::Api),
            other => Err(ValidationError::Invalid(format!(
                "unknown recalc trigger '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecalcRunStatus {
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl RecalcRunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecalcRunStatus::Running => "running",
            RecalcRunStatus::Succeeded => "succeeded",
            RecalcRunStatus::Partial => "partial",
            RecalcRunStatus::Failed => "failed",
        }
    }

    /// Final status for a completed pass.
    #[must_use]
    pub fn from_totals(totals: &RecalcTotals) -> Self {
        if totals.failed == 0 {
            RecalcRunStatus::Succeeded
        } else if totals.failed >= totals.processed {
            RecalcRunStatus::Failed
        } else {
            RecalcRunStatus::Partial
        }
    }
}

impl FromStr for RecalcRunStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RecalcRunStatus::Running),
            "succeeded" => Ok(RecalcRunStatus::Succeeded),
            "partial" => Ok(RecalcRunStatus::Partial),
            "failed" => Ok(RecalcRunStatus::Failed),
            other => Err(ValidationError::Invalid(format!(
                "unknown recalc run status '{other}'"
            ))),
        }
    }
}

/// Aggregate counts for one recalculation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcTotals {
    pub processed: i32,
    pub updated: i32,
    pub unchanged: i32,
    pub failed: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcRun {
    pub id: i64,
    pub trigger: RecalcTrigger,
    pub status: RecalcRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub totals: RecalcTotals,
    pub error_message: Option<String>,
}

/// Storage for entities, their signals, and recalculation run records.
///
/// Every entity write is checked against the `version` the caller read; a
/// mismatch fails with [`StoreError::Conflict`] and writes nothing.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_entity(&self, id: EntityId) -> Result<Entity, StoreError>;

    /// All entities carrying exactly `key`, oldest first.
    async fn find_by_canonical_key(&self, key: &str) -> Result<Vec<Entity>, StoreError>;

    async fn list_match_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<Entity>, StoreError>;

    /// Entities with a known `first_detected_at`.
    async fn list_tracked_entities(&self) -> Result<Vec<Entity>, StoreError>;

    /// Published entities with generated content.
    async fn list_section_candidates(&self) -> Result<Vec<Entity>, StoreError>;

    async fn list_entity_ids(&self) -> Result<Vec<EntityId>, StoreError>;

    /// Canonical keys held by more than one entity.
    async fn list_duplicate_canonical_keys(&self) -> Result<Vec<String>, StoreError>;

    async fn list_on_momentum_list(&self) -> Result<Vec<Entity>, StoreError>;

    async fn list_signals(&self, entity_id: EntityId) -> Result<Vec<Signal>, StoreError>;

    /// Insert an entity together with its first signals.
    async fn create_entity(
        &self,
        entity: &NewEntity,
        signals: &[NewSignal],
    ) -> Result<Entity, StoreError>;

    /// Persist `entity` and append `signals` to it in one atomic write.
    ///
    /// Returns the stored row with its bumped `version`.
    async fn save_entity(&self, entity: &Entity, signals: &[NewSignal])
        -> Result<Entity, StoreError>;

    /// Atomically persist the merged `survivor`, move every signal owned by
    /// `loser` onto it, and delete the loser. Both versions are checked.
    async fn merge_entities(&self, survivor: &Entity, loser: &Entity)
        -> Result<Entity, StoreError>;

    /// Delete an entity and its signals.
    async fn delete_entity(&self, id: EntityId) -> Result<(), StoreError>;

    async fn start_recalc_run(
        &self,
        trigger: RecalcTrigger,
        started_at: DateTime<Utc>,
    ) -> Result<RecalcRun, StoreError>;

    async fn finish_recalc_run(
        &self,
        id: i64,
        totals: &RecalcTotals,
        status: RecalcRunStatus,
        error_message: Option<&str>,
    ) -> Result<RecalcRun, StoreError>;

    /// Most recent runs first.
    async fn list_recalc_runs(&self, limit: i64) -> Result<Vec<RecalcRun>, StoreError>;
}
