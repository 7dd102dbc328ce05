//! Database operations for `recalc_runs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use trendbase_core::{RecalcRun, RecalcRunStatus, RecalcTotals, RecalcTrigger};

use crate::DbError;

const RUN_COLUMNS: &str = "id, trigger_source, status, started_at, completed_at, \
     processed, updated, unchanged, failed, error_message";

/// A row from the `recalc_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecalcRunRow {
    pub id: i64,
    pub trigger_source: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed: i32,
    pub updated: i32,
    pub unchanged: i32,
    pub failed: i32,
    pub error_message: Option<String>,
}

impl TryFrom<RecalcRunRow> for RecalcRun {
    type Error = DbError;

    fn try_from(row: RecalcRunRow) -> Result<Self, Self::Error> {
        let trigger: RecalcTrigger =
            row.trigger_source
                .parse()
                .map_err(|_| DbError::InvalidColumn {
                    column: "recalc_runs.trigger_source",
                    value: row.trigger_source.clone(),
                })?;
        let status: RecalcRunStatus = row.status.parse().map_err(|_| DbError::InvalidColumn {
            column: "recalc_runs.status",
            value: row.status.clone(),
        })?;

        Ok(RecalcRun {
            id: row.id,
            trigger,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            totals: RecalcTotals {
                processed: row.processed,
                updated: row.updated,
                unchanged: row.unchanged,
                failed: row.failed,
            },
            error_message: row.error_message,
        })
    }
}

/// Creates a run in `running` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_recalc_run(
    pool: &PgPool,
    trigger: RecalcTrigger,
    started_at: DateTime<Utc>,
) -> Result<RecalcRun, DbError> {
    let sql = format!(
        "INSERT INTO recalc_runs (trigger_source, status, started_at) \
         VALUES ($1, 'running', $2) \
         RETURNING {RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, RecalcRunRow>(&sql)
        .bind(trigger.as_str())
        .bind(started_at)
        .fetch_one(pool)
        .await?;

    RecalcRun::try_from(row)
}

/// Records the totals and final status of a `running` run, setting
/// `completed_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::RunNotFound`] if the run does not exist or is no
/// longer running, or [`DbError::Sqlx`] if the update fails.
pub async fn finish_recalc_run(
    pool: &PgPool,
    id: i64,
    totals: &RecalcTotals,
    status: RecalcRunStatus,
    error_message: Option<&str>,
) -> Result<RecalcRun, DbError> {
    let sql = format!(
        "UPDATE recalc_runs \
         SET status = $2, completed_at = NOW(), processed = $3, updated = $4, \
             unchanged = $5, failed = $6, error_message = $7 \
         WHERE id = $1 AND status = 'running' \
         RETURNING {RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, RecalcRunRow>(&sql)
        .bind(id)
        .bind(status.as_str())
        .bind(totals.processed)
        .bind(totals.updated)
        .bind(totals.unchanged)
        .bind(totals.failed)
        .bind(error_message)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::RunNotFound(id))?;

    RecalcRun::try_from(row)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recalc_runs(pool: &PgPool, limit: i64) -> Result<Vec<RecalcRun>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM recalc_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, RecalcRunRow>(&sql)
        .bind(limit.max(0))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(RecalcRun::try_from).collect()
}
