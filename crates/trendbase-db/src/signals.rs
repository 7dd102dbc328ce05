//! Database operations for `signals`.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use trendbase_core::{EntityId, NewSignal, Signal};

use crate::DbError;

/// A row from the `signals` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignalRow {
    pub id: i64,
    pub entity_id: i64,
    pub source: String,
    pub signal_type: String,
    pub magnitude: f64,
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = DbError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        let source = row.source.parse().map_err(|_| DbError::InvalidColumn {
            column: "signals.source",
            value: row.source.clone(),
        })?;

        Ok(Signal {
            id: row.id,
            entity_id: row.entity_id,
            source,
            signal_type: row.signal_type,
            magnitude: row.magnitude,
            metadata: row.metadata,
            observed_at: row.observed_at,
        })
    }
}

/// Returns all signals owned by an entity in observation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_signals(pool: &PgPool, entity_id: EntityId) -> Result<Vec<Signal>, DbError> {
    let rows = sqlx::query_as::<_, SignalRow>(
        "SELECT id, entity_id, source, signal_type, magnitude, metadata, observed_at \
         FROM signals \
         WHERE entity_id = $1 \
         ORDER BY observed_at, id",
    )
    .bind(entity_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Signal::try_from).collect()
}

/// Appends signals to an entity. Callers run this inside the transaction
/// that writes the owning entity.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn insert_signals(
    conn: &mut PgConnection,
    entity_id: EntityId,
    signals: &[NewSignal],
) -> Result<(), DbError> {
    for signal in signals {
        sqlx::query(
            "INSERT INTO signals (entity_id, source, signal_type, magnitude, metadata, observed_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entity_id)
        .bind(signal.source.as_str())
        .bind(&signal.signal_type)
        .bind(signal.magnitude)
        .bind(&signal.metadata)
        .bind(signal.observed_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Moves every signal owned by `from` onto `to`, returning how many moved.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reassign_signals(
    conn: &mut PgConnection,
    from: EntityId,
    to: EntityId,
) -> Result<u64, DbError> {
    let result = sqlx::query("UPDATE signals SET entity_id = $1 WHERE entity_id = $2")
        .bind(to)
        .bind(from)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendbase_core::SignalSource;

    #[test]
    fn search_trend_rows_decode() {
        let row = SignalRow {
            id: 1,
            entity_id: 2,
            source: "search_trend".to_string(),
            signal_type: "spike".to_string(),
            magnitude: 75.0,
            metadata: serde_json::json!({"region": "US"}),
            observed_at: Utc::now(),
        };
        let signal = Signal::try_from(row).expect("valid row");
        assert_eq!(signal.source, SignalSource::SearchTrend);
        assert_eq!(signal.metadata["region"], "US");
    }

    #[test]
    fn unknown_source_is_rejected() {
        let row = SignalRow {
            id: 1,
            entity_id: 2,
            source: "radio".to_string(),
            signal_type: "mention".to_string(),
            magnitude: 1.0,
            metadata: serde_json::json!({}),
            observed_at: Utc::now(),
        };
        assert!(matches!(
            Signal::try_from(row),
            Err(DbError::InvalidColumn { column: "signals.source", .. })
        ));
    }
}
