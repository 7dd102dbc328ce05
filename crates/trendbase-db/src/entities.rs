//! Database operations for the `entities` table.
//!
//! Writes to an existing row are guarded by its `version` column: the update
//! only applies when the caller's version matches, and bumps it by one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool};
use trendbase_core::similarity::{brand_key, leading_token};
use trendbase_core::{CandidateFilter, Entity, EntityId, NewEntity};

use crate::DbError;

const ENTITY_COLUMNS: &str = "id, canonical_name, brand, category, price, canonical_key, \
     status, has_content, base_score, current_score, peak_score, days_trending, \
     should_show_on_homepage, early_signal, first_detected_at, last_updated_at, \
     on_momentum_list, last_seen_on_momentum_list_at, page_views, clicks, version, created_at";

/// A row from the `entities` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntityRow {
    pub id: i64,
    pub canonical_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub canonical_key: Option<String>,
    pub status: String,
    pub has_content: bool,
    pub base_score: i16,
    pub current_score: Option<i16>,
    pub peak_score: Option<i16>,
    pub days_trending: Option<i32>,
    pub should_show_on_homepage: bool,
    pub early_signal: bool,
    pub first_detected_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
    pub on_momentum_list: bool,
    pub last_seen_on_momentum_list_at: Option<DateTime<Utc>>,
    pub page_views: i64,
    pub clicks: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EntityRow> for Entity {
    type Error = DbError;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| DbError::InvalidColumn {
            column: "entities.status",
            value: row.status.clone(),
        })?;

        Ok(Entity {
            id: row.id,
            canonical_name: row.canonical_name,
            brand: row.brand,
            category: row.category,
            price: row.price,
            canonical_key: row.canonical_key,
            status,
            has_content: row.has_content,
            base_score: row.base_score,
            current_score: row.current_score,
            peak_score: row.peak_score,
            days_trending: row.days_trending,
            should_show_on_homepage: row.should_show_on_homepage,
            early_signal: row.early_signal,
            first_detected_at: row.first_detected_at,
            last_updated_at: row.last_updated_at,
            on_momentum_list: row.on_momentum_list,
            last_seen_on_momentum_list_at: row.last_seen_on_momentum_list_at,
            page_views: row.page_views,
            clicks: row.clicks,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

fn into_entities(rows: Vec<EntityRow>) -> Result<Vec<Entity>, DbError> {
    rows.into_iter().map(Entity::try_from).collect()
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single entity by `id`.
///
/// # Errors
///
/// Returns [`DbError::EntityNotFound`] if no row exists, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_entity<'e, E>(executor: E, id: EntityId) -> Result<Entity, DbError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1");
    let row = sqlx::query_as::<_, EntityRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(DbError::EntityNotFound(id))?;

    Entity::try_from(row)
}

/// Returns every entity carrying `key`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_canonical_key(pool: &PgPool, key: &str) -> Result<Vec<Entity>, DbError> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities \
         WHERE canonical_key = $1 \
         ORDER BY created_at, id"
    );
    let rows = sqlx::query_as::<_, EntityRow>(&sql)
        .bind(key)
        .fetch_all(pool)
        .await?;

    into_entities(rows)
}

/// Returns fuzzy-match candidates sharing the leading name token or the
/// normalized brand, capped at `filter.limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_match_candidates(
    pool: &PgPool,
    filter: &CandidateFilter,
) -> Result<Vec<Entity>, DbError> {
    if filter.leading_token.is_none() && filter.brand_key.is_none() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities \
         WHERE name_token = $1 OR brand_key = $2 \
         ORDER BY COALESCE(brand_key = $2, FALSE) DESC, id DESC \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, EntityRow>(&sql)
        .bind(filter.leading_token.as_deref())
        .bind(filter.brand_key.as_deref())
        .bind(filter.limit.max(0))
        .fetch_all(pool)
        .await?;

    into_entities(rows)
}

/// Entities with a known first detection time.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tracked_entities(pool: &PgPool) -> Result<Vec<Entity>, DbError> {
    list_where(pool, "first_detected_at IS NOT NULL").await
}

/// Published entities with generated content.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_section_candidates(pool: &PgPool) -> Result<Vec<Entity>, DbError> {
    list_where(pool, "status = 'published' AND has_content").await
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_on_momentum_list(pool: &PgPool) -> Result<Vec<Entity>, DbError> {
    list_where(pool, "on_momentum_list").await
}

async fn list_where(pool: &PgPool, predicate: &'static str) -> Result<Vec<Entity>, DbError> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE {predicate} ORDER BY id");
    let rows = sqlx::query_as::<_, EntityRow>(&sql)
        .fetch_all(pool)
        .await?;

    into_entities(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_entity_ids(pool: &PgPool) -> Result<Vec<EntityId>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM entities ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

/// Canonical keys held by more than one entity.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_duplicate_canonical_keys(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let keys = sqlx::query_scalar::<_, String>(
        "SELECT canonical_key FROM entities \
         WHERE canonical_key IS NOT NULL \
         GROUP BY canonical_key \
         HAVING COUNT(*) > 1 \
         ORDER BY canonical_key",
    )
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a new entity at version 1 and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_entity(conn: &mut PgConnection, entity: &NewEntity) -> Result<Entity, DbError> {
    let sql = format!(
        "INSERT INTO entities ( \
             canonical_name, name_token, brand, brand_key, category, price, canonical_key, \
             status, base_score, early_signal, first_detected_at, on_momentum_list, \
             last_seen_on_momentum_list_at \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {ENTITY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, EntityRow>(&sql)
        .bind(&entity.canonical_name)
        .bind(leading_token(&entity.canonical_name))
        .bind(entity.brand.as_deref())
        .bind(entity.brand.as_deref().and_then(brand_key))
        .bind(entity.category.as_deref())
        .bind(entity.price)
        .bind(entity.canonical_key.as_deref())
        .bind(entity.status.as_str())
        .bind(entity.base_score)
        .bind(entity.early_signal)
        .bind(entity.first_detected_at)
        .bind(entity.on_momentum_list)
        .bind(entity.last_seen_on_momentum_list_at)
        .fetch_one(conn)
        .await?;

    Entity::try_from(row)
}

/// Writes every mutable column of `entity` if its version still matches.
///
/// Returns the stored row with the bumped version.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] when the stored version differs,
/// [`DbError::EntityNotFound`] when the row is gone, or [`DbError::Sqlx`] if
/// the update fails.
pub async fn update_entity(conn: &mut PgConnection, entity: &Entity) -> Result<Entity, DbError> {
    let sql = format!(
        "UPDATE entities SET \
             canonical_name = $3, name_token = $4, brand = $5, brand_key = $6, \
             category = $7, price = $8, canonical_key = $9, status = $10, \
             has_content = $11, base_score = $12, current_score = $13, peak_score = $14, \
             days_trending = $15, should_show_on_homepage = $16, early_signal = $17, \
             first_detected_at = $18, on_momentum_list = $19, \
             last_seen_on_momentum_list_at = $20, page_views = $21, clicks = $22, \
             version = version + 1, last_updated_at = NOW() \
         WHERE id = $1 AND version = $2 \
         RETURNING {ENTITY_COLUMNS}"
    );
    let row = sqlx::query_as::<_, EntityRow>(&sql)
        .bind(entity.id)
        .bind(entity.version)
        .bind(&entity.canonical_name)
        .bind(leading_token(&entity.canonical_name))
        .bind(entity.brand.as_deref())
        .bind(entity.brand.as_deref().and_then(brand_key))
        .bind(entity.category.as_deref())
        .bind(entity.price)
        .bind(entity.canonical_key.as_deref())
        .bind(entity.status.as_str())
        .bind(entity.has_content)
        .bind(entity.base_score)
        .bind(entity.current_score)
        .bind(entity.peak_score)
        .bind(entity.days_trending)
        .bind(entity.should_show_on_homepage)
        .bind(entity.early_signal)
        .bind(entity.first_detected_at)
        .bind(entity.on_momentum_list)
        .bind(entity.last_seen_on_momentum_list_at)
        .bind(entity.page_views)
        .bind(entity.clicks)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Entity::try_from(row),
        None => Err(stale_or_missing(conn, entity.id).await),
    }
}

/// Deletes `id` only if it is still at `version`.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] when the stored version differs,
/// [`DbError::EntityNotFound`] when the row is gone, or [`DbError::Sqlx`] if
/// the delete fails.
pub async fn delete_entity_at_version(
    conn: &mut PgConnection,
    id: EntityId,
    version: i64,
) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM entities WHERE id = $1 AND version = $2")
        .bind(id)
        .bind(version)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(stale_or_missing(conn, id).await);
    }
    Ok(())
}

/// Deletes an entity; its signals go with it through the foreign key.
///
/// # Errors
///
/// Returns [`DbError::EntityNotFound`] if no row exists, or [`DbError::Sqlx`]
/// if the delete fails.
pub async fn delete_entity(pool: &PgPool, id: EntityId) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM entities WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::EntityNotFound(id));
    }
    Ok(())
}

/// Classify a versioned write that touched no row.
async fn stale_or_missing(conn: &mut PgConnection, id: EntityId) -> DbError {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM entities WHERE id = $1)")
            .bind(id)
            .fetch_one(conn)
            .await;

    match exists {
        Ok(true) => DbError::Conflict(id),
        Ok(false) => DbError::EntityNotFound(id),
        Err(err) => DbError::Sqlx(err),
    }
}
