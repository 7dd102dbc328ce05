//! Entity detail and administrative mutations.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use trendbase_core::{Entity, EntityId, EntityStatus};
use trendbase_engine::EntityDetail;

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, ApiResponse, AppState};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct MomentumRequest {
    pub present: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct BaseScoreRequest {
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusRequest {
    pub status: EntityStatus,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentRequest {
    pub ready: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrafficRequest {
    #[serde(default)]
    pub page_views: i64,
    #[serde(default)]
    pub clicks: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct MergeRequest {
    pub loser_id: EntityId,
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedEntity {
    pub id: EntityId,
    pub deleted: bool,
}

type EntityResult = Result<Json<ApiResponse<Entity>>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/entities/{id}
pub(super) async fn get_entity(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
) -> Result<Json<ApiResponse<EntityDetail>>, ApiError> {
    let detail = state
        .engine
        .entity_detail(id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(detail, req_id.0)))
}

/// PUT /api/v1/entities/{id}/momentum
pub(super) async fn set_momentum_presence(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
    Json(body): Json<MomentumRequest>,
) -> EntityResult {
    let entity = state
        .engine
        .set_momentum_presence(id, body.present, Utc::now())
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(entity, req_id.0)))
}

/// PUT /api/v1/entities/{id}/base-score
pub(super) async fn set_base_score(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
    Json(body): Json<BaseScoreRequest>,
) -> EntityResult {
    let entity = state
        .engine
        .set_base_score(id, body.score)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(entity, req_id.0)))
}

/// PUT /api/v1/entities/{id}/status
pub(super) async fn set_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
    Json(body): Json<StatusRequest>,
) -> EntityResult {
    let entity = state
        .engine
        .set_status(id, body.status)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(entity, req_id.0)))
}

/// PUT /api/v1/entities/{id}/content
pub(super) async fn set_content_ready(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
    Json(body): Json<ContentRequest>,
) -> EntityResult {
    let entity = state
        .engine
        .set_content_ready(id, body.ready)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(entity, req_id.0)))
}

/// POST /api/v1/entities/{id}/traffic
pub(super) async fn record_traffic(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
    Json(body): Json<TrafficRequest>,
) -> EntityResult {
    let entity = state
        .engine
        .record_traffic(id, body.page_views, body.clicks)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(entity, req_id.0)))
}

/// POST /api/v1/entities/{id}/merge: fold `loser_id` into the path entity.
pub(super) async fn merge_entity(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
    Json(body): Json<MergeRequest>,
) -> EntityResult {
    let entity = state
        .engine
        .merge_entities(id, body.loser_id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(entity, req_id.0)))
}

/// DELETE /api/v1/entities/{id}
pub(super) async fn delete_entity(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<EntityId>,
) -> Result<Json<ApiResponse<DeletedEntity>>, ApiError> {
    state
        .engine
        .delete_entity(id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(DeletedEntity { id, deleted: true }, req_id.0)))
}
