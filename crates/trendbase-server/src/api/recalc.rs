use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use trendbase_core::{RecalcRun, RecalcTrigger};
use trendbase_engine::ReconcileReport;

use crate::middleware::RequestId;

use super::{map_engine_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RecalcRunsQuery {
    pub limit: Option<i64>,
}

/// POST /api/v1/recalculate
pub(super) async fn recalculate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<RecalcRun>>, ApiError> {
    let run = state
        .engine
        .recalculate_all(RecalcTrigger::Api, Utc::now())
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(run, req_id.0)))
}

/// POST /api/v1/reconcile
pub(super) async fn reconcile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ReconcileReport>>, ApiError> {
    let report = state
        .engine
        .reconcile(RecalcTrigger::Api, Utc::now())
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(report, req_id.0)))
}

/// GET /api/v1/recalc-runs
pub(super) async fn list_recalc_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RecalcRunsQuery>,
) -> Result<Json<ApiResponse<Vec<RecalcRun>>>, ApiError> {
    let runs = state
        .engine
        .recent_recalc_runs(normalize_limit(query.limit))
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(runs, req_id.0)))
}
