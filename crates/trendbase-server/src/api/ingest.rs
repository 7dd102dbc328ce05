//! Write paths fed by collectors: raw signal batches and momentum snapshots.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use trendbase_engine::{IngestReport, MomentumSnapshotReport};

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, ApiResponse, AppState};

const MAX_BATCH_SIZE: usize = 5_000;

#[derive(Debug, Deserialize)]
pub(super) struct MomentumSnapshotRequest {
    pub canonical_keys: Vec<String>,
}

/// POST /api/v1/signals: ingest a batch of raw signal records.
///
/// Malformed records are reported per index; the rest of the batch proceeds.
pub(super) async fn ingest_signals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(records): Json<Vec<serde_json::Value>>,
) -> Result<Json<ApiResponse<IngestReport>>, ApiError> {
    if records.len() > MAX_BATCH_SIZE {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!(
                "batch of {} records exceeds the limit of {MAX_BATCH_SIZE}",
                records.len()
            ),
        ));
    }

    let report = state.engine.ingest(records, Utc::now()).await;
    Ok(Json(ApiResponse::new(report, req_id.0)))
}

/// POST /api/v1/momentum/snapshot: apply the current momentum-list key set.
pub(super) async fn apply_momentum_snapshot(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<MomentumSnapshotRequest>,
) -> Result<Json<ApiResponse<MomentumSnapshotReport>>, ApiError> {
    let report = state
        .engine
        .apply_momentum_snapshot(&body.canonical_keys, Utc::now())
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(report, req_id.0)))
}
