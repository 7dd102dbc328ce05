//! GET /api/v1/sections: homepage sections, served from the engine cache.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use trendbase_core::HomepageSections;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState};

const DEFAULT_SECTION_LIMIT: usize = 12;
const MAX_SECTION_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub(super) struct SectionsQuery {
    pub limit: Option<usize>,
}

fn normalize_section_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_SECTION_LIMIT)
        .clamp(1, MAX_SECTION_LIMIT)
}

/// Never fails: a slow or unavailable store yields empty sections.
pub(super) async fn list_sections(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SectionsQuery>,
) -> Json<ApiResponse<HomepageSections>> {
    let limit = normalize_section_limit(query.limit);
    let sections = state.engine.homepage_sections(limit, Utc::now()).await;
    Json(ApiResponse::new(HomepageSections::clone(&sections), req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_limit_is_bounded() {
        assert_eq!(normalize_section_limit(None), DEFAULT_SECTION_LIMIT);
        assert_eq!(normalize_section_limit(Some(0)), 1);
        assert_eq!(normalize_section_limit(Some(500)), MAX_SECTION_LIMIT);
    }
}
