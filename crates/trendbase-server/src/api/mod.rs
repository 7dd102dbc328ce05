mod entities;
mod ingest;
mod recalc;
mod sections;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use trendbase_engine::{EngineError, TrendEngine};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TrendEngine>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" | "merge_ambiguous" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "persistence_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::PersistenceUnavailable(_) => {
            tracing::error!(error = %error, "store unavailable");
        }
        _ => tracing::debug!(error = %error, code = error.code(), "request rejected"),
    }
    ApiError::new(request_id, error.code(), error.to_string())
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/signals", post(ingest::ingest_signals))
        .route(
            "/api/v1/momentum/snapshot",
            post(ingest::apply_momentum_snapshot),
        )
        .route("/api/v1/recalculate", post(recalc::recalculate))
        .route("/api/v1/reconcile", post(recalc::reconcile))
        .route("/api/v1/recalc-runs", get(recalc::list_recalc_runs))
        .route(
            "/api/v1/entities/{id}",
            get(entities::get_entity).delete(entities::delete_entity),
        )
        .route(
            "/api/v1/entities/{id}/momentum",
            put(entities::set_momentum_presence),
        )
        .route(
            "/api/v1/entities/{id}/base-score",
            put(entities::set_base_score),
        )
        .route("/api/v1/entities/{id}/status", put(entities::set_status))
        .route(
            "/api/v1/entities/{id}/content",
            put(entities::set_content_ready),
        )
        .route(
            "/api/v1/entities/{id}/traffic",
            post(entities::record_traffic),
        )
        .route("/api/v1/entities/{id}/merge", post(entities::merge_entity))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/sections", get(sections::list_sections));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.engine.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use trendbase_core::EntityStore;
    use trendbase_engine::{EngineConfig, MemoryStore};

    const TOKEN: &str = "test-token";

    struct Harness {
        store: Arc<MemoryStore>,
        app: Router,
    }

    fn harness_with(rate_limit: RateLimitState) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let engine = TrendEngine::new(
            Arc::clone(&store) as Arc<dyn EntityStore>,
            EngineConfig::default(),
        );
        let auth = AuthState::from_keys(TOKEN, false).expect("auth");
        let app = build_app(
            AppState {
                engine: Arc::new(engine),
            },
            auth,
            rate_limit,
        );
        Harness { store, app }
    }

    fn harness() -> Harness {
        harness_with(default_rate_limit_state())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .expect("request")
    }

    fn send_json(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {TOKEN}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("json parse")
        };
        (status, json)
    }

    fn record(name: &str, magnitude: f64) -> Value {
        json!({
            "source": "momentum",
            "raw_name": name,
            "magnitude": magnitude,
            "observed_at": Utc::now(),
        })
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_codes_map_to_statuses() {
        let cases = [
            ("validation_error", StatusCode::BAD_REQUEST),
            ("not_found", StatusCode::NOT_FOUND),
            ("conflict", StatusCode::CONFLICT),
            ("persistence_unavailable", StatusCode::SERVICE_UNAVAILABLE),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            let response = ApiError::new("req-1", code, "boom").into_response();
            assert_eq!(response.status(), status, "code {code}");
        }
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let h = harness();
        let request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .expect("request");
        let (status, body) = call(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");

        h.store.set_unavailable(true);
        let request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .expect("request");
        let (status, body) = call(&h.app, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["data"]["database"], "unavailable");
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn sections_are_public_and_protected_routes_are_not() {
        let h = harness();
        let public = Request::builder()
            .uri("/api/v1/sections?limit=5")
            .body(Body::empty())
            .expect("request");
        let (status, body) = call(&h.app, public).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["trending_now"].as_array().expect("array").is_empty());

        let anonymous = Request::builder()
            .uri("/api/v1/recalc-runs")
            .header("x-request-id", "anon-1")
            .body(Body::empty())
            .expect("request");
        let (status, body) = call(&h.app, anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
        assert_eq!(body["meta"]["request_id"], "anon-1");
    }

    #[tokio::test]
    async fn ingest_then_fetch_entity_detail() {
        let h = harness();
        let batch = json!([
            record("Snail Mucin Essence", 400.0),
            {"source": "momentum", "raw_name": "  ", "observed_at": Utc::now()},
        ]);
        let (status, body) = call(&h.app, send_json("POST", "/api/v1/signals", &batch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["created"], 1);
        assert_eq!(body["data"]["rejected"][0]["index"], 1);

        let id = h.store.list_entity_ids().await.expect("ids")[0];
        let (status, body) = call(&h.app, get(&format!("/api/v1/entities/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["canonical_name"], "Snail Mucin Essence");
        assert_eq!(body["data"]["breakdown"]["momentum"], 20);
        assert_eq!(body["data"]["signals"].as_array().expect("signals").len(), 1);
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let h = harness();
        let (status, body) = call(&h.app, get("/api/v1/entities/404")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn admin_validation_errors_are_bad_requests() {
        let h = harness();
        let batch = json!([record("Lip Oil", 400.0)]);
        call(&h.app, send_json("POST", "/api/v1/signals", &batch)).await;
        let id = h.store.list_entity_ids().await.expect("ids")[0];

        let (status, body) = call(
            &h.app,
            send_json(
                "PUT",
                &format!("/api/v1/entities/{id}/base-score"),
                &json!({"score": 150}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");

        let (status, _) = call(
            &h.app,
            send_json(
                "POST",
                &format!("/api/v1/entities/{id}/merge"),
                &json!({"loser_id": id}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &h.app,
            send_json(
                "PUT",
                &format!("/api/v1/entities/{id}/base-score"),
                &json!({"score": 64}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["base_score"], 64);
    }

    #[tokio::test]
    async fn recalculate_records_a_run() {
        let h = harness();
        call(
            &h.app,
            send_json("POST", "/api/v1/signals", &json!([record("Lip Oil", 400.0)])),
        )
        .await;

        let (status, body) = call(
            &h.app,
            send_json("POST", "/api/v1/recalculate", &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "succeeded");
        assert_eq!(body["data"]["trigger"], "api");
        assert_eq!(body["data"]["processed"], 1);

        let (status, body) = call(&h.app, get("/api/v1/recalc-runs?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().expect("runs").len(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_maps_to_service_unavailable() {
        let h = harness();
        h.store.set_unavailable(true);
        let (status, body) = call(
            &h.app,
            send_json("POST", "/api/v1/recalculate", &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "persistence_unavailable");
    }

    #[tokio::test]
    async fn protected_routes_are_rate_limited() {
        let h = harness_with(RateLimitState::new(1, Duration::from_secs(60)));
        let (status, _) = call(&h.app, get("/api/v1/recalc-runs")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&h.app, get("/api/v1/recalc-runs")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "rate_limited");
    }
}
