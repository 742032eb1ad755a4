//! HTTP API: session initialization, activity, health and metrics

use crate::auth::{require_auth, AccessToken};
use crate::error::{ApiError, ApiResult};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use exec_lib::health::{components, ComponentStatus, HealthRegistry};
use exec_lib::{
    ActivityManager, Authenticator, ExecMetrics, InitParams, InitResponse, SessionInitRequest,
    SessionInitializer,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub const EXEC_INIT_ENDPOINT: &str = "/exec/init";
pub const ACTIVITY_TICK_ENDPOINT: &str = "/activity/tick";

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Shared application state
pub struct AppState {
    pub initializer: SessionInitializer,
    pub authenticator: Authenticator,
    pub activity: ActivityManager,
    pub health_registry: HealthRegistry,
    pub metrics: ExecMetrics,
    pub request_timeout: Duration,
}

/// Run the session initialization pipeline for the caller
async fn exec_init(
    State(state): State<Arc<AppState>>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<InitResponse>> {
    let result = init_session(&state, token, body).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(ApiError::BadRequest(_)) | Err(ApiError::PayloadTooLarge(_)) => "bad_request",
        Err(ApiError::Unauthorized(_)) => "unauthorized",
        Err(ApiError::Internal(_)) => "error",
    };
    state.metrics.inc_init_requests(outcome);

    result.map(Json)
}

async fn init_session(
    state: &AppState,
    token: String,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<InitResponse> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("request body is too large".to_string())
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;

    let params: InitParams = if body.iter().all(u8::is_ascii_whitespace) {
        InitParams::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("failed to parse request body: {}", e)))?
    };
    let request = SessionInitRequest::new(params, token);

    match tokio::time::timeout(state.request_timeout, state.initializer.init(request)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            error!(timeout = ?state.request_timeout, "Session initialization timed out");
            state
                .health_registry
                .set_degraded(components::SESSION_INIT, "session initialization timed out")
                .await;
            Err(ApiError::internal("session initialization timed out"))
        }
    }
}

/// Record user activity
async fn activity_tick(State(state): State<Arc<AppState>>) -> StatusCode {
    state.activity.tick();
    StatusCode::NO_CONTENT
}

/// Health check: 200 while operational, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::internal(format!("failed to encode metrics: {}", e)).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Log one line per request
async fn log_request(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        endpoint = %endpoint,
        method = %method,
        status = response.status().as_u16(),
        duration = ?started.elapsed(),
        "Handled request"
    );
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route(EXEC_INIT_ENDPOINT, post(exec_init))
        .route(ACTIVITY_TICK_ENDPOINT, post(activity_tick))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(authenticated)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
