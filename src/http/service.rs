//! Gate endpoints mapping HTTP requests onto the admission controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

use super::auth::{require_token, AuthToken};
use crate::ratelimit::{AdmissionController, ConfigUpdate, RateConfig, WaitMode};

/// Error body for rejected requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of `GET /get_rate_limit`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitResponse {
    pub current_rate_limit: u32,
    /// Base delay in milliseconds
    pub default_delay: u64,
}

impl From<RateConfig> for RateLimitResponse {
    fn from(config: RateConfig) -> Self {
        Self {
            current_rate_limit: config.limit_per_window(),
            default_delay: config.base_delay_ms(),
        }
    }
}

/// Query of `POST /set_rate_limit`.
#[derive(Debug, Default, Deserialize)]
pub struct SetRateLimitParams {
    pub new_limit: Option<String>,
    pub new_delay: Option<String>,
}

/// Body of `POST /set_rate_limit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetRateLimitResponse {
    pub success: bool,
    pub current_rate_limit: u32,
    pub default_delay: u64,
    /// Rejected fields keyed by query parameter name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

/// Query of `GET /request_access`.
#[derive(Debug, Default, Deserialize)]
pub struct RequestAccessParams {
    /// `true` asks the gate to sit out the delay itself
    pub handle_delay: Option<String>,
}

impl RequestAccessParams {
    fn wait_mode(&self) -> WaitMode {
        let defer = self
            .handle_delay
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
        WaitMode::from_defer_wait(defer)
    }
}

/// Body of `GET /request_access`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessResponse {
    /// Milliseconds the caller must still wait before acting
    pub delay_ms: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /get_rate_limit - Current limit and base delay
#[instrument(skip(controller))]
async fn get_rate_limit(
    State(controller): State<Arc<AdmissionController>>,
) -> Json<RateLimitResponse> {
    Json(controller.config().into())
}

/// POST /set_rate_limit - Update limit and/or base delay
#[instrument(skip(controller))]
async fn set_rate_limit(
    State(controller): State<Arc<AdmissionController>>,
    Query(params): Query<SetRateLimitParams>,
) -> (StatusCode, Json<SetRateLimitResponse>) {
    let update = ConfigUpdate::from_raw(params.new_limit, params.new_delay);
    let report = controller.update_config(&update);

    let errors: BTreeMap<String, String> = report
        .errors()
        .map(|e| (e.field().wire_name().to_string(), e.to_string()))
        .collect();
    let success = errors.is_empty();

    info!(
        success = success,
        limit_per_window = report.config.limit_per_window(),
        base_delay_ms = report.config.base_delay_ms(),
        "Configuration update handled"
    );

    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (
        status,
        Json(SetRateLimitResponse {
            success,
            current_rate_limit: report.config.limit_per_window(),
            default_delay: report.config.base_delay_ms(),
            errors,
        }),
    )
}

/// GET /request_access - Reserve an admission slot
#[instrument(skip(controller))]
async fn request_access(
    State(controller): State<Arc<AdmissionController>>,
    Query(params): Query<RequestAccessParams>,
) -> Json<AccessResponse> {
    let mode = params.wait_mode();
    let delay_ms = controller.try_admit(mode).await;

    debug!(mode = ?mode, delay_ms = delay_ms, "Access granted");

    Json(AccessResponse { delay_ms })
}

/// GET /health - Liveness check, no authentication
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Build the gate router.
///
/// All gate routes require the token; `/health` does not.
pub fn router(controller: Arc<AdmissionController>, token: AuthToken) -> Router {
    let gated = Router::new()
        .route("/get_rate_limit", get(get_rate_limit))
        .route("/set_rate_limit", post(set_rate_limit))
        .route("/request_access", get(request_access))
        .route_layer(middleware::from_fn_with_state(token, require_token))
        .with_state(controller);

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
}
