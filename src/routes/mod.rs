//! Router assembly: HTTP endpoints, CORS and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::state::AppState;

pub mod extract;
pub mod http;

/// Build the application router with:
/// - health checks at `/`, `/health`, `/health/deps`
/// - scenarios under `/scenarios/...`, responses under `/responses/...`
/// - CORS restricted to the configured origins
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(target: "carecomm_backend", %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Router::new()
        .route("/", get(http::http_health))
        .route("/health", get(http::http_health))
        .route("/health/deps", get(http::http_health_deps))
        .route("/scenarios/generate", post(http::http_generate_scenario))
        .route("/scenarios/:scenario_id", get(http::http_get_scenario))
        .route("/responses", post(http::http_submit_response))
        .route("/responses/", post(http::http_submit_response))
        .route("/responses/:response_id", get(http::http_get_response))
        .route("/responses/:response_id/evaluate", post(http::http_evaluate_response))
        .route("/responses/scenario/:scenario_id", get(http::http_list_responses))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
