//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; AI-produced payloads carry the content-source header.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  response::{IntoResponse, Response},
  Json,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::Source;
use crate::error::ApiError;
use crate::logic;
use crate::protocol::*;
use crate::routes::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

const VERSION: &str = "1.0.0";

fn sourced<T: serde::Serialize>(source: Source, body: T) -> impl IntoResponse {
  ([(CONTENT_SOURCE_HEADER, source.as_str())], Json(body))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { status: "healthy", timestamp: Utc::now(), version: VERSION })
}

#[instrument(level = "info", skip(state))]
pub async fn http_health_deps(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let database = if state.store.ping().await.is_ok() { "ok" } else { "unavailable" };
  let completion_endpoint = if state.completion.probe().await { "ok" } else { "unavailable" };
  info!(target: "carecomm_backend", database, completion_endpoint, "Dependency check");
  Json(DepsOut { database, completion_endpoint })
}

#[instrument(level = "info", skip(state, body), fields(category = %body.category, difficulty = %body.difficulty))]
pub async fn http_generate_scenario(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<ScenarioIn>,
) -> Result<impl IntoResponse, ApiError> {
  let (category, difficulty) = logic::parse_scenario_request(&body.category, &body.difficulty)?;
  let (scenario, source) = logic::generate_scenario(&state, category, difficulty).await?;
  Ok(sourced(source, ScenarioOut::from(scenario)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_scenario(
  State(state): State<Arc<AppState>>,
  Path(scenario_id): Path<String>,
) -> Result<Json<ScenarioOut>, ApiError> {
  let scenario = logic::get_scenario(&state, &scenario_id).await?;
  Ok(Json(scenario.into()))
}

#[instrument(level = "info", skip(state, body), fields(scenario_id = %body.scenario_id, text_len = body.response_text.len()))]
pub async fn http_submit_response(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<ResponseIn>,
) -> Result<Response, ApiError> {
  let (response, source) = logic::submit_response(&state, &body.scenario_id, &body.response_text).await?;
  info!(target: "response", id = %response.id, score = ?response.score, "HTTP response submitted");
  let out = ResponseOut::from(response);
  // No header when the evaluation never made it onto the row.
  Ok(match source {
    Some(source) => sourced(source, out).into_response(),
    None => Json(out).into_response(),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_response(
  State(state): State<Arc<AppState>>,
  Path(response_id): Path<String>,
) -> Result<Json<ResponseOut>, ApiError> {
  let response = logic::get_response(&state, &response_id).await?;
  Ok(Json(response.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_evaluate_response(
  State(state): State<Arc<AppState>>,
  Path(response_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let (response, source) = logic::evaluate_pending(&state, &response_id).await?;
  Ok(sourced(source, ResponseOut::from(response)))
}

#[instrument(level = "info", skip(state), fields(limit = ?q.limit))]
pub async fn http_list_responses(
  State(state): State<Arc<AppState>>,
  Path(scenario_id): Path<String>,
  ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<Json<Vec<ResponseOut>>, ApiError> {
  let responses = logic::list_responses(&state, &scenario_id, q.limit).await?;
  Ok(Json(responses.into_iter().map(ResponseOut::from).collect()))
}
