//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Generating and persisting scenarios (model output or fallback)
//!   - Validating, persisting and evaluating submitted responses
//!   - Evaluating a stored response that has no score yet (at most once)
//!   - Listing responses for a scenario with a bounded page size

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Category, Difficulty, Scenario, Source, UserResponse};
use crate::error::ApiError;
use crate::state::AppState;
use crate::util::preview;

pub const MIN_RESPONSE_CHARS: usize = 10;
pub const MAX_RESPONSE_CHARS: usize = 2000;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

pub fn parse_scenario_request(category: &str, difficulty: &str) -> Result<(Category, Difficulty), ApiError> {
  let category = category.parse::<Category>().map_err(ApiError::Validation)?;
  let difficulty = difficulty.parse::<Difficulty>().map_err(ApiError::Validation)?;
  Ok((category, difficulty))
}

/// Trimmed response text, if its length is within bounds.
pub fn validate_response_text(raw: &str) -> Result<String, ApiError> {
  let text = raw.trim();
  let len = text.chars().count();
  if len < MIN_RESPONSE_CHARS {
    return Err(ApiError::Validation(format!("Response must be at least {MIN_RESPONSE_CHARS} characters long")));
  }
  if len > MAX_RESPONSE_CHARS {
    return Err(ApiError::Validation(format!("Response must be at most {MAX_RESPONSE_CHARS} characters long")));
  }
  Ok(text.to_string())
}

pub fn page_size(limit: Option<i64>) -> Result<u32, ApiError> {
  match limit {
    None => Ok(DEFAULT_PAGE_SIZE),
    Some(n) if (1..=i64::from(MAX_PAGE_SIZE)).contains(&n) => Ok(n as u32),
    Some(_) => Err(ApiError::Validation(format!("limit must be between 1 and {MAX_PAGE_SIZE}"))),
  }
}

fn require_id(id: &str, what: &str) -> Result<(), ApiError> {
  if id.trim().is_empty() {
    return Err(ApiError::BadRequest(format!("{what} ID is required")));
  }
  Ok(())
}

#[instrument(level = "info", skip(state))]
pub async fn generate_scenario(
  state: &AppState,
  category: Category,
  difficulty: Difficulty,
) -> Result<(Scenario, Source), ApiError> {
  let outcome = state.completion.generate_scenario(category, difficulty).await;
  if outcome.is_fallback() {
    warn!(target: "scenario", %category, %difficulty, "Serving fallback scenario");
  }
  let source = outcome.source;
  let fields = outcome.into_value();

  let scenario = Scenario {
    id: Uuid::new_v4().to_string(),
    title: fields.title,
    description: fields.description,
    category: fields.category,
    difficulty: fields.difficulty,
    created_at: Utc::now(),
  };
  state.store.insert_scenario(&scenario).await?;

  info!(
    target: "scenario",
    id = %scenario.id,
    %category,
    %difficulty,
    source = source.as_str(),
    title = %preview(&scenario.title, 50),
    description_len = scenario.description.len(),
    "Scenario generated and saved"
  );
  Ok((scenario, source))
}

#[instrument(level = "info", skip(state))]
pub async fn get_scenario(state: &AppState, id: &str) -> Result<Scenario, ApiError> {
  require_id(id, "Scenario")?;
  state.store.get_scenario(id).await?.ok_or_else(|| {
    warn!(target: "scenario", %id, "Scenario not found");
    ApiError::NotFound("Scenario not found".into())
  })
}

/// Validate, persist, then evaluate. The row is written before evaluation so the
/// user's text survives any evaluation problem; the score/feedback update follows.
#[instrument(level = "info", skip(state, raw_text), fields(%scenario_id, text_len = raw_text.len()))]
pub async fn submit_response(
  state: &AppState,
  scenario_id: &str,
  raw_text: &str,
) -> Result<(UserResponse, Option<Source>), ApiError> {
  let text = validate_response_text(raw_text)?;
  let scenario = get_scenario(state, scenario_id).await?;

  let mut response = UserResponse {
    id: Uuid::new_v4().to_string(),
    scenario_id: scenario.id.clone(),
    response_text: text,
    score: None,
    feedback: None,
    submitted_at: Utc::now(),
  };
  state.store.insert_response(&response).await?;

  let (source, recorded) = evaluate_and_record(state, &scenario, &mut response).await;
  let source = recorded_source(&response.id, source, recorded);
  Ok((response, source))
}

/// The source tag to report for a submission, or `None` when nothing was recorded
/// and the payload carries no evaluation to describe.
fn recorded_source(id: &str, source: Source, recorded: anyhow::Result<bool>) -> Option<Source> {
  match recorded {
    Ok(true) => Some(source),
    Ok(false) => None,
    Err(e) => {
      warn!(
        target: "response",
        %id,
        error = %e,
        evaluated_by = source.as_str(),
        "Response saved but evaluation could not be recorded; content source omitted"
      );
      None
    }
  }
}

/// Evaluate a stored response that has no score yet. A response is evaluated at most once.
#[instrument(level = "info", skip(state))]
pub async fn evaluate_pending(state: &AppState, response_id: &str) -> Result<(UserResponse, Source), ApiError> {
  let mut response = get_response(state, response_id).await?;
  if response.score.is_some() {
    return Err(ApiError::Conflict("Response has already been evaluated".into()));
  }
  let scenario = get_scenario(state, &response.scenario_id).await?;

  let (source, recorded) = evaluate_and_record(state, &scenario, &mut response).await;
  if !recorded? {
    return Err(ApiError::Conflict("Response has already been evaluated".into()));
  }
  Ok((response, source))
}

/// Runs the (infallible) evaluation and records it on the row. `Ok(false)` means another
/// evaluation got there first. A failed or lost update leaves `response` unscored; the
/// stored text is never affected.
async fn evaluate_and_record(
  state: &AppState,
  scenario: &Scenario,
  response: &mut UserResponse,
) -> (Source, anyhow::Result<bool>) {
  let outcome = state.completion.evaluate_response(&scenario.fields(), &response.response_text).await;
  let source = outcome.source;
  let evaluation = outcome.into_value();

  let recorded = state.store.record_evaluation(&response.id, &evaluation).await;
  match recorded {
    Ok(true) => {
      info!(target: "response", id = %response.id, score = evaluation.score, source = source.as_str(), "Response evaluated");
      response.score = Some(evaluation.score);
      response.feedback = Some(evaluation.feedback);
    }
    Ok(false) => {
      warn!(target: "response", id = %response.id, "Response already evaluated; keeping stored score");
    }
    Err(_) => {}
  }
  (source, recorded)
}

#[instrument(level = "info", skip(state))]
pub async fn get_response(state: &AppState, id: &str) -> Result<UserResponse, ApiError> {
  require_id(id, "Response")?;
  state.store.get_response(id).await?.ok_or_else(|| {
    warn!(target: "response", %id, "Response not found");
    ApiError::NotFound("Response not found".into())
  })
}

#[instrument(level = "info", skip(state))]
pub async fn list_responses(
  state: &AppState,
  scenario_id: &str,
  limit: Option<i64>,
) -> Result<Vec<UserResponse>, ApiError> {
  let limit = page_size(limit)?;
  let scenario = get_scenario(state, scenario_id).await?;
  let responses = state.store.list_responses_for_scenario(&scenario.id, limit).await?;
  info!(target: "response", %scenario_id, count = responses.len(), "Responses retrieved for scenario");
  Ok(responses)
}
