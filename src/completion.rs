//! Client for an OpenAI-style chat-completion endpoint (e.g. a local LM Studio server).
//!
//! One POST per call to `{base_url}/v1/chat/completions`, bounded by a single timeout,
//! no retries. `generate_scenario` and `evaluate_response` never fail: any transport,
//! status, shape or parse problem is logged and the canned fallback is returned,
//! tagged as such in the `Outcome`.
//!
//! We never log the API key, and model output only as short previews.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::{CompletionSettings, Prompts};
use crate::domain::{Category, Difficulty, Evaluation, Outcome, ScenarioFields};
use crate::fallbacks::{fallback_evaluation, fallback_scenario};
use crate::parse::{parse_evaluation, parse_scenario, BraceSpan, JsonExtractor, ParseError};
use crate::prompts::{
  build_evaluation_prompt, build_scenario_prompt, Sampling, EVALUATION_SAMPLING, SCENARIO_SAMPLING,
};
use crate::util::preview;

const CLIENT_USER_AGENT: &str = "carecomm-backend/0.1";

/// Why a single completion request produced no usable text.
#[derive(Debug, Error)]
pub enum CompletionError {
  #[error("request to {url} timed out after {elapsed:?}")]
  Timeout { url: String, elapsed: Duration },
  #[error("{url} returned HTTP {status}: {message}")]
  Status { url: String, status: StatusCode, message: String },
  #[error("failed to reach {url}: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },
  #[error("reply did not contain choices[0].message.content: {0}")]
  UnexpectedShape(String),
}

/// Failure of a whole generate/evaluate attempt, before fallback is applied.
#[derive(Debug, Error)]
pub enum AttemptError {
  #[error(transparent)]
  Completion(#[from] CompletionError),
  #[error(transparent)]
  Parse(#[from] ParseError),
}

#[derive(Clone)]
pub struct CompletionClient {
  client: reqwest::Client,
  base_url: String,
  api_key: Option<String>,
  model: String,
  timeout: Duration,
  prompts: Prompts,
  extractor: Arc<dyn JsonExtractor>,
}

impl CompletionClient {
  pub fn new(settings: &CompletionSettings, prompts: Prompts) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
    Ok(Self {
      client,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      api_key: settings.api_key.clone(),
      model: settings.model.clone(),
      timeout: settings.timeout,
      prompts,
      extractor: Arc::new(BraceSpan),
    })
  }

  /// Swap the JSON extraction strategy (e.g. for an endpoint with structured output).
  #[cfg(test)]
  pub fn with_extractor(mut self, extractor: Arc<dyn JsonExtractor>) -> Self {
    self.extractor = extractor;
    self
  }

  pub fn base_url(&self) -> &str { &self.base_url }
  pub fn model(&self) -> &str { &self.model }

  /// Scenario for the given category/difficulty; the fallback scenario on any failure.
  #[instrument(level = "info", skip(self, category, difficulty), fields(%category, %difficulty))]
  pub async fn generate_scenario(&self, category: Category, difficulty: Difficulty) -> Outcome<ScenarioFields> {
    match self.try_generate_scenario(category, difficulty).await {
      Ok(fields) => {
        info!(target: "completion", title = %preview(&fields.title, 50), "Scenario generated by model");
        Outcome::model(fields)
      }
      Err(e) => {
        warn!(target: "completion", error = %e, "Scenario generation failed; using fallback");
        Outcome::fallback(fallback_scenario(category, difficulty))
      }
    }
  }

  pub async fn try_generate_scenario(
    &self,
    category: Category,
    difficulty: Difficulty,
  ) -> Result<ScenarioFields, AttemptError> {
    let user = build_scenario_prompt(&self.prompts, category, difficulty);
    let text = self.chat(&self.prompts.scenario_system, &user, SCENARIO_SAMPLING).await?;
    Ok(parse_scenario(self.extractor.as_ref(), &text, category, difficulty)?)
  }

  /// Score/feedback for a response to `scenario`; the fallback evaluation on any failure.
  #[instrument(level = "info", skip(self, scenario, response_text), fields(response_len = response_text.len()))]
  pub async fn evaluate_response(&self, scenario: &ScenarioFields, response_text: &str) -> Outcome<Evaluation> {
    match self.try_evaluate_response(scenario, response_text).await {
      Ok(evaluation) => {
        info!(target: "completion", score = evaluation.score, "Response evaluated by model");
        Outcome::model(evaluation)
      }
      Err(e) => {
        warn!(target: "completion", error = %e, "Evaluation failed; using fallback");
        Outcome::fallback(fallback_evaluation())
      }
    }
  }

  pub async fn try_evaluate_response(
    &self,
    scenario: &ScenarioFields,
    response_text: &str,
  ) -> Result<Evaluation, AttemptError> {
    let user = build_evaluation_prompt(&self.prompts, &scenario.title, &scenario.description, response_text);
    let text = self.chat(&self.prompts.evaluation_system, &user, EVALUATION_SAMPLING).await?;
    Ok(parse_evaluation(self.extractor.as_ref(), &text)?)
  }

  /// True if `{base_url}/v1/models` answers with a success status within the timeout.
  #[instrument(level = "debug", skip(self))]
  pub async fn probe(&self) -> bool {
    let url = format!("{}/v1/models", self.base_url);
    match self.authorized(self.client.get(&url)).send().await {
      Ok(res) => res.status().is_success(),
      Err(e) => {
        warn!(target: "completion", %url, error = %e, "Completion endpoint probe failed");
        false
      }
    }
  }

  fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    let builder = builder.header(USER_AGENT, CLIENT_USER_AGENT);
    match &self.api_key {
      Some(key) => builder.bearer_auth(key),
      None => builder,
    }
  }

  /// Single chat completion; returns the assistant message text.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, max_tokens = sampling.max_tokens))]
  async fn chat(&self, system: &str, user: &str, sampling: Sampling) -> Result<String, CompletionError> {
    let url = format!("{}/v1/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: &self.model,
      messages: vec![
        ChatMessageReq { role: "system", content: system },
        ChatMessageReq { role: "user", content: user },
      ],
      temperature: sampling.temperature,
      max_tokens: sampling.max_tokens,
      stream: false,
    };

    let start = Instant::now();
    let res = self
      .authorized(self.client.post(&url))
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| self.transport_error(&url, start.elapsed(), e))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let message = extract_error_message(&body).unwrap_or_else(|| preview(&body, 200));
      error!(target: "completion", %url, elapsed = ?start.elapsed(), status = status.as_u16(), %message, "Completion endpoint returned an error status");
      return Err(CompletionError::Status { url, status, message });
    }

    let bytes = res.bytes().await.map_err(|e| self.transport_error(&url, start.elapsed(), e))?;
    let body: ChatCompletionResponse =
      serde_json::from_slice(&bytes).map_err(|e| CompletionError::UnexpectedShape(e.to_string()))?;

    if let Some(usage) = &body.usage {
      info!(target: "completion", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Completion usage");
    }

    let text = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| CompletionError::UnexpectedShape("no choices[0].message.content".into()))?;

    info!(target: "completion", elapsed = ?start.elapsed(), reply_len = text.len(), reply_preview = %preview(&text, 80), "Completion received");
    Ok(text)
  }

  fn transport_error(&self, url: &str, elapsed: Duration, e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
      error!(target: "completion", %url, ?elapsed, timeout = ?self.timeout, "Completion request timed out");
      CompletionError::Timeout { url: url.to_string(), elapsed }
    } else {
      error!(target: "completion", %url, ?elapsed, error = %e, "Completion endpoint unreachable");
      CompletionError::Transport { url: url.to_string(), source: e }
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessageReq<'a>>,
  temperature: f32,
  max_tokens: u32,
  stream: bool,
}
#[derive(Serialize)]
struct ChatMessageReq<'a> { role: &'static str, content: &'a str }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use serde_json::{json, Value};
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  pub(crate) fn chat_reply(content: &str) -> Value {
    json!({
      "id": "chatcmpl-test",
      "object": "chat.completion",
      "choices": [{ "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }],
      "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 }
    })
  }

  fn client_for(base_url: &str, api_key: Option<&str>, timeout: Duration) -> CompletionClient {
    let settings = CompletionSettings {
      base_url: base_url.to_string(),
      api_key: api_key.map(str::to_string),
      timeout,
      ..CompletionSettings::default()
    };
    CompletionClient::new(&settings, Prompts::default()).unwrap()
  }

  async fn server_replying(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/v1/chat/completions")).respond_with(template).mount(&server).await;
    server
  }

  fn scenario() -> ScenarioFields {
    ScenarioFields {
      title: "Chest pain at triage".into(),
      description: "An anxious patient reports chest pain.".into(),
      category: Category::Emergency,
      difficulty: Difficulty::Beginner,
    }
  }

  // Nothing listens on the discard port locally.
  const UNREACHABLE: &str = "http://127.0.0.1:9";

  #[tokio::test]
  async fn sends_chat_request_envelope() {
    let server = server_replying(ResponseTemplate::new(200).set_body_json(chat_reply(
      "{\"title\": \"Night shift\", \"description\": \"Hand over a patient.\"}",
    )))
    .await;
    let client = client_for(&server.uri(), Some("secret-token"), Duration::from_secs(5));

    let out = client.generate_scenario(Category::Routine, Difficulty::Intermediate).await;
    assert!(!out.is_fallback());
    assert_eq!(out.value.title, "Night shift");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.headers.get("authorization").unwrap().to_str().unwrap(), "Bearer secret-token");
    let body: Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(body["model"], "local-model");
    assert_eq!(body["stream"], false);
    assert_eq!(body["max_tokens"], 500);
    assert_eq!(body["temperature"], 0.5);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert!(body["messages"][1]["content"].as_str().unwrap().contains("Category: routine"));
  }

  #[tokio::test]
  async fn omits_authorization_without_api_key() {
    let server = server_replying(ResponseTemplate::new(200).set_body_json(chat_reply("{\"score\": 9, \"feedback\": \"Great.\"}"))).await;
    let client = client_for(&server.uri(), None, Duration::from_secs(5));

    let out = client.evaluate_response(&scenario(), "I would stay calm and reassure them.").await;
    assert_eq!(out, Outcome::model(Evaluation { score: 9.0, feedback: "Great.".into() }));

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["max_tokens"], 1024);
  }

  #[tokio::test]
  async fn scenario_falls_back_when_endpoint_unreachable() {
    let client = client_for(UNREACHABLE, None, Duration::from_secs(5));
    let err = client.try_generate_scenario(Category::Emergency, Difficulty::Beginner).await.unwrap_err();
    assert!(matches!(err, AttemptError::Completion(CompletionError::Transport { .. })));

    let out = client.generate_scenario(Category::Emergency, Difficulty::Beginner).await;
    assert!(out.is_fallback());
    assert_eq!(out.value.title, "Emergency Communication");
    assert_eq!(out.value.difficulty, Difficulty::Beginner);
  }

  #[tokio::test]
  async fn scenario_always_echoes_request() {
    let ok = server_replying(ResponseTemplate::new(200).set_body_json(chat_reply(
      "{\"title\": \"T\", \"description\": \"D\", \"category\": \"routine\", \"difficulty\": \"intermediate\"}",
    )))
    .await;
    let broken = server_replying(ResponseTemplate::new(200).set_body_json(chat_reply("no json"))).await;

    for base in [ok.uri(), broken.uri(), UNREACHABLE.to_string()] {
      let client = client_for(&base, None, Duration::from_secs(5));
      for category in Category::ALL {
        for difficulty in Difficulty::ALL {
          let s = client.generate_scenario(category, difficulty).await.into_value();
          assert_eq!((s.category, s.difficulty), (category, difficulty));
          assert!(!s.title.is_empty() && !s.description.is_empty());
        }
      }
    }
  }

  #[tokio::test]
  async fn evaluation_is_always_in_range() {
    let replies = [
      "{\"score\": 8, \"feedback\": \"Clear.\"}",
      "Sure, here is my evaluation: {\"score\": 6.5, \"feedback\": \"Add reassurance.\"} Thanks!",
      "{\"feedback\": \"No score given.\"}",
      "{\"score\": \"ten\", \"feedback\": \"Wrong type.\"}",
      "{\"score\": 15, \"feedback\": \"Too high.\"}",
      "asdf qwer zxcv",
    ];
    for reply in replies {
      let server = server_replying(ResponseTemplate::new(200).set_body_json(chat_reply(reply))).await;
      let client = client_for(&server.uri(), None, Duration::from_secs(5));
      let e = client.evaluate_response(&scenario(), "I would calmly assess vitals.").await.into_value();
      assert!((1.0..=10.0).contains(&e.score), "{reply}: {}", e.score);
      assert!(!e.feedback.is_empty(), "{reply}");
    }

    let client = client_for(UNREACHABLE, None, Duration::from_secs(5));
    let out = client.evaluate_response(&scenario(), "I would calmly assess vitals.").await;
    assert_eq!(out, Outcome::fallback(fallback_evaluation()));
  }

  #[tokio::test]
  async fn error_status_falls_back() {
    let server = server_replying(
      ResponseTemplate::new(503).set_body_json(json!({ "error": { "message": "model not loaded" } })),
    )
    .await;
    let client = client_for(&server.uri(), None, Duration::from_secs(5));

    match client.try_evaluate_response(&scenario(), "I would call for help.").await {
      Err(AttemptError::Completion(CompletionError::Status { status, message, .. })) => {
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message, "model not loaded");
      }
      other => panic!("expected status error, got {other:?}"),
    }
    assert!(client.evaluate_response(&scenario(), "I would call for help.").await.is_fallback());
  }

  #[tokio::test]
  async fn slow_endpoint_times_out() {
    let server = server_replying(
      ResponseTemplate::new(200)
        .set_body_json(chat_reply("{\"score\": 9}"))
        .set_delay(Duration::from_secs(3)),
    )
    .await;
    let client = client_for(&server.uri(), None, Duration::from_millis(200));

    let err = client.try_evaluate_response(&scenario(), "I would call for help.").await.unwrap_err();
    assert!(matches!(err, AttemptError::Completion(CompletionError::Timeout { .. })), "{err:?}");
    assert!(client.evaluate_response(&scenario(), "I would call for help.").await.is_fallback());
  }

  #[tokio::test]
  async fn unexpected_reply_shape_falls_back() {
    let server = server_replying(ResponseTemplate::new(200).set_body_json(json!({ "result": "hi" }))).await;
    let client = client_for(&server.uri(), None, Duration::from_secs(5));

    let err = client.try_generate_scenario(Category::General, Difficulty::Beginner).await.unwrap_err();
    assert!(matches!(err, AttemptError::Completion(CompletionError::UnexpectedShape(_))));

    let empty = server_replying(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] }))).await;
    let client = client_for(&empty.uri(), None, Duration::from_secs(5));
    assert!(client.generate_scenario(Category::General, Difficulty::Beginner).await.is_fallback());
  }

  struct WholeText;
  impl JsonExtractor for WholeText {
    fn extract<'a>(&self, text: &'a str) -> Option<&'a str> { Some(text) }
  }

  #[tokio::test]
  async fn extraction_strategy_is_swappable() {
    let server = server_replying(
      ResponseTemplate::new(200).set_body_json(chat_reply("Result: {\"score\": 4, \"feedback\": \"Be warmer.\"}")),
    )
    .await;
    let strict = client_for(&server.uri(), None, Duration::from_secs(5)).with_extractor(Arc::new(WholeText));
    assert!(strict.evaluate_response(&scenario(), "I would explain the delay.").await.is_fallback());

    let lenient = client_for(&server.uri(), None, Duration::from_secs(5));
    assert_eq!(lenient.evaluate_response(&scenario(), "I would explain the delay.").await.value.score, 4.0);
  }

  #[tokio::test]
  async fn probe_reports_reachability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/v1/models"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
      .mount(&server)
      .await;
    assert!(client_for(&server.uri(), None, Duration::from_secs(5)).probe().await);
    assert!(!client_for(UNREACHABLE, None, Duration::from_secs(5)).probe().await);
  }
}
