//! Lenient parsing of free-form model output into scenario/evaluation values.
//!
//! The model is asked for strict JSON but may wrap it in prose or markdown fences.
//! Locating the JSON object is delegated to a `JsonExtractor`; `BraceSpan` takes the
//! text from the first `{` to the last `}`. It misfires when the output holds two
//! separate JSON fragments; callers fall back in that case.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Category, Difficulty, Evaluation, ScenarioFields};

pub const DEFAULT_SCORE: f64 = 7.0;
pub const DEFAULT_FEEDBACK: &str = "Good communication effort.";
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
  #[error("no JSON object found in model output")]
  NoJsonObject,
  #[error("invalid JSON in model output: {0}")]
  InvalidJson(String),
  #[error("model output is missing a non-empty `{0}`")]
  MissingField(&'static str),
}

/// Strategy for finding the JSON object inside model output.
pub trait JsonExtractor: Send + Sync {
  fn extract<'a>(&self, text: &'a str) -> Option<&'a str>;
}

/// First `{` through last `}`, inclusive.
#[derive(Clone, Copy, Debug, Default)]
pub struct BraceSpan;

impl JsonExtractor for BraceSpan {
  fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
  }
}

fn decode_object(extractor: &dyn JsonExtractor, text: &str) -> Result<Map<String, Value>, ParseError> {
  let span = extractor.extract(text).ok_or(ParseError::NoJsonObject)?;
  match serde_json::from_str::<Value>(span) {
    Ok(Value::Object(map)) => Ok(map),
    Ok(_) => Err(ParseError::NoJsonObject),
    Err(e) => Err(ParseError::InvalidJson(e.to_string())),
  }
}

/// Scenario title/description from model output. The caller's category/difficulty
/// replace whatever the model suggested for those two fields.
pub fn parse_scenario(
  extractor: &dyn JsonExtractor,
  text: &str,
  category: Category,
  difficulty: Difficulty,
) -> Result<ScenarioFields, ParseError> {
  let obj = decode_object(extractor, text)?;
  let title = required_text(&obj, "title")?;
  let description = required_text(&obj, "description")?;
  Ok(ScenarioFields { title, description, category, difficulty })
}

fn required_text(obj: &Map<String, Value>, key: &'static str) -> Result<String, ParseError> {
  obj
    .get(key)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .ok_or(ParseError::MissingField(key))
}

/// Score/feedback from model output. A score that is missing, non-numeric or outside
/// [1, 10] becomes `DEFAULT_SCORE`; missing or blank feedback becomes `DEFAULT_FEEDBACK`.
/// Other fields are ignored.
pub fn parse_evaluation(extractor: &dyn JsonExtractor, text: &str) -> Result<Evaluation, ParseError> {
  let obj = decode_object(extractor, text)?;

  let score = obj
    .get("score")
    .and_then(Value::as_f64)
    .filter(|s| (MIN_SCORE..=MAX_SCORE).contains(s))
    .unwrap_or(DEFAULT_SCORE);

  let feedback = match obj.get("feedback") {
    Some(Value::String(s)) => s.trim().to_string(),
    Some(Value::Null) | None => String::new(),
    Some(other) => other.to_string(),
  };
  let feedback = if feedback.is_empty() { DEFAULT_FEEDBACK.to_string() } else { feedback };

  Ok(Evaluation { score, feedback })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn eval(text: &str) -> Result<Evaluation, ParseError> { parse_evaluation(&BraceSpan, text) }

  #[test]
  fn brace_span_takes_first_open_to_last_close() {
    assert_eq!(BraceSpan.extract("Sure! {\"a\": {\"b\": 1}} hope it helps"), Some("{\"a\": {\"b\": 1}}"));
    assert_eq!(BraceSpan.extract("no json here"), None);
    assert_eq!(BraceSpan.extract("} backwards {"), None);
  }

  #[test]
  fn two_fragments_are_unparseable() {
    let err = eval("{\"score\": 8} and also {\"score\": 9}").unwrap_err();
    assert!(matches!(err, ParseError::InvalidJson(_)));
  }

  #[test]
  fn scenario_overrides_model_category_and_difficulty() {
    let text = "```json\n{\"title\": \"Night shift handover\", \"description\": \"Hand over a patient.\", \
                \"category\": \"routine\", \"difficulty\": \"expert\"}\n```";
    let s = parse_scenario(&BraceSpan, text, Category::Emergency, Difficulty::Beginner).unwrap();
    assert_eq!(s.title, "Night shift handover");
    assert_eq!(s.description, "Hand over a patient.");
    assert_eq!(s.category, Category::Emergency);
    assert_eq!(s.difficulty, Difficulty::Beginner);
  }

  #[test]
  fn scenario_without_title_or_description_is_rejected() {
    let missing = parse_scenario(&BraceSpan, "{\"description\": \"d\"}", Category::General, Difficulty::Beginner);
    assert_eq!(missing.unwrap_err(), ParseError::MissingField("title"));
    let blank = parse_scenario(&BraceSpan, "{\"title\": \"t\", \"description\": \"  \"}", Category::General, Difficulty::Beginner);
    assert_eq!(blank.unwrap_err(), ParseError::MissingField("description"));
  }

  #[test]
  fn evaluation_reads_score_and_feedback() {
    let e = eval("Here you go:\n{\"score\": 8.5, \"feedback\": \"Clear and kind.\"}").unwrap();
    assert_eq!(e, Evaluation { score: 8.5, feedback: "Clear and kind.".into() });
  }

  #[test]
  fn evaluation_score_boundaries_are_inclusive() {
    assert_eq!(eval("{\"score\": 1}").unwrap().score, 1.0);
    assert_eq!(eval("{\"score\": 10}").unwrap().score, 10.0);
  }

  #[test]
  fn evaluation_defaults_bad_scores() {
    for text in [
      "{\"feedback\": \"ok\"}",
      "{\"score\": \"ten\", \"feedback\": \"ok\"}",
      "{\"score\": 15, \"feedback\": \"ok\"}",
      "{\"score\": 12, \"feedback\": \"nice\"}",
      "{\"score\": 0.5, \"feedback\": \"ok\"}",
      "{\"score\": null, \"feedback\": \"ok\"}",
    ] {
      assert_eq!(eval(text).unwrap().score, DEFAULT_SCORE, "{text}");
    }
  }

  #[test]
  fn evaluation_defaults_missing_feedback() {
    assert_eq!(eval("{\"score\": 6}").unwrap().feedback, DEFAULT_FEEDBACK);
    assert_eq!(eval("{\"score\": 6, \"feedback\": \"\"}").unwrap().feedback, DEFAULT_FEEDBACK);
    assert_eq!(eval("{\"score\": 6, \"feedback\": 42}").unwrap().feedback, "42");
  }

  #[test]
  fn gibberish_is_unparseable() {
    assert_eq!(eval("I think the nurse did fine.").unwrap_err(), ParseError::NoJsonObject);
    assert!(matches!(eval("{not json at all}").unwrap_err(), ParseError::InvalidJson(_)));
  }
}
