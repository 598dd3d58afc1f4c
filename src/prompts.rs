//! Prompt rendering for scenario generation and response evaluation.
//!
//! Pure functions over the configured `Prompts`; inputs are expected to be validated by the caller.

use crate::config::Prompts;
use crate::domain::{Category, Difficulty};
use crate::util::fill_template;

/// Sampling knobs sent with each completion request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sampling {
  pub temperature: f32,
  pub max_tokens: u32,
}

/// Low temperature and a small budget: the reply is a short JSON object.
pub const SCENARIO_SAMPLING: Sampling = Sampling { temperature: 0.5, max_tokens: 500 };
pub const EVALUATION_SAMPLING: Sampling = Sampling { temperature: 0.3, max_tokens: 1024 };

pub fn build_scenario_prompt(prompts: &Prompts, category: Category, difficulty: Difficulty) -> String {
  fill_template(
    &prompts.scenario_user_template,
    &[("category", category.as_str()), ("difficulty", difficulty.as_str())],
  )
  .trim()
  .to_string()
}

pub fn build_evaluation_prompt(
  prompts: &Prompts,
  scenario_title: &str,
  scenario_description: &str,
  response_text: &str,
) -> String {
  fill_template(
    &prompts.evaluation_user_template,
    &[
      ("scenario_title", scenario_title),
      ("scenario_description", scenario_description),
      ("user_response", response_text),
    ],
  )
  .trim()
  .to_string()
}
