//! Canned content served whenever the completion endpoint or its output can't be used.
//! Deterministic: the same input always yields the same value.

use crate::domain::{Category, Difficulty, Evaluation, ScenarioFields};

pub const FALLBACK_SCENARIO_TITLE: &str = "Fallback General Healthcare Communication";
pub const FALLBACK_SCENARIO_DESCRIPTION: &str =
  "Fallback senario description : Practice professional communication with a patient in a healthcare setting.";

pub const FALLBACK_EVALUATION_SCORE: f64 = 7.0;
pub const FALLBACK_EVALUATION_FEEDBACK: &str = "This is a fallback evaluation response. \
Your response shows good communication effort. AI evaluation is temporarily unavailable, \
but your response has been saved for review.";

/// Fixed scenario for a category, stamped with the caller's category/difficulty.
pub fn fallback_scenario(category: Category, difficulty: Difficulty) -> ScenarioFields {
  let (title, description) = match category {
    Category::Emergency => (
      "Emergency Communication",
      "Practice communicating with a patient in an emergency setting.",
    ),
    Category::Routine => (
      "Routine Check-up",
      "Practice communication during a regular patient visit.",
    ),
    Category::General => (FALLBACK_SCENARIO_TITLE, FALLBACK_SCENARIO_DESCRIPTION),
  };
  ScenarioFields { title: title.into(), description: description.into(), category, difficulty }
}

pub fn fallback_evaluation() -> Evaluation {
  Evaluation { score: FALLBACK_EVALUATION_SCORE, feedback: FALLBACK_EVALUATION_FEEDBACK.into() }
}
