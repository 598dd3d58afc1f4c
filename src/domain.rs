//! Domain models: scenario categories/difficulties, persisted scenarios and responses,
//! and the values produced by the completion layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of scenario categories accepted at the request boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Category {
  General,
  Emergency,
  Routine,
}

impl Category {
  pub const ALL: [Category; 3] = [Category::General, Category::Emergency, Category::Routine];

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::General => "general",
      Category::Emergency => "emergency",
      Category::Routine => "routine",
    }
  }
}

impl FromStr for Category {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Category::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| format!("Category must be one of: {}", join_names(Category::ALL.map(|c| c.as_str()))))
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Closed set of difficulty levels accepted at the request boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Difficulty {
  Beginner,
  Intermediate,
}

impl Difficulty {
  pub const ALL: [Difficulty; 2] = [Difficulty::Beginner, Difficulty::Intermediate];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Beginner => "beginner",
      Difficulty::Intermediate => "intermediate",
    }
  }
}

impl FromStr for Difficulty {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Difficulty::ALL
      .into_iter()
      .find(|d| d.as_str() == s)
      .ok_or_else(|| format!("Difficulty must be one of: {}", join_names(Difficulty::ALL.map(|d| d.as_str()))))
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

fn join_names<const N: usize>(names: [&str; N]) -> String { names.join(", ") }

/// Scenario content as produced by the model (or the fallback table).
/// `category`/`difficulty` always echo what the caller asked for.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioFields {
  pub title: String,
  pub description: String,
  pub category: Category,
  pub difficulty: Difficulty,
}

/// Score/feedback pair for one submitted response. `score` is always within [1, 10].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
  pub score: f64,
  pub feedback: String,
}

/// Where an AI-produced value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
  Model,
  Fallback,
}

impl Source {
  pub fn as_str(&self) -> &'static str {
    match self {
      Source::Model => "model",
      Source::Fallback => "fallback",
    }
  }
}

/// A value that is always present, tagged with whether the model produced it
/// or the canned fallback was substituted.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome<T> {
  pub value: T,
  pub source: Source,
}

impl<T> Outcome<T> {
  pub fn model(value: T) -> Self { Self { value, source: Source::Model } }
  pub fn fallback(value: T) -> Self { Self { value, source: Source::Fallback } }
  pub fn is_fallback(&self) -> bool { self.source == Source::Fallback }
  pub fn into_value(self) -> T { self.value }
}

/// Persisted scenario (`scenarios` table).
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Scenario {
  pub id: String,
  pub title: String,
  pub description: String,
  pub category: Category,
  pub difficulty: Difficulty,
  pub created_at: DateTime<Utc>,
}

impl Scenario {
  pub fn fields(&self) -> ScenarioFields {
    ScenarioFields {
      title: self.title.clone(),
      description: self.description.clone(),
      category: self.category,
      difficulty: self.difficulty,
    }
  }
}

/// Persisted user submission (`responses` table). `score`/`feedback` stay `None`
/// until the evaluation step records them, at most once.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct UserResponse {
  pub id: String,
  pub scenario_id: String,
  pub response_text: String,
  pub score: Option<f64>,
  pub feedback: Option<String>,
  pub submitted_at: DateTime<Utc>,
}
