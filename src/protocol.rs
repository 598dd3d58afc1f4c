//! Public HTTP request/response structs (serde ready).
//! Kept separate from the domain so the stored shape and the wire shape can evolve independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Category, Difficulty, Scenario, UserResponse};

/// Header telling the client whether the AI-produced part of a payload came from
/// the model or from canned fallback content.
pub const CONTENT_SOURCE_HEADER: &str = "x-content-source";

/// Category/difficulty arrive as plain strings so unknown values map to a 422 with a clear message.
#[derive(Debug, Deserialize)]
pub struct ScenarioIn {
    pub category: String,
    pub difficulty: String,
}

#[derive(Debug, Serialize)]
pub struct ScenarioOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

impl From<Scenario> for ScenarioOut {
    fn from(s: Scenario) -> Self {
        Self {
            id: s.id,
            title: s.title,
            description: s.description,
            category: s.category,
            difficulty: s.difficulty,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResponseIn {
    pub scenario_id: String,
    pub response_text: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseOut {
    pub id: String,
    pub scenario_id: String,
    pub response_text: String,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<UserResponse> for ResponseOut {
    fn from(r: UserResponse) -> Self {
        Self {
            id: r.id,
            scenario_id: r.scenario_id,
            response_text: r.response_text,
            score: r.score,
            feedback: r.feedback,
            submitted_at: r.submitted_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct DepsOut {
    pub database: &'static str,
    pub completion_endpoint: &'static str,
}
