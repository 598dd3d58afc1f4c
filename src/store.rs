//! SQLite persistence for scenarios and responses.
//!
//! Each write is a single statement; there is no foreign key between the two tables,
//! so callers check that a scenario exists before inserting a response for it.

use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::domain::{Evaluation, Scenario, UserResponse};

#[derive(Clone)]
pub struct Store {
  pool: SqlitePool,
}

impl Store {
  /// Open (creating if missing) the database at `database_url` and apply migrations.
  pub async fn connect(database_url: &str) -> Result<Self> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    info!(target: "carecomm_backend", %database_url, "Database connected");
    Self::migrated(pool).await
  }

  async fn migrated(pool: SqlitePool) -> Result<Self> {
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Self { pool })
  }

  pub async fn ping(&self) -> Result<()> {
    sqlx::query("SELECT 1").execute(&self.pool).await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self, scenario), fields(id = %scenario.id))]
  pub async fn insert_scenario(&self, scenario: &Scenario) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO scenarios (id, title, description, category, difficulty, created_at, updated_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&scenario.id)
    .bind(&scenario.title)
    .bind(&scenario.description)
    .bind(scenario.category)
    .bind(scenario.difficulty)
    .bind(scenario.created_at)
    .bind(scenario.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn get_scenario(&self, id: &str) -> Result<Option<Scenario>> {
    let scenario = sqlx::query_as::<_, Scenario>(
      "SELECT id, title, description, category, difficulty, created_at FROM scenarios WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(scenario)
  }

  #[instrument(level = "debug", skip(self, response), fields(id = %response.id, scenario_id = %response.scenario_id))]
  pub async fn insert_response(&self, response: &UserResponse) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO responses (id, scenario_id, response_text, score, feedback, submitted_at, updated_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&response.id)
    .bind(&response.scenario_id)
    .bind(&response.response_text)
    .bind(response.score)
    .bind(&response.feedback)
    .bind(response.submitted_at)
    .bind(response.submitted_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// Set score/feedback on a response that has none yet.
  /// Returns false if the row is missing or already evaluated.
  #[instrument(level = "debug", skip(self, evaluation), fields(score = evaluation.score))]
  pub async fn record_evaluation(&self, response_id: &str, evaluation: &Evaluation) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE responses SET score = ?, feedback = ?, updated_at = ? WHERE id = ? AND score IS NULL",
    )
    .bind(evaluation.score)
    .bind(&evaluation.feedback)
    .bind(Utc::now())
    .bind(response_id)
    .execute(&self.pool)
    .await?;
    let updated = result.rows_affected() == 1;
    debug!(target: "response", %response_id, updated, "Evaluation recorded");
    Ok(updated)
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn get_response(&self, id: &str) -> Result<Option<UserResponse>> {
    let response = sqlx::query_as::<_, UserResponse>(
      "SELECT id, scenario_id, response_text, score, feedback, submitted_at FROM responses WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(response)
  }

  /// Most recent first.
  #[instrument(level = "debug", skip(self))]
  pub async fn list_responses_for_scenario(&self, scenario_id: &str, limit: u32) -> Result<Vec<UserResponse>> {
    let rows = sqlx::query_as::<_, UserResponse>(
      r#"
      SELECT id, scenario_id, response_text, score, feedback, submitted_at
      FROM responses
      WHERE scenario_id = ?
      ORDER BY submitted_at DESC, rowid DESC
      LIMIT ?
      "#,
    )
    .bind(scenario_id)
    .bind(i64::from(limit))
    .fetch_all(&self.pool)
    .await?;
    Ok(rows)
  }
}

#[cfg(test)]
impl Store {
  /// Private in-memory database. A single, never-recycled connection keeps the schema alive.
  pub async fn in_memory() -> Result<Self> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;
    Self::migrated(pool).await
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}
