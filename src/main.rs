//! CareComm · Healthcare Communication Training Backend
//!
//! - Axum HTTP API for practice scenarios and scored responses
//! - OpenAI-compatible completion endpoint (LM Studio by default) with canned fallbacks
//! - SQLite persistence via sqlx (migrations run at startup)
//!
//! Important env variables:
//!   PORT                   : u16 (default 8000)
//!   DATABASE_URL           : default "sqlite://healthcare_bot.db"
//!   LM_STUDIO_BASE_URL     : default "http://localhost:1234"
//!   LM_STUDIO_API_KEY      : optional bearer token
//!   LM_STUDIO_MODEL        : default "local-model"
//!   LM_STUDIO_TIMEOUT_SECS : default 30
//!   ALLOWED_ORIGINS        : comma separated CORS origins
//!   PROMPTS_CONFIG_PATH    : path to TOML prompt overrides
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default), "compact" or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod prompts;
mod fallbacks;
mod parse;
mod completion;
mod store;
mod error;
mod protocol;
mod state;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  telemetry::init_tracing();

  let settings = Settings::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

  // Shared state: SQLite store (migrated) and the completion client.
  let state = Arc::new(AppState::new(settings).await?);

  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "carecomm_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "carecomm_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "carecomm_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "carecomm_backend", "Shutdown signal received");
}
