//! Application state shared by all handlers: immutable settings, the store, and the
//! completion client. Nothing here is mutated per request.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::completion::CompletionClient;
use crate::config::Settings;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Store,
    pub completion: CompletionClient,
}

impl AppState {
    /// Connect the store (running migrations) and build the completion client.
    #[instrument(level = "info", skip_all)]
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let store = Store::connect(&settings.database_url).await?;
        let completion = CompletionClient::new(&settings.completion, settings.prompts.clone())?;

        info!(
            target: "carecomm_backend",
            base_url = %completion.base_url(),
            model = %completion.model(),
            api_key = settings.completion.api_key.is_some(),
            timeout = ?settings.completion.timeout,
            "Completion endpoint configured"
        );
        info!(
            target: "carecomm_backend",
            rate_limit_per_minute = settings.rate_limit_per_minute,
            "Rate limit configured (not enforced)"
        );

        Ok(Self::from_parts(settings, store, completion))
    }

    pub fn from_parts(settings: Settings, store: Store, completion: CompletionClient) -> Self {
        Self { settings: Arc::new(settings), store, completion }
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory store plus a completion client aimed at `completion_base_url`.
    pub async fn for_tests(completion_base_url: &str) -> Self {
        use std::time::Duration;

        use crate::config::{CompletionSettings, Prompts};

        let settings = Settings {
            port: 0,
            database_url: "sqlite::memory:".into(),
            completion: CompletionSettings {
                base_url: completion_base_url.to_string(),
                timeout: Duration::from_secs(5),
                ..CompletionSettings::default()
            },
            allowed_origins: vec!["http://localhost:3000".into()],
            rate_limit_per_minute: 100,
            prompts: Prompts::default(),
        };
        let store = Store::in_memory().await.unwrap();
        let completion = CompletionClient::new(&settings.completion, settings.prompts.clone()).unwrap();
        Self::from_parts(settings, store, completion)
    }
}
