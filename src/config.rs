//! Service configuration: an immutable `Settings` value built once at startup from
//! environment variables, plus prompt texts that may be overridden from TOML.
//!
//! See `Settings::from_env` for the recognized variables and `Prompts` for the TOML schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

/// Everything the service reads from its environment. Never mutated after construction.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub database_url: String,
  pub completion: CompletionSettings,
  pub allowed_origins: Vec<String>,
  /// Recorded for operators; no request path consults it.
  pub rate_limit_per_minute: u32,
  pub prompts: Prompts,
}

/// Connection details for the chat-completion endpoint.
#[derive(Clone, Debug)]
pub struct CompletionSettings {
  pub base_url: String,
  pub api_key: Option<String>,
  pub model: String,
  pub timeout: Duration,
}

impl Default for CompletionSettings {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:1234".into(),
      api_key: None,
      model: "local-model".into(),
      timeout: Duration::from_secs(30),
    }
  }
}

impl Settings {
  /// Build settings from env:
  ///   PORT                    : u16 (default 8000)
  ///   DATABASE_URL            : default "sqlite://healthcare_bot.db"
  ///   LM_STUDIO_BASE_URL      : default "http://localhost:1234"
  ///   LM_STUDIO_API_KEY       : bearer token; empty or unset sends no Authorization header
  ///   LM_STUDIO_MODEL         : default "local-model"
  ///   LM_STUDIO_TIMEOUT_SECS  : default 30
  ///   ALLOWED_ORIGINS         : comma-separated CORS origins
  ///   RATE_LIMIT_PER_MINUTE   : default 100
  ///   PROMPTS_CONFIG_PATH     : TOML file with a `[prompts]` table
  pub fn from_env() -> Self {
    let defaults = CompletionSettings::default();
    let completion = CompletionSettings {
      base_url: env_or("LM_STUDIO_BASE_URL", &defaults.base_url),
      api_key: std::env::var("LM_STUDIO_API_KEY").ok().filter(|k| !k.trim().is_empty()),
      model: env_or("LM_STUDIO_MODEL", &defaults.model),
      timeout: Duration::from_secs(env_parsed("LM_STUDIO_TIMEOUT_SECS", 30)),
    };

    let allowed_origins = env_or("ALLOWED_ORIGINS", "http://localhost:3000,http://127.0.0.1:3000")
      .split(',')
      .map(|o| o.trim().to_string())
      .filter(|o| !o.is_empty())
      .collect();

    Self {
      port: env_parsed("PORT", 8000),
      database_url: env_or("DATABASE_URL", "sqlite://healthcare_bot.db"),
      completion,
      allowed_origins,
      rate_limit_per_minute: env_parsed("RATE_LIMIT_PER_MINUTE", 100),
      prompts: load_prompts_from_env().unwrap_or_default(),
    }
  }
}

fn env_or(key: &str, default: &str) -> String {
  std::env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
  match std::env::var(key) {
    Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
      warn!(target: "carecomm_backend", %key, value = %raw, %default, "Unparseable setting; using default");
      default
    }),
    Err(_) => default,
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
struct PromptConfig {
  #[serde(default)]
  prompts: Prompts,
}

/// Prompt texts used by the completion client. Templates use `{key}` placeholders:
/// scenario: `{category}`, `{difficulty}`; evaluation: `{scenario_title}`,
/// `{scenario_description}`, `{user_response}`.
/// Any subset may be overridden in TOML; missing keys keep the built-in text.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Prompts {
  pub scenario_system: String,
  pub scenario_user_template: String,
  pub evaluation_system: String,
  pub evaluation_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      scenario_system: "You are a healthcare communication trainer.
Generate simple practice scenarios.
Your goals are:
- Help users practice medical nursing communication effectively.
- Provide a comprehensive scenario which is possible in real life.
- Train users on medical communication (i.e. to nurses).
- Focus on clinical, patient-facing, and inter-professional communication.
- Politely redirect users when they ask something unrelated to medical scenario generation.".into(),
      scenario_user_template: "Generate a healthcare communication scenario for practice.

Requirements:
- Category: {category}
- Difficulty: {difficulty}
- Keep it simple and realistic
- Focus on communication skills practice

Respond with JSON format only:
{
    \"title\": \"Clear, brief scenario title\",
    \"description\": \"Simple scenario description for healthcare communication practice\"
}".into(),
      evaluation_system: "You are a healthcare communication expert specializing in nursing communication in healthcare settings.
Your task is to evaluate nurse responses to patients, families, and colleagues.
Provide detailed, constructive feedback with the following focus areas:

1. Clarity: Is the response easy to understand for the intended audience (patient, family, or healthcare professional)?
2. Accuracy: Does it provide correct, relevant, and safe medical information without overstepping nursing scope of practice?
3. Empathy & Tone: Does the response show compassion, respect, and support while maintaining professionalism?
4. Patient-Centeredness: Does it address the patient's needs, concerns, and emotional state?
5. Cultural & Linguistic Sensitivity: Is the response inclusive, respectful of diversity, and free from jargon or bias?
6. Professional Standards: Does it comply with ethical, legal, and documentation standards expected in nursing practice?

When giving feedback:
- Highlight strengths in the response.
- Point out gaps or risks (e.g., confusing phrasing, missing reassurance, inaccurate details).
- Suggest specific improvements for better communication.".into(),
      evaluation_user_template: "Evaluate this healthcare communication response on a scale of 1-10.

SCENARIO:
{scenario_title}
{scenario_description}

USER'S RESPONSE:
{user_response}

Rate the response and give brief feedback. Respond with JSON only:
{
    \"score\": 7.5,
    \"feedback\": \"feedback explaining the score and suggestions for improvement\"
}".into(),
    }
  }
}

/// Attempt to load prompt overrides from PROMPTS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_prompts_from_env() -> Option<Prompts> {
  let path = std::env::var("PROMPTS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_prompts(&s) {
      Ok(prompts) => {
        info!(target: "carecomm_backend", %path, "Loaded prompt overrides (TOML)");
        Some(prompts)
      }
      Err(e) => {
        error!(target: "carecomm_backend", %path, error = %e, "Failed to parse TOML prompts");
        None
      }
    },
    Err(e) => {
      error!(target: "carecomm_backend", %path, error = %e, "Failed to read TOML prompts file");
      None
    }
  }
}

fn parse_prompts(raw: &str) -> Result<Prompts, toml::de::Error> {
  toml::from_str::<PromptConfig>(raw).map(|cfg| cfg.prompts)
}
