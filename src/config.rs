use crate::error::{AppError, AppResult};
use log::info;
use serde::{Deserialize, Serialize};

/// Engine-wide pacing, threshold and connection configuration, loaded from
/// the environment rather than a settings file — this crate has no desktop
/// shell to own a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub llm_retry_backoff_ms: u64,
    pub speech_similarity_threshold: f32,
    pub vote_similarity_threshold: f32,
    pub scheduler_max_iterations: u32,
    pub vote_grace_period_ms: u64,
    pub min_speech_len: usize,
    pub max_speech_len: usize,
    pub speech_skip_limit: u32,
    pub database_url: String,
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "https://api.openai.com".to_string(),
            llm_api_key: String::new(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_timeout_secs: 30,
            llm_max_retries: 2,
            llm_retry_backoff_ms: 250,
            speech_similarity_threshold: 0.45,
            vote_similarity_threshold: 0.46,
            scheduler_max_iterations: 160,
            vote_grace_period_ms: 50,
            min_speech_len: 10,
            max_speech_len: 38,
            speech_skip_limit: 1,
            database_url: "sqlite://mindwolf.db".to_string(),
            event_channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let config = Self {
            llm_base_url: env_or(defaults.llm_base_url, "MINDWOLF_LLM_BASE_URL"),
            llm_api_key: std::env::var("MINDWOLF_LLM_API_KEY").unwrap_or_default(),
            llm_model: env_or(defaults.llm_model, "MINDWOLF_LLM_MODEL"),
            llm_timeout_secs: env_parsed(defaults.llm_timeout_secs, "MINDWOLF_LLM_TIMEOUT_SECS")?,
            llm_max_retries: env_parsed(defaults.llm_max_retries, "MINDWOLF_LLM_MAX_RETRIES")?,
            llm_retry_backoff_ms: env_parsed(
                defaults.llm_retry_backoff_ms,
                "MINDWOLF_LLM_RETRY_BACKOFF_MS",
            )?,
            speech_similarity_threshold: env_parsed(
                defaults.speech_similarity_threshold,
                "MINDWOLF_SPEECH_SIMILARITY_THRESHOLD",
            )?,
            vote_similarity_threshold: env_parsed(
                defaults.vote_similarity_threshold,
                "MINDWOLF_VOTE_SIMILARITY_THRESHOLD",
            )?,
            scheduler_max_iterations: env_parsed(
                defaults.scheduler_max_iterations,
                "MINDWOLF_SCHEDULER_MAX_ITERATIONS",
            )?,
            vote_grace_period_ms: env_parsed(
                defaults.vote_grace_period_ms,
                "MINDWOLF_VOTE_GRACE_PERIOD_MS",
            )?,
            min_speech_len: env_parsed(defaults.min_speech_len, "MINDWOLF_MIN_SPEECH_LEN")?,
            max_speech_len: env_parsed(defaults.max_speech_len, "MINDWOLF_MAX_SPEECH_LEN")?,
            speech_skip_limit: env_parsed(defaults.speech_skip_limit, "MINDWOLF_SPEECH_SKIP_LIMIT")?,
            database_url: env_or(defaults.database_url, "MINDWOLF_DATABASE_URL"),
            event_channel_capacity: env_parsed(
                defaults.event_channel_capacity,
                "MINDWOLF_EVENT_CHANNEL_CAPACITY",
            )?,
        };

        info!("loaded engine config from environment");
        Ok(config)
    }
}

fn env_or(default: String, key: &str) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(default: T, key: &str) -> AppResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {key}"))),
        Err(_) => Ok(default),
    }
}
