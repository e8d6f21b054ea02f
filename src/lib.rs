mod commands;
mod config;
mod error;
mod events;
mod factory;
mod llm;
mod phase;
mod review;
mod rng;
mod scheduler;
mod store;
mod strategy;
mod turn_adapter;
mod types;
mod utils;
mod validator;

pub use commands::*;
pub use config::EngineConfig;
pub use error::{AppError, AppResult};
pub use events::{BroadcastEmitter, EventEmitter};
pub use llm::{LlmClient, ReqwestLlmClient, RetryConfig};
pub use store::{InMemoryStore, StateStore};
pub use types::*;

use log::info;
use std::sync::Arc;
use validator::ValidatorConfig;

/// Shared handle every command function takes: the state store, the event
/// emitter, the LLM client, and the pacing/threshold config, all behind
/// trait objects so callers can swap in test doubles.
pub struct Engine {
    pub store: Arc<dyn StateStore>,
    pub emitter: Arc<dyn EventEmitter>,
    pub llm: Arc<dyn LlmClient>,
    pub config: EngineConfig,
    pub retry: RetryConfig,
    pub validator_config: ValidatorConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn StateStore>,
        emitter: Arc<dyn EventEmitter>,
        llm: Arc<dyn LlmClient>,
        config: EngineConfig,
    ) -> Self {
        let retry = RetryConfig {
            max_attempts: config.llm_max_retries.max(1),
            base_delay_ms: config.llm_retry_backoff_ms,
            max_delay_ms: config.llm_retry_backoff_ms * 8,
        };
        let validator_config = ValidatorConfig {
            speech_min_len: config.min_speech_len,
            speech_max_len: config.max_speech_len,
            speech_similarity_threshold: config.speech_similarity_threshold,
            vote_similarity_threshold: config.vote_similarity_threshold,
        };

        Self {
            store,
            emitter,
            llm,
            config,
            retry,
            validator_config,
        }
    }
}

/// Initializes the `log`/`env_logger` pair once per process. Game id and
/// round number are attached as a log target prefix by callers rather than
/// interpolated into every message body.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();
    info!("mindwolf orchestrator logging initialized");
}
