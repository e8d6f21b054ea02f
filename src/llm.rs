use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Decode parameters sent with a single chat call.
#[derive(Debug, Clone, Copy)]
pub struct Decode {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub max_tokens: Option<u32>,
}

/// The one seam the rest of the crate talks to an LLM vendor through.
/// Everything vendor-specific — auth header shape, request/response wire
/// format, model routing — lives behind this trait; the orchestrator never
/// sees it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        decode: Decode,
    ) -> AppResult<String>;
}

pub struct ReqwestLlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ReqwestLlmClient {
    pub fn new(base_url: String, api_key: String, model: String, timeout_secs: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for ReqwestLlmClient {
    async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        decode: Decode,
    ) -> AppResult<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": decode.temperature,
            "top_p": decode.top_p,
            "presence_penalty": decode.presence_penalty,
            "frequency_penalty": decode.frequency_penalty,
            "response_format": {"type": "json_object"},
        });
        if let Some(max_tokens) = decode.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let response_json: Value = response.json().await?;

        if let Some(error) = response_json.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown vendor error");
            return Err(AppError::LlmTransport(message.to_string()));
        }

        response_json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::LlmTransport("no content in vendor response".to_string()))
    }
}

/// Exponential backoff between adapter retries, capped well under the
/// per-turn pacing budget so it never changes observable turn timing
/// beyond jitter.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 250,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}
