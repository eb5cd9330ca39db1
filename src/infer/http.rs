//! HTTP oracle transport
//!
//! OpenAI-compatible chat-completions client. Works against any provider
//! exposing that surface (OpenAI, DeepSeek, local gateways) by switching
//! the base URL. One attempt per call: a failed candidate is simply
//! skipped this pass, so transport-level retries would only delay the
//! rest of the batch.

use super::{Oracle, OracleError};
use crate::config::OracleConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base URL for the OpenAI provider.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default base URL for the DeepSeek provider.
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Response token cap; relation and verdict replies are short by contract.
const MAX_TOKENS: u32 = 200;

/// Chat-completions oracle transport.
pub struct HttpOracle {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpOracle {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature,
            client,
        }
    }

    /// Build a transport from config, resolving the provider's base URL.
    pub fn from_config(config: &OracleConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| {
            if config.provider.eq_ignore_ascii_case("deepseek") {
                DEEPSEEK_BASE_URL.to_string()
            } else {
                OPENAI_BASE_URL.to_string()
            }
        });
        Self::new(
            base_url,
            config.api_key.clone(),
            config.model.clone(),
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!("HTTP {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(format!("malformed completion body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OracleError::Parse("completion had no choices".to_string()))
    }
}
