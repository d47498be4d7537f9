//! Completion provider backends for Lumen — multi-vendor LLM support
//!
//! Provides a `CompletionBackend` trait with implementations for:
//! - **Mistral** — OpenAI-style `/v1/chat/completions` endpoint
//! - **Qwen** — Alibaba DashScope text-generation endpoint
//!
//! Exactly one backend is active per deployment, selected by
//! `provider.backend` in the config file.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Fixed text stored and returned in place of a completion when the upstream
/// call fails. The HTTP layer substitutes this after logging the real error.
pub const PROVIDER_ERROR_SENTINEL: &str = "Error getting response from the AI provider";

/// System instruction sent ahead of every user prompt (chat-style backends only).
const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer concisely and \
respond directly to the question. Use markdown formatting where it helps readability.";

const MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
const QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com";

const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CompletionBackend trait
// ============================================================================

/// Abstraction over completion providers. Implementations translate a plain
/// prompt into a vendor-specific request and extract the reply text verbatim.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send a single-turn completion request and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Completion request errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing completion content in response")]
    MissingContent,

    #[error("Missing API key ({env_var} not set)")]
    MissingApiKey { env_var: &'static str },

    #[error("Unknown provider backend: {0}")]
    UnknownBackend(String),
}

// ============================================================================
// Backend factory
// ============================================================================

/// Create the configured backend. Credentials come from the process
/// environment (`MISTRAL_API_KEY` / `QWEN_API_KEY`).
pub fn create_backend(
    config: &crate::config::ProviderConfig,
) -> Result<Box<dyn CompletionBackend>, ProviderError> {
    match config.backend.as_str() {
        "mistral" => {
            let key = api_key_from_env("MISTRAL_API_KEY")?;
            let mut client = MistralClient::new(key, config.model.clone())?;
            if let Some(base) = &config.base_url {
                client.base_url = base.clone();
            }
            Ok(Box::new(client))
        }
        "qwen" => {
            let key = api_key_from_env("QWEN_API_KEY")?;
            let mut client = QwenClient::new(key, config.model.clone())?;
            if let Some(base) = &config.base_url {
                client.base_url = base.clone();
            }
            Ok(Box::new(client))
        }
        other => Err(ProviderError::UnknownBackend(other.to_string())),
    }
}

fn api_key_from_env(env_var: &'static str) -> Result<String, ProviderError> {
    match std::env::var(env_var) {
        Ok(k) if !k.is_empty() => Ok(k),
        _ => Err(ProviderError::MissingApiKey { env_var }),
    }
}

fn build_http_client() -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?)
}

// ============================================================================
// Mistral API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct MistralRequest {
    model: String,
    messages: Vec<MistralMessage>,
}

#[derive(Debug, Serialize)]
struct MistralMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MistralResponse {
    choices: Vec<MistralChoice>,
}

#[derive(Debug, Deserialize)]
struct MistralChoice {
    message: MistralReply,
}

#[derive(Debug, Deserialize)]
struct MistralReply {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorResponse {
    error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

// ============================================================================
// MistralClient
// ============================================================================

/// Mistral completion client — calls the chat completions API.
#[derive(Debug, Clone)]
pub struct MistralClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl MistralClient {
    pub fn new(api_key: String, model: String) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::MissingApiKey {
                env_var: "MISTRAL_API_KEY",
            });
        }

        Ok(Self {
            client: build_http_client()?,
            api_key,
            model,
            base_url: MISTRAL_BASE_URL.to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, ProviderError> {
        let mut client = Self::new(api_key, model)?;
        client.base_url = base_url;
        Ok(client)
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = MistralRequest {
            model: self.model.clone(),
            messages: vec![
                MistralMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                MistralMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(decode_api_error(status.as_u16(), response).await);
        }

        let body: MistralResponse = response.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ProviderError::MissingContent)?;

        Ok(reply)
    }
}

#[async_trait]
impl CompletionBackend for MistralClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.complete_once(prompt).await
    }

    fn name(&self) -> &str {
        "mistral"
    }
}

// ============================================================================
// Qwen API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct QwenRequest {
    model: String,
    input: QwenInput,
}

#[derive(Debug, Serialize)]
struct QwenInput {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct QwenResponse {
    output: Option<QwenOutput>,
}

#[derive(Debug, Deserialize)]
struct QwenOutput {
    text: Option<String>,
}

// ============================================================================
// QwenClient
// ============================================================================

/// Qwen completion client — calls the DashScope text-generation API.
#[derive(Debug, Clone)]
pub struct QwenClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl QwenClient {
    pub fn new(api_key: String, model: String) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::MissingApiKey {
                env_var: "QWEN_API_KEY",
            });
        }

        Ok(Self {
            client: build_http_client()?,
            api_key,
            model,
            base_url: QWEN_BASE_URL.to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, ProviderError> {
        let mut client = Self::new(api_key, model)?;
        client.base_url = base_url;
        Ok(client)
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/api/v1/services/aigc/text-generation/generation",
            self.base_url
        );

        let request = QwenRequest {
            model: self.model.clone(),
            input: QwenInput {
                prompt: prompt.to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(decode_api_error(status.as_u16(), response).await);
        }

        let body: QwenResponse = response.json().await?;
        let reply = body
            .output
            .and_then(|o| o.text)
            .ok_or(ProviderError::MissingContent)?;

        Ok(reply)
    }
}

#[async_trait]
impl CompletionBackend for QwenClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.complete_once(prompt).await
    }

    fn name(&self) -> &str {
        "qwen"
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Decode a non-2xx provider response into an API error, falling back to the
/// raw body when the error shape doesn't parse.
async fn decode_api_error(code: u16, response: reqwest::Response) -> ProviderError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ProviderErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(body);

    tracing::error!(code = code, message = %message, "Provider API error");

    ProviderError::Api { code, message }
}

// ============================================================================
// TESTS
// ============================================================================
