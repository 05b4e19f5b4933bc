//! OpenRouter backend implementation
//!
//! Hosted chat-completions endpoint speaking the OpenAI wire shape with
//! Bearer authentication. The adapter owns the full request/response format;
//! callers only ever see [`RawExtraction`] or a classified
//! [`ProviderFailure`].
//!
//! # Configuration
//!
//! Environment variables:
//! - `PAISA_OPENROUTER_API_KEY`: API key (required)
//! - `PAISA_OPENROUTER_MODEL`: Model name (default: google/gemini-2.0-flash-exp:free)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parsing::parse_extraction;
use super::types::{ExtractionContext, ProviderFailure, RawExtraction};
use super::{extraction_prompt, CompletionBackend};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// OpenRouter chat-completions adapter
#[derive(Clone)]
pub struct OpenRouterBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
    name: String,
}

impl OpenRouterBackend {
    /// Create a new OpenRouter backend with the default per-call timeout
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_timeout(api_key, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create with an explicit per-call timeout
    pub fn with_timeout(api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("HTTP client construction"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            name: "openrouter".to_string(),
        }
    }

    /// Point the adapter at a different endpoint (tests, proxies)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Override the provider identifier used in health bookkeeping
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Create from environment variables
    ///
    /// Required: `PAISA_OPENROUTER_API_KEY`
    /// Optional: `PAISA_OPENROUTER_MODEL`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("PAISA_OPENROUTER_API_KEY").ok()?;
        let model =
            std::env::var("PAISA_OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(&api_key, &model))
    }

    /// Make a chat completion request, classifying every failure mode
    async fn chat_completion(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(0.3),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::MalformedResponse(format!("invalid body: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderFailure::MalformedResponse("empty choices".into()))
    }
}

/// Map an HTTP status (plus body, for 429 disambiguation) to a failure kind.
fn classify_status(status: StatusCode, body: &str) -> ProviderFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderFailure::AuthInvalid,
        StatusCode::PAYMENT_REQUIRED => ProviderFailure::QuotaExceeded,
        StatusCode::TOO_MANY_REQUESTS => {
            // Daily-quota exhaustion and short-term throttling share a status
            // code; the body text tells them apart.
            let lower = body.to_lowercase();
            if lower.contains("quota") || lower.contains("limit exceeded") {
                ProviderFailure::QuotaExceeded
            } else {
                ProviderFailure::RateLimited
            }
        }
        s if s.is_server_error() => {
            ProviderFailure::Transient(format!("server error {}", s.as_u16()))
        }
        s => ProviderFailure::Transient(format!("unexpected status {}", s.as_u16())),
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ProviderFailure {
    if e.is_timeout() {
        ProviderFailure::Timeout
    } else {
        ProviderFailure::Transient(e.to_string())
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
    ) -> Result<RawExtraction, ProviderFailure> {
        let prompt = extraction_prompt(text, ctx);
        let response = self.chat_completion(&prompt).await?;
        debug!(provider = %self.name, chars = response.len(), "Provider replied");
        parse_extraction(&response, text)
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// OpenAI-shaped chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}
