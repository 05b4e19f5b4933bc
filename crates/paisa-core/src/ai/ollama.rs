//! Ollama backend implementation
//!
//! Local completion server, typically the second link in the provider chain
//! when a hosted provider is unavailable. Speaks the `/api/generate`
//! endpoint.
//!
//! # Configuration
//!
//! Environment variables:
//! - `PAISA_OLLAMA_HOST`: Server URL (required, e.g. http://localhost:11434)
//! - `PAISA_OLLAMA_MODEL`: Model name (default: llama3.2)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parsing::parse_extraction;
use super::types::{ExtractionContext, ProviderFailure, RawExtraction};
use super::{extraction_prompt, CompletionBackend};

const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Local Ollama adapter
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    name: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend with the default per-call timeout
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_timeout(base_url, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create with an explicit per-call timeout
    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("HTTP client construction"),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            name: "ollama".to_string(),
        }
    }

    /// Override the provider identifier used in health bookkeeping
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Create from environment variables
    ///
    /// Required: `PAISA_OLLAMA_HOST`
    /// Optional: `PAISA_OLLAMA_MODEL`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("PAISA_OLLAMA_HOST").ok()?;
        let model = std::env::var("PAISA_OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(&host, &model))
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderFailure::Timeout
                } else {
                    ProviderFailure::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A missing model or overloaded local server are both worth
            // moving past immediately; Ollama has no auth or quota surface.
            return Err(ProviderFailure::Transient(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::MalformedResponse(format!("invalid body: {}", e)))?;

        Ok(generate_response.response)
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
    ) -> Result<RawExtraction, ProviderFailure> {
        let prompt = extraction_prompt(text, ctx);
        let response = self.generate(&prompt).await?;
        debug!(provider = %self.name, chars = response.len(), "Provider replied");
        parse_extraction(&response, text)
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/api/tags", self.base_url))
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

/// Ollama generate request
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_and_host() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.model(), "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.name(), "ollama");
    }

    #[test]
    fn test_from_env_not_set() {
        std::env::remove_var("PAISA_OLLAMA_HOST");
        assert!(OllamaBackend::from_env().is_none());
    }
}
