//! Pluggable completion-provider abstraction
//!
//! This module wraps each external natural-language completion service behind
//! a uniform call contract. The rest of the pipeline only ever sees
//! [`RawExtraction`] and the classified [`ProviderFailure`] kinds; every
//! provider-native wire format is absorbed inside its adapter.
//!
//! # Architecture
//!
//! - `CompletionBackend` trait: the adapter contract (extract + health)
//! - `ProviderClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch
//! - Backend implementations: `OpenRouterBackend`, `OllamaBackend`,
//!   `MockBackend`
//! - `ProviderChain`: priority-ordered orchestration with health tracking
//!   and the rule-based fallback
//!
//! # Configuration
//!
//! Environment variables:
//! - `PAISA_OPENROUTER_API_KEY` / `PAISA_OPENROUTER_MODEL`
//! - `PAISA_OLLAMA_HOST` / `PAISA_OLLAMA_MODEL`

mod mock;
mod ollama;
mod openrouter;
pub mod orchestrator;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openrouter::OpenRouterBackend;
pub use orchestrator::{ChainConfig, ProviderChain, ProviderHealthState};
pub use types::*;

use async_trait::async_trait;

/// The adapter contract every completion provider implements.
///
/// `extract` is bounded by a fixed per-call timeout baked into the adapter's
/// HTTP client; a timeout surfaces as [`ProviderFailure::Timeout`], never as
/// a hang. Backends must be Send + Sync for use across async tasks.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Turn free text into a [`RawExtraction`], or report a classified failure.
    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
    ) -> Result<RawExtraction, ProviderFailure>;

    /// Whether the backend currently looks reachable
    async fn health_check(&self) -> bool;

    /// Stable provider identifier (used for health bookkeeping and logs)
    fn name(&self) -> &str;

    /// Model in use (for logs)
    fn model(&self) -> &str;
}

/// Concrete provider client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ProviderClient {
    /// OpenRouter (hosted, OpenAI-compatible chat completions)
    OpenRouter(OpenRouterBackend),
    /// Local Ollama server
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl ProviderClient {
    /// Create a mock backend for testing
    pub fn mock() -> Self {
        ProviderClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl CompletionBackend for ProviderClient {
    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
    ) -> Result<RawExtraction, ProviderFailure> {
        match self {
            ProviderClient::OpenRouter(b) => b.extract(text, ctx).await,
            ProviderClient::Ollama(b) => b.extract(text, ctx).await,
            ProviderClient::Mock(b) => b.extract(text, ctx).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ProviderClient::OpenRouter(b) => b.health_check().await,
            ProviderClient::Ollama(b) => b.health_check().await,
            ProviderClient::Mock(b) => b.health_check().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ProviderClient::OpenRouter(b) => b.name(),
            ProviderClient::Ollama(b) => b.name(),
            ProviderClient::Mock(b) => b.name(),
        }
    }

    fn model(&self) -> &str {
        match self {
            ProviderClient::OpenRouter(b) => b.model(),
            ProviderClient::Ollama(b) => b.model(),
            ProviderClient::Mock(b) => b.model(),
        }
    }
}

/// Shared extraction prompt used by every text-completion adapter.
///
/// Providers are asked for a single JSON object in the exact shape
/// [`parsing::parse_extraction`] understands.
pub(crate) fn extraction_prompt(text: &str, ctx: &ExtractionContext) -> String {
    let mut prompt = format!(
        r#"Parse this expense statement and extract structured fields.

Statement: "{}"

Return ONLY a JSON object with these exact keys:
- amount: numeric value only (no currency symbols), or "" if not mentioned
- direction: "debit" for money spent, "credit" for money received
- category: one of groceries, food, transport, shopping, bills, entertainment, fuel, or the user's own word
- merchant: store/person if mentioned, else ""
- date_phrase: relative time reference as written ("today", "yesterday", "last friday"), or "" if absent
- description: short summary of what was bought/paid
- confidence: 0.0-1.0, how sure you are about the amount and category

Example: {{"amount": "500", "direction": "debit", "category": "groceries", "merchant": "DMart", "date_phrase": "today", "description": "monthly groceries", "confidence": 0.9}}"#,
        text.replace('"', "'")
    );

    if !ctx.recent_categories.is_empty() {
        prompt.push_str(&format!(
            "\n\nCategories this user spends in most often: {}",
            ctx.recent_categories.join(", ")
        ));
    }
    if !ctx.known_aliases.is_empty() {
        prompt.push_str(&format!(
            "\nShorthand tokens the user has defined (keep them as-is in category): {}",
            ctx.known_aliases.join(", ")
        ));
    }

    prompt
}
