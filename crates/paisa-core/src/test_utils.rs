//! Test utilities for paisa-core
//!
//! This module provides testing infrastructure including a mock completion
//! provider server that can be used for development and adapter tests. It
//! speaks both wire dialects the adapters use: OpenAI-style chat completions
//! and Ollama's generate endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// How the mock server answers extraction requests.
#[derive(Clone)]
enum MockMode {
    /// Scrape the statement out of the prompt and answer with a plausible
    /// extraction JSON
    Extract,
    /// Always reply with this status and body
    Fail { status: u16, body: String },
    /// Reply 200 with a body that is not the expected JSON shape
    Garbage,
}

#[derive(Clone)]
struct MockState {
    mode: MockMode,
}

/// Mock completion-provider server for testing and development
pub struct MockProviderServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start a well-behaved mock on an available port
    pub async fn start() -> Self {
        Self::start_with_mode(MockMode::Extract).await
    }

    /// Start a mock that fails every completion call with the given status
    pub async fn start_failing(status: u16, body: &str) -> Self {
        Self::start_with_mode(MockMode::Fail {
            status,
            body: body.to_string(),
        })
        .await
    }

    /// Start a mock that replies 200 with an unparseable body
    pub async fn start_garbage() -> Self {
        Self::start_with_mode(MockMode::Garbage).await
    }

    async fn start_with_mode(mode: MockMode) -> Self {
        let state = Arc::new(MockState { mode });
        let app = Router::new()
            .route("/models", get(handle_models))
            .route("/chat/completions", post(handle_chat))
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a canned extraction reply from the statement inside the prompt.
fn extraction_reply(prompt: &str) -> String {
    let statement = prompt
        .split("Statement: \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or("");

    let amount = statement
        .split_whitespace()
        .find_map(|t| {
            t.trim_matches(|c: char| !c.is_ascii_digit() && c != '.')
                .parse::<f64>()
                .ok()
        })
        .filter(|a| *a > 0.0);

    let category = if statement.contains("grocer") {
        "groceries"
    } else if statement.contains("dinner") || statement.contains("lunch") {
        "food"
    } else {
        "other"
    };

    match amount {
        Some(a) => format!(
            r#"{{"amount": "{}", "direction": "debit", "category": "{}", "merchant": "", "date_phrase": "", "description": "{}", "confidence": 0.9}}"#,
            a, category, statement
        ),
        None => format!(
            r#"{{"amount": "", "direction": "debit", "category": "{}", "description": "{}", "confidence": 0.2}}"#,
            category, statement
        ),
    }
}

async fn handle_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        data: vec![ModelInfo {
            id: "mock-model".to_string(),
        }],
    })
}

async fn handle_chat(
    State(state): State<Arc<MockState>>,
    Json(request): Json<ChatRequest>,
) -> axum::response::Response {
    match &state.mode {
        MockMode::Fail { status, body } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body.clone(),
        )
            .into_response(),
        MockMode::Garbage => (StatusCode::OK, "no json here at all").into_response(),
        MockMode::Extract => {
            let prompt = request
                .messages
                .first()
                .map(|m| m.content.as_str())
                .unwrap_or("");
            Json(ChatResponse {
                choices: vec![ChatChoice {
                    message: ChatResponseMessage {
                        content: extraction_reply(prompt),
                    },
                }],
            })
            .into_response()
        }
    }
}

async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![OllamaModelInfo {
            name: "llama3.2:latest".to_string(),
        }],
    })
}

async fn handle_generate(
    State(state): State<Arc<MockState>>,
    Json(request): Json<GenerateRequest>,
) -> axum::response::Response {
    match &state.mode {
        MockMode::Fail { status, body } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body.clone(),
        )
            .into_response(),
        MockMode::Garbage => Json(GenerateResponse {
            model: request.model,
            response: "no json here at all".to_string(),
            done: true,
        })
        .into_response(),
        MockMode::Extract => Json(GenerateResponse {
            model: request.model,
            response: extraction_reply(&request.prompt),
            done: true,
        })
        .into_response(),
    }
}

// Request/Response types for the mock server

#[derive(Debug, Serialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[allow(dead_code)]
    model: String,
    messages: Vec<ChatRequestMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatRequestMessage {
    #[allow(dead_code)]
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Serialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Serialize)]
struct OllamaModelInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{ExtractionContext, ProviderFailure};
    use crate::ai::{CompletionBackend, OllamaBackend, OpenRouterBackend};

    #[tokio::test]
    async fn test_openrouter_adapter_against_mock() {
        let server = MockProviderServer::start().await;
        let backend = OpenRouterBackend::new("test-key", "mock-model").with_base_url(&server.url());

        assert!(backend.health_check().await);

        let raw = backend
            .extract("spent 500 on groceries at DMart", &ExtractionContext::default())
            .await
            .unwrap();
        assert_eq!(raw.amount, Some(500.0));
        assert_eq!(raw.category.as_deref(), Some("groceries"));
    }

    #[tokio::test]
    async fn test_openrouter_classifies_auth_failure() {
        let server = MockProviderServer::start_failing(401, "bad key").await;
        let backend = OpenRouterBackend::new("test-key", "mock-model").with_base_url(&server.url());

        let err = backend
            .extract("spent 500", &ExtractionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::AuthInvalid);
    }

    #[tokio::test]
    async fn test_openrouter_classifies_quota_429() {
        let server = MockProviderServer::start_failing(429, "Daily quota exceeded").await;
        let backend = OpenRouterBackend::new("test-key", "mock-model").with_base_url(&server.url());

        let err = backend
            .extract("spent 500", &ExtractionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_openrouter_classifies_rate_limit_429() {
        let server = MockProviderServer::start_failing(429, "please slow down").await;
        let backend = OpenRouterBackend::new("test-key", "mock-model").with_base_url(&server.url());

        let err = backend
            .extract("spent 500", &ExtractionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::RateLimited);
    }

    #[tokio::test]
    async fn test_openrouter_classifies_server_error_transient() {
        let server = MockProviderServer::start_failing(503, "overloaded").await;
        let backend = OpenRouterBackend::new("test-key", "mock-model").with_base_url(&server.url());

        let err = backend
            .extract("spent 500", &ExtractionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::Transient(_)));
    }

    #[tokio::test]
    async fn test_openrouter_garbage_body_is_malformed() {
        let server = MockProviderServer::start_garbage().await;
        let backend = OpenRouterBackend::new("test-key", "mock-model").with_base_url(&server.url());

        let err = backend
            .extract("spent 500", &ExtractionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_ollama_adapter_against_mock() {
        let server = MockProviderServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        assert!(backend.health_check().await);

        let raw = backend
            .extract("yesterday I paid 1000 for dinner", &ExtractionContext::default())
            .await
            .unwrap();
        assert_eq!(raw.amount, Some(1000.0));
        assert_eq!(raw.category.as_deref(), Some("food"));
    }

    #[tokio::test]
    async fn test_ollama_garbage_reply_is_malformed() {
        let server = MockProviderServer::start_garbage().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let err = backend
            .extract("spent 500", &ExtractionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::MalformedResponse(_)));
    }
}
