//! Mock backend for testing
//!
//! Returns canned extractions or scripted failures without any network
//! traffic. Orchestrator tests use the call counter to assert which
//! providers were (not) attempted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::models::Direction;

use super::types::{ExtractionContext, ProviderFailure, RawExtraction};
use super::CompletionBackend;

/// Scriptable mock completion backend
#[derive(Clone, Default)]
pub struct MockBackend {
    name: String,
    /// Scripted outcomes, consumed in order; empty falls back to the canned
    /// heuristic extraction
    script: Arc<Mutex<VecDeque<Result<RawExtraction, ProviderFailure>>>>,
    /// Failure repeated forever when the script is empty
    sticky_failure: Option<ProviderFailure>,
    calls: Arc<AtomicUsize>,
    healthy: bool,
}

impl MockBackend {
    /// Create a healthy mock that answers with a canned extraction
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            sticky_failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
            healthy: true,
        }
    }

    pub fn named(name: &str) -> Self {
        let mut mock = Self::new();
        mock.name = name.to_string();
        mock
    }

    /// Mock that fails every call with the given kind
    pub fn failing(name: &str, failure: ProviderFailure) -> Self {
        let mut mock = Self::named(name);
        mock.sticky_failure = Some(failure);
        mock
    }

    /// Queue an outcome to be returned on the next call
    pub fn push_outcome(&self, outcome: Result<RawExtraction, ProviderFailure>) {
        self.script.lock().expect("mock script lock").push_back(outcome);
    }

    /// Number of extract() calls made against this mock
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Canned deterministic extraction: first number becomes the amount
    fn canned(text: &str) -> RawExtraction {
        let amount = text
            .split_whitespace()
            .find_map(|t| t.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f64>().ok())
            .filter(|a| *a > 0.0);
        let confidence = if amount.is_some() { 0.9 } else { 0.2 };

        RawExtraction {
            amount,
            direction: Some(Direction::Debit),
            category: Some("other".to_string()),
            merchant: None,
            date_phrase: None,
            description: text.to_string(),
            confidence,
        }
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn extract(
        &self,
        text: &str,
        _ctx: &ExtractionContext,
    ) -> Result<RawExtraction, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(outcome) = self.script.lock().expect("mock script lock").pop_front() {
            return outcome;
        }
        if let Some(failure) = &self.sticky_failure {
            return Err(failure.clone());
        }
        Ok(Self::canned(text))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_canned_extraction() {
        let mock = MockBackend::new();
        let raw = mock
            .extract("spent 500 on groceries", &ExtractionContext::default())
            .await
            .unwrap();
        assert_eq!(raw.amount, Some(500.0));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_then_success() {
        let mock = MockBackend::new();
        mock.push_outcome(Err(ProviderFailure::Timeout));

        let first = mock.extract("x", &ExtractionContext::default()).await;
        assert_eq!(first.unwrap_err(), ProviderFailure::Timeout);

        let second = mock.extract("paid 20", &ExtractionContext::default()).await;
        assert!(second.is_ok());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_sticky_failure() {
        let mock = MockBackend::failing("broken", ProviderFailure::AuthInvalid);
        for _ in 0..3 {
            let out = mock.extract("x", &ExtractionContext::default()).await;
            assert_eq!(out.unwrap_err(), ProviderFailure::AuthInvalid);
        }
        assert_eq!(mock.call_count(), 3);
    }
}
