//! Provider-agnostic extraction types
//!
//! Every completion backend and the rule-based fallback produce the same
//! [`RawExtraction`] shape; nothing past the adapter boundary ever sees a
//! provider-native payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Direction;

/// Confidence below which an extraction is not actionable on its own.
///
/// An amount-less result at or below this level must trigger a clarification
/// prompt instead of a commit.
pub const LOW_CONFIDENCE: f64 = 0.3;

/// Untyped-but-tagged extraction result from one provider or the fallback.
///
/// Intermediate only: never persisted. Unset fields mean the text did not
/// mention them, not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    /// Relative phrase as written ("yesterday", "last friday"); resolved to
    /// an absolute date by the normalizer
    #[serde(default)]
    pub date_phrase: Option<String>,
    pub description: String,
    /// Provider-reported or heuristic, 0.0-1.0
    pub confidence: f64,
}

impl RawExtraction {
    /// Whether this extraction carries enough signal to commit without
    /// asking the user anything.
    pub fn is_actionable(&self) -> bool {
        match self.amount {
            Some(a) => a > 0.0,
            None => false,
        }
    }
}

/// Which path produced a [`RawExtraction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// A configured completion provider, by name
    Provider(String),
    /// The deterministic rule-based parser
    RuleParser,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionSource::Provider(name) => write!(f, "{}", name),
            ExtractionSource::RuleParser => write!(f, "rule_parser"),
        }
    }
}

/// Classified failure of a single provider call.
///
/// Each backend maps its native errors into exactly one of these kinds; the
/// orchestrator decides chain behavior from the kind alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// Bad credential; never retry this provider again this run
    AuthInvalid,
    /// Quota spent; skip until the quota window rolls over
    QuotaExceeded,
    /// Throttled; retry later, not now
    RateLimited,
    /// Call exceeded its deadline; terminal for this call, not a cancellation
    Timeout,
    /// Network or server hiccup; safe to move on immediately
    Transient(String),
    /// Provider replied but the body could not be shaped into a RawExtraction
    MalformedResponse(String),
}

impl ProviderFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderFailure::AuthInvalid => "auth_invalid",
            ProviderFailure::QuotaExceeded => "quota_exceeded",
            ProviderFailure::RateLimited => "rate_limited",
            ProviderFailure::Timeout => "timeout",
            ProviderFailure::Transient(_) => "transient",
            ProviderFailure::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Failures that disable the provider for the rest of the run
    /// (or until the quota window resets).
    pub fn is_disabling(&self) -> bool {
        matches!(
            self,
            ProviderFailure::AuthInvalid | ProviderFailure::QuotaExceeded
        )
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailure::Transient(msg) => write!(f, "transient: {}", msg),
            ProviderFailure::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Per-request context handed to providers to sharpen extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    /// Recently used categories, most recent first
    pub recent_categories: Vec<String>,
    /// Known alias shorthands (keys only; canonical mapping stays local)
    pub known_aliases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_requires_positive_amount() {
        let mut raw = RawExtraction {
            amount: Some(100.0),
            confidence: 0.9,
            ..Default::default()
        };
        assert!(raw.is_actionable());

        raw.amount = Some(0.0);
        assert!(!raw.is_actionable());

        raw.amount = None;
        assert!(!raw.is_actionable());
    }

    #[test]
    fn test_failure_disabling_kinds() {
        assert!(ProviderFailure::AuthInvalid.is_disabling());
        assert!(ProviderFailure::QuotaExceeded.is_disabling());
        assert!(!ProviderFailure::Timeout.is_disabling());
        assert!(!ProviderFailure::RateLimited.is_disabling());
        assert!(!ProviderFailure::Transient("boom".into()).is_disabling());
    }
}
