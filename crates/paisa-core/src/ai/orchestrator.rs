//! Provider chain orchestration
//!
//! Tries configured completion providers strictly in priority order, tracks
//! per-provider health, and falls back to the deterministic rule parser when
//! every provider is exhausted or skipped. All provider failures are absorbed
//! here; callers always get a usable extraction.
//!
//! # State machine
//!
//! ```text
//! Idle -> Trying(i) -> Success ------------------> Done
//!            |            ^
//!            v            | (next provider)
//!         TryNext --------+
//!            |
//!            v (chain exhausted)
//!        Fallback -> Done
//! ```
//!
//! Skips (active cooldown, spent quota, dead credentials) happen before a
//! provider is attempted, so a skipped provider costs nothing. There is no
//! request-level retry loop on a single provider: end-to-end latency is
//! bounded by the sum of the configured per-call timeouts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::parser::RuleParser;

use super::types::{ExtractionContext, ExtractionSource, ProviderFailure, RawExtraction};
use super::{CompletionBackend, ProviderClient};

/// Chain-wide failure handling knobs.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Consecutive retryable failures before a cooldown is applied
    pub failure_threshold: u32,
    /// How long a provider sits out after hitting the threshold
    pub cooldown: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(120),
        }
    }
}

/// Mutable health record for one provider.
///
/// Process-wide; only the orchestrator writes to it, under the registry
/// mutex, so concurrent requests never double-count a failure.
#[derive(Debug, Clone, Default)]
pub struct ProviderHealthState {
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Set on AuthInvalid; sticky for the rest of the process run
    pub disabled_for_run: bool,
    /// Set on QuotaExceeded; clears when the quota window rolls over
    pub quota_exhausted_until: Option<DateTime<Utc>>,
    /// Remaining calls in the current quota window, when configured
    pub daily_quota_remaining: Option<u32>,
    /// Day the quota counter was last reset
    quota_day: Option<chrono::NaiveDate>,
}

impl ProviderHealthState {
    fn with_quota(daily_quota: Option<u32>) -> Self {
        Self {
            daily_quota_remaining: daily_quota,
            ..Default::default()
        }
    }

    /// Roll the daily quota counter over at the UTC day boundary.
    fn roll_quota_window(&mut self, now: DateTime<Utc>, configured_quota: Option<u32>) {
        let today = now.date_naive();
        if self.quota_day != Some(today) {
            self.quota_day = Some(today);
            self.daily_quota_remaining = configured_quota;
            if let Some(until) = self.quota_exhausted_until {
                if now >= until {
                    self.quota_exhausted_until = None;
                }
            }
        }
    }

    /// Whether the provider should be attempted at all right now.
    fn is_available(&self, now: DateTime<Utc>) -> bool {
        if self.disabled_for_run {
            return false;
        }
        if let Some(until) = self.quota_exhausted_until {
            if now < until {
                return false;
            }
        }
        if let Some(until) = self.cooldown_until {
            if now < until {
                return false;
            }
        }
        if self.daily_quota_remaining == Some(0) {
            return false;
        }
        true
    }

    fn note_success(&mut self) {
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        if let Some(remaining) = self.daily_quota_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    fn note_failure(&mut self, failure: &ProviderFailure, now: DateTime<Utc>, config: &ChainConfig) {
        match failure {
            ProviderFailure::AuthInvalid => {
                self.disabled_for_run = true;
            }
            ProviderFailure::QuotaExceeded => {
                self.daily_quota_remaining = Some(0);
                self.quota_exhausted_until = Some(next_utc_midnight(now));
            }
            ProviderFailure::RateLimited
            | ProviderFailure::Timeout
            | ProviderFailure::Transient(_)
            | ProviderFailure::MalformedResponse(_) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= config.failure_threshold {
                    self.cooldown_until = Some(
                        now + chrono::Duration::from_std(config.cooldown)
                            .unwrap_or_else(|_| chrono::Duration::seconds(120)),
                    );
                    self.consecutive_failures = 0;
                }
            }
        }
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + chrono::Duration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

/// Where the chain currently is for one request.
enum ChainState {
    Trying(usize),
    Fallback,
}

struct ProviderSlot {
    client: ProviderClient,
    daily_quota: Option<u32>,
}

/// Priority-ordered provider chain with the rule parser as the terminal link.
pub struct ProviderChain {
    providers: Vec<ProviderSlot>,
    fallback: RuleParser,
    config: ChainConfig,
    health: Mutex<HashMap<String, ProviderHealthState>>,
}

impl ProviderChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            providers: Vec::new(),
            fallback: RuleParser::new(),
            config,
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Append a provider at the lowest priority so far.
    pub fn add_provider(&mut self, client: ProviderClient) {
        self.add_provider_with_quota(client, None);
    }

    /// Append a provider with a daily call quota.
    pub fn add_provider_with_quota(&mut self, client: ProviderClient, daily_quota: Option<u32>) {
        let name = client.name().to_string();
        self.health
            .lock()
            .expect("health registry lock")
            .insert(name, ProviderHealthState::with_quota(daily_quota));
        self.providers.push(ProviderSlot {
            client,
            daily_quota,
        });
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Current health records, in chain priority order.
    pub fn health_snapshot(&self) -> Vec<(String, ProviderHealthState)> {
        let health = self.health.lock().expect("health registry lock");
        self.providers
            .iter()
            .map(|slot| {
                let name = slot.client.name().to_string();
                let state = health.get(&name).cloned().unwrap_or_default();
                (name, state)
            })
            .collect()
    }

    /// Extract structured fields from free text.
    ///
    /// Never fails: when the whole chain is down the deterministic rule
    /// parser answers, possibly with low confidence.
    pub async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
        today: chrono::NaiveDate,
    ) -> (RawExtraction, ExtractionSource) {
        let mut state = if self.providers.is_empty() {
            ChainState::Fallback
        } else {
            ChainState::Trying(0)
        };

        loop {
            match state {
                ChainState::Trying(i) => {
                    let slot = &self.providers[i];
                    let name = slot.client.name().to_string();

                    if !self.check_available(&slot.client, slot.daily_quota) {
                        debug!(provider = %name, "Skipping unavailable provider");
                        state = self.advance(i);
                        continue;
                    }

                    debug!(provider = %name, model = %slot.client.model(), "Trying provider");
                    match slot.client.extract(text, ctx).await {
                        Ok(raw) => {
                            self.record_success(&name);
                            info!(provider = %name, confidence = raw.confidence, "Extraction succeeded");
                            return (raw, ExtractionSource::Provider(name));
                        }
                        Err(failure) => {
                            warn!(
                                provider = %name,
                                kind = failure.kind(),
                                "Provider call failed, advancing"
                            );
                            self.record_failure(&name, &failure);
                            state = self.advance(i);
                        }
                    }
                }
                ChainState::Fallback => {
                    let raw = self.fallback.parse(text, today);
                    info!(
                        confidence = raw.confidence,
                        actionable = raw.is_actionable(),
                        "Rule-based fallback extraction"
                    );
                    return (raw, ExtractionSource::RuleParser);
                }
            }
        }
    }

    fn advance(&self, current: usize) -> ChainState {
        if current + 1 < self.providers.len() {
            ChainState::Trying(current + 1)
        } else {
            ChainState::Fallback
        }
    }

    fn check_available(&self, client: &ProviderClient, configured_quota: Option<u32>) -> bool {
        let now = Utc::now();
        let mut health = self.health.lock().expect("health registry lock");
        let state = health.entry(client.name().to_string()).or_default();
        state.roll_quota_window(now, configured_quota);
        state.is_available(now)
    }

    fn record_success(&self, name: &str) {
        let mut health = self.health.lock().expect("health registry lock");
        health.entry(name.to_string()).or_default().note_success();
    }

    fn record_failure(&self, name: &str, failure: &ProviderFailure) {
        let now = Utc::now();
        let mut health = self.health.lock().expect("health registry lock");
        health
            .entry(name.to_string())
            .or_default()
            .note_failure(failure, now, &self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 19).unwrap()
    }

    fn chain_of(mocks: Vec<MockBackend>) -> ProviderChain {
        let mut chain = ProviderChain::new(ChainConfig::default());
        for mock in mocks {
            chain.add_provider(ProviderClient::Mock(mock));
        }
        chain
    }

    #[tokio::test]
    async fn test_first_healthy_provider_wins() {
        let a = MockBackend::named("a");
        let b = MockBackend::named("b");
        let chain = chain_of(vec![a.clone(), b.clone()]);

        let (raw, source) = chain
            .extract("spent 100", &ExtractionContext::default(), today())
            .await;

        assert_eq!(source, ExtractionSource::Provider("a".into()));
        assert_eq!(raw.amount, Some(100.0));
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_advances_without_retry() {
        let a = MockBackend::failing("a", ProviderFailure::Timeout);
        let b = MockBackend::named("b");
        let chain = chain_of(vec![a.clone(), b.clone()]);

        let (_, source) = chain
            .extract("spent 100", &ExtractionContext::default(), today())
            .await;

        assert_eq!(source, ExtractionSource::Provider("b".into()));
        // Exactly one attempt against the failing provider for this request
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_invalid_is_sticky_for_run() {
        let a = MockBackend::failing("a", ProviderFailure::AuthInvalid);
        let b = MockBackend::named("b");
        let chain = chain_of(vec![a.clone(), b.clone()]);

        for _ in 0..3 {
            let (_, source) = chain
                .extract("spent 100", &ExtractionContext::default(), today())
                .await;
            assert_eq!(source, ExtractionSource::Provider("b".into()));
        }

        // First request attempted it once; after that it is skipped outright
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn test_quota_exhaustion_is_sticky_within_run() {
        let a = MockBackend::failing("a", ProviderFailure::QuotaExceeded);
        let b = MockBackend::named("b");
        let chain = chain_of(vec![a.clone(), b.clone()]);

        for _ in 0..4 {
            chain
                .extract("spent 100", &ExtractionContext::default(), today())
                .await;
        }

        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 4);
    }

    #[tokio::test]
    async fn test_all_exhausted_falls_back_to_rule_parser() {
        let a = MockBackend::failing("a", ProviderFailure::Timeout);
        let b = MockBackend::failing("b", ProviderFailure::Transient("down".into()));
        let chain = chain_of(vec![a, b]);

        let (raw, source) = chain
            .extract("spent 500 on groceries", &ExtractionContext::default(), today())
            .await;

        assert_eq!(source, ExtractionSource::RuleParser);
        assert_eq!(raw.amount, Some(500.0));
    }

    #[tokio::test]
    async fn test_empty_chain_uses_fallback() {
        let chain = ProviderChain::new(ChainConfig::default());
        let (raw, source) = chain
            .extract("paid 50 for snacks", &ExtractionContext::default(), today())
            .await;
        assert_eq!(source, ExtractionSource::RuleParser);
        assert_eq!(raw.amount, Some(50.0));
    }

    #[tokio::test]
    async fn test_fallback_never_fails_without_amount() {
        let chain = ProviderChain::new(ChainConfig::default());
        let (raw, source) = chain
            .extract("bought things", &ExtractionContext::default(), today())
            .await;
        assert_eq!(source, ExtractionSource::RuleParser);
        assert_eq!(raw.amount, None);
        assert!(!raw.is_actionable());
    }

    #[tokio::test]
    async fn test_cooldown_after_consecutive_failures() {
        let a = MockBackend::failing("a", ProviderFailure::RateLimited);
        let b = MockBackend::named("b");
        let mut chain = ProviderChain::new(ChainConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(3600),
        });
        chain.add_provider(ProviderClient::Mock(a.clone()));
        chain.add_provider(ProviderClient::Mock(b.clone()));

        for _ in 0..5 {
            chain
                .extract("spent 100", &ExtractionContext::default(), today())
                .await;
        }

        // Two attempts trip the threshold; the cooldown then blocks the rest
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 5);

        let snapshot = chain.health_snapshot();
        let (_, a_health) = &snapshot[0];
        assert!(a_health.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn test_daily_quota_counts_down() {
        let a = MockBackend::named("a");
        let b = MockBackend::named("b");
        let mut chain = ProviderChain::new(ChainConfig::default());
        chain.add_provider_with_quota(ProviderClient::Mock(a.clone()), Some(2));
        chain.add_provider(ProviderClient::Mock(b.clone()));

        for _ in 0..4 {
            chain
                .extract("spent 100", &ExtractionContext::default(), today())
                .await;
        }

        // Quota of two spent, then the chain moves on without attempting
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 2);
    }

    #[test]
    fn test_health_availability_rules() {
        let now = Utc::now();
        let mut state = ProviderHealthState::default();
        assert!(state.is_available(now));

        state.disabled_for_run = true;
        assert!(!state.is_available(now));

        let mut state = ProviderHealthState::default();
        state.cooldown_until = Some(now + chrono::Duration::seconds(60));
        assert!(!state.is_available(now));
        assert!(state.is_available(now + chrono::Duration::seconds(61)));

        let mut state = ProviderHealthState::default();
        state.quota_exhausted_until = Some(next_utc_midnight(now));
        assert!(!state.is_available(now));
    }

    #[test]
    fn test_quota_window_rollover_resets_counter() {
        let now = Utc::now();
        let mut state = ProviderHealthState::with_quota(Some(5));
        state.roll_quota_window(now, Some(5));
        state.note_failure(&ProviderFailure::QuotaExceeded, now, &ChainConfig::default());
        assert!(!state.is_available(now));

        let tomorrow = next_utc_midnight(now) + chrono::Duration::seconds(1);
        state.roll_quota_window(tomorrow, Some(5));
        assert_eq!(state.daily_quota_remaining, Some(5));
        assert!(state.is_available(tomorrow));
    }
}
