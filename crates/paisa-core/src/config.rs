//! Runtime configuration
//!
//! Everything tunable comes from the environment: the provider chain (order,
//! credentials, quotas, timeouts), failure-handling knobs, and analytics
//! thresholds. Nothing is hard-coded past the defaults here.

use std::time::Duration;

use tracing::info;

use crate::ai::orchestrator::ChainConfig;
use crate::ai::{
    CompletionBackend, OllamaBackend, OpenRouterBackend, ProviderChain, ProviderClient,
};
use crate::analytics::AnalyticsConfig;
use crate::error::{Error, Result};

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an unparseable value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Assembled application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Read knobs from the environment, falling back to defaults.
    ///
    /// - `PAISA_FAILURE_THRESHOLD`: consecutive failures before cooldown
    /// - `PAISA_COOLDOWN_SECS`: cooldown length
    /// - `PAISA_ANOMALY_MULTIPLIER`: anomaly flag threshold
    /// - `PAISA_TREND_THRESHOLD_PCT`: minimum change before a trend moves
    /// - `PAISA_LOW_WALLET_THRESHOLD`: wallet balance that triggers a
    ///   top-up suggestion
    pub fn from_env() -> Result<Self> {
        let mut chain = ChainConfig::default();
        if let Some(threshold) = env_parse::<u32>("PAISA_FAILURE_THRESHOLD")? {
            chain.failure_threshold = threshold;
        }
        if let Some(secs) = env_parse::<u64>("PAISA_COOLDOWN_SECS")? {
            chain.cooldown = Duration::from_secs(secs);
        }

        let mut analytics = AnalyticsConfig::default();
        if let Some(multiplier) = env_parse::<f64>("PAISA_ANOMALY_MULTIPLIER")? {
            analytics.anomaly_multiplier = multiplier;
        }
        if let Some(pct) = env_parse::<f64>("PAISA_TREND_THRESHOLD_PCT")? {
            analytics.trend_threshold_pct = pct;
        }
        if let Some(threshold) = env_parse::<f64>("PAISA_LOW_WALLET_THRESHOLD")? {
            analytics.low_wallet_threshold = threshold;
        }

        Ok(Self { chain, analytics })
    }

    /// Build the provider chain from whatever providers the environment
    /// configures, in priority order: OpenRouter first, then local Ollama.
    ///
    /// An empty chain is valid; extraction then always uses the rule parser.
    ///
    /// - `PAISA_OPENROUTER_API_KEY` / `PAISA_OPENROUTER_MODEL` /
    ///   `PAISA_OPENROUTER_DAILY_QUOTA`
    /// - `PAISA_OLLAMA_HOST` / `PAISA_OLLAMA_MODEL`
    pub fn build_chain(&self) -> Result<ProviderChain> {
        let mut chain = ProviderChain::new(self.chain.clone());

        if let Some(backend) = OpenRouterBackend::from_env() {
            let quota = env_parse::<u32>("PAISA_OPENROUTER_DAILY_QUOTA")?;
            info!(provider = backend.name(), model = backend.model(), "Configured provider");
            chain.add_provider_with_quota(ProviderClient::OpenRouter(backend), quota);
        }

        if let Some(backend) = OllamaBackend::from_env() {
            info!(provider = backend.name(), model = backend.model(), "Configured provider");
            chain.add_provider(ProviderClient::Ollama(backend));
        }

        if chain.provider_count() == 0 {
            info!("No completion providers configured; rule-based extraction only");
        }

        Ok(chain)
    }
}
