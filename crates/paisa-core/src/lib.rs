//! Paisa Core Library
//!
//! Shared functionality for the paisa conversational expense tracker:
//! - Multi-provider natural-language extraction with health-aware fallback
//! - Deterministic rule-based parsing when no provider is reachable
//! - Transaction normalization (aliases, relative dates, balance math)
//! - Spending analytics over an append-only ledger snapshot
//! - Ledger, preference, and chat-transport capabilities
//! - Report rendering for the conversational surface

pub mod ai;
pub mod alias;
pub mod analytics;
pub mod chat;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod prefs;
pub mod recorder;
pub mod report;

/// Test utilities including the mock completion-provider server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    ChainConfig, CompletionBackend, ExtractionContext, ExtractionSource, MockBackend,
    OllamaBackend, OpenRouterBackend, ProviderChain, ProviderClient, ProviderFailure,
    ProviderHealthState, RawExtraction,
};
pub use alias::AliasResolver;
pub use analytics::{
    AnalyticsConfig, AnomalyFlag, BurnRate, CategoryShare, FrequentPattern, HealthInputs,
    LendingSummary, MonthForecast, TransferSuggestion, Trend,
};
pub use chat::ChatTransport;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use ledger::{LedgerStore, MemoryLedger};
pub use models::{
    Balances, Direction, LendingRecord, LendingStatus, Location, ReportPeriod, Transaction, UserId,
};
pub use normalize::{Clarification, MissingField, NormalizeOutcome};
pub use parser::RuleParser;
pub use prefs::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, UserPreferences};
pub use recorder::{LimitBreach, RecordOutcome, Recorder};
