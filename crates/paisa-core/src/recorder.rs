//! Transaction recording pipeline
//!
//! Text in, committed ledger row out: orchestrated extraction, normalization,
//! and the ledger append, with the per-user serialization the balance math
//! requires. Two concurrent messages from the same user queue behind one
//! async mutex; different users never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ai::types::{ExtractionContext, ExtractionSource};
use crate::ai::ProviderChain;
use crate::analytics::{check_anomaly, AnalyticsConfig, AnomalyFlag};
use crate::error::{Error, Result};
use crate::ledger::LedgerStore;
use crate::models::{Balances, Direction, LendingRecord, Location, Transaction, UserId};
use crate::normalize::{normalize, Clarification, NormalizeOutcome};
use crate::prefs::PreferenceStore;

/// A configured monthly cap that this commit pushed past.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitBreach {
    pub category: String,
    pub cap: f64,
    pub month_spend: f64,
}

/// Result of recording one text message.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Committed {
        transaction: Transaction,
        /// Balances confirmed by the ledger append; authoritative
        balances: Balances,
        source: ExtractionSource,
        anomaly: Option<AnomalyFlag>,
        limit_breach: Option<LimitBreach>,
    },
    /// Not committed; relay the prompt and wait for the user
    NeedsClarification(Clarification),
}

/// The commit path: extraction chain in front, ledger and preference stores
/// behind, one async mutex per user around the read-modify-append window.
pub struct Recorder {
    chain: ProviderChain,
    ledger: Arc<dyn LedgerStore>,
    prefs: Arc<dyn PreferenceStore>,
    analytics: AnalyticsConfig,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl Recorder {
    pub fn new(
        chain: ProviderChain,
        ledger: Arc<dyn LedgerStore>,
        prefs: Arc<dyn PreferenceStore>,
        analytics: AnalyticsConfig,
    ) -> Self {
        Self {
            chain,
            ledger,
            prefs,
            analytics,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn prefs(&self) -> &Arc<dyn PreferenceStore> {
        &self.prefs
    }

    pub fn analytics_config(&self) -> &AnalyticsConfig {
        &self.analytics
    }

    async fn user_lock(&self, user: UserId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(user).or_default().clone()
    }

    /// Record a free-text statement as a transaction.
    ///
    /// Extraction happens before the user lock is taken — provider latency
    /// must not serialize other messages from the same user that are already
    /// past extraction. Returns `Err(LedgerUnavailable)` when the append
    /// cannot be confirmed; nothing is reported as committed in that case.
    pub async fn record_text(
        &self,
        user: UserId,
        text: &str,
        today: NaiveDate,
    ) -> Result<RecordOutcome> {
        let prefs_snapshot = self.prefs.load(user).await?;
        let ctx = ExtractionContext {
            recent_categories: prefs_snapshot.recent_categories(5),
            known_aliases: prefs_snapshot.aliases.keys().cloned().collect(),
        };

        let (raw, source) = self.chain.extract(text, &ctx, today).await;

        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        // Re-load under the lock: a concurrent command may have changed
        // aliases since the snapshot above.
        let mut prefs = self.prefs.load(user).await?;
        let balances = self.ledger.current_balances(user).await?;

        let transaction = match normalize(&raw, &prefs.alias_resolver(), balances, today) {
            NormalizeOutcome::Transaction(tx) => tx,
            NormalizeOutcome::NeedsClarification(clarification) => {
                info!(user, source = %source, "Extraction needs clarification");
                return Ok(RecordOutcome::NeedsClarification(clarification));
            }
        };

        let prior = self.ledger.transactions(user).await?;

        let anomaly = if transaction.direction == Direction::Debit {
            check_anomaly(
                transaction.amount,
                &transaction.category,
                &prior,
                &self.analytics,
            )
        } else {
            None
        };

        let limit_breach = self.check_limit(&prefs, &transaction, &prior, today);

        let committed = self.ledger.append_transaction(user, &transaction).await?;

        info!(
            user,
            amount = transaction.amount,
            category = %transaction.category,
            source = %source,
            "Transaction committed"
        );

        prefs.remember(&transaction);
        if let Err(e) = self.prefs.save(user, &prefs).await {
            // The commit already happened; a stale context memory is the
            // only consequence.
            warn!(user, error = %e, "Failed to save preferences after commit");
        }

        Ok(RecordOutcome::Committed {
            transaction,
            balances: committed,
            source,
            anomaly,
            limit_breach,
        })
    }

    fn check_limit(
        &self,
        prefs: &crate::prefs::UserPreferences,
        tx: &Transaction,
        prior: &[Transaction],
        today: NaiveDate,
    ) -> Option<LimitBreach> {
        if tx.direction != Direction::Debit {
            return None;
        }
        let cap = prefs.limit_for(&tx.category)?;

        let month_prior: f64 = prior
            .iter()
            .filter(|t| {
                t.direction == Direction::Debit
                    && t.category == tx.category
                    && t.date.format("%Y-%m").to_string() == today.format("%Y-%m").to_string()
            })
            .map(|t| t.amount)
            .sum();

        let month_spend = month_prior + tx.amount;
        if month_spend > cap {
            Some(LimitBreach {
                category: tx.category.clone(),
                cap,
                month_spend,
            })
        } else {
            None
        }
    }

    /// Record money lent to a person.
    pub async fn record_lending(
        &self,
        user: UserId,
        person: &str,
        amount: f64,
        description: &str,
        today: NaiveDate,
    ) -> Result<LendingRecord> {
        if amount <= 0.0 {
            return Err(Error::InvalidData(format!(
                "lending amount must be positive, got {}",
                amount
            )));
        }
        if person.trim().is_empty() {
            return Err(Error::InvalidData("lending needs a person name".into()));
        }

        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        let record = LendingRecord::new(today, person.trim(), amount, description.trim());
        self.ledger.append_lending(user, &record).await?;
        info!(user, person = %record.person, amount, "Lending recorded");
        Ok(record)
    }

    /// Mark a lending record as returned and credit the chosen location.
    ///
    /// Returns None when no outstanding record matches the person + amount.
    pub async fn mark_returned(
        &self,
        user: UserId,
        person: &str,
        amount: f64,
        return_to: Location,
        today: NaiveDate,
    ) -> Result<Option<(LendingRecord, Balances)>> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        let updated = self
            .ledger
            .mark_lending_returned(user, person, amount, return_to, today)
            .await?;

        let record = match updated {
            Some(r) => r,
            None => return Ok(None),
        };

        // The return is money coming back in; it lands as a credit
        let balances = self.ledger.current_balances(user).await?;
        let credit = Transaction {
            date: today,
            direction: Direction::Credit,
            location: return_to,
            amount,
            category: "lending".to_string(),
            merchant: None,
            description: format!("Returned by {}", record.person),
            resulting: balances.apply(Direction::Credit, return_to, amount),
        };
        let committed = self.ledger.append_transaction(user, &credit).await?;

        info!(user, person = %record.person, amount, "Lending return committed");
        Ok(Some((record, committed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::orchestrator::ChainConfig;
    use crate::ai::types::{ProviderFailure, RawExtraction};
    use crate::ai::{MockBackend, ProviderClient};
    use crate::ledger::{MemoryLedger, UnavailableLedger};
    use crate::prefs::MemoryPreferenceStore;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recorder_with(chain: ProviderChain) -> Recorder {
        Recorder::new(
            chain,
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryPreferenceStore::new()),
            AnalyticsConfig::default(),
        )
    }

    fn empty_chain() -> ProviderChain {
        ProviderChain::new(ChainConfig::default())
    }

    #[tokio::test]
    async fn test_record_text_commits_via_fallback() {
        let recorder = recorder_with(empty_chain());
        let outcome = recorder
            .record_text(1, "spent 500 on groceries at DMart", day(2025, 10, 19))
            .await
            .unwrap();

        match outcome {
            RecordOutcome::Committed {
                transaction,
                balances,
                source,
                ..
            } => {
                assert_eq!(transaction.amount, 500.0);
                assert_eq!(transaction.category, "groceries");
                assert_eq!(source, ExtractionSource::RuleParser);
                assert_eq!(balances.wallet, -500.0);
            }
            other => panic!("expected commit, got {:?}", other),
        }

        let rows = recorder.ledger().transactions(1).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_amountless_text_asks_for_clarification() {
        let recorder = recorder_with(empty_chain());
        let outcome = recorder
            .record_text(1, "bought some stuff", day(2025, 10, 19))
            .await
            .unwrap();

        assert!(matches!(outcome, RecordOutcome::NeedsClarification(_)));
        // Nothing was committed
        assert!(recorder.ledger().transactions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_outage_surfaces_as_retryable() {
        let recorder = Recorder::new(
            empty_chain(),
            Arc::new(UnavailableLedger),
            Arc::new(MemoryPreferenceStore::new()),
            AnalyticsConfig::default(),
        );
        let err = recorder
            .record_text(1, "spent 500 on groceries", day(2025, 10, 19))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_provider_extraction_feeds_commit() {
        let mock = MockBackend::named("p1");
        mock.push_outcome(Ok(RawExtraction {
            amount: Some(1_000.0),
            direction: Some(Direction::Debit),
            category: Some("food".to_string()),
            merchant: None,
            date_phrase: Some("yesterday".to_string()),
            description: "yesterday I paid 1000 for dinner".to_string(),
            confidence: 0.9,
        }));
        let mut chain = empty_chain();
        chain.add_provider(ProviderClient::Mock(mock));

        let recorder = recorder_with(chain);
        let outcome = recorder
            .record_text(1, "yesterday I paid 1000 for dinner", day(2025, 10, 19))
            .await
            .unwrap();

        match outcome {
            RecordOutcome::Committed { transaction, source, .. } => {
                assert_eq!(transaction.date, day(2025, 10, 18));
                assert_eq!(source, ExtractionSource::Provider("p1".into()));
            }
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_anomaly_flag_on_commit() {
        let recorder = recorder_with(empty_chain());
        let today = day(2025, 10, 19);

        recorder.record_text(1, "spent 500 on groceries", today).await.unwrap();
        recorder.record_text(1, "spent 600 on groceries", today).await.unwrap();

        let outcome = recorder
            .record_text(1, "spent 3000 on groceries", today)
            .await
            .unwrap();
        match outcome {
            RecordOutcome::Committed { anomaly, .. } => {
                let flag = anomaly.expect("3000 against 550 baseline must flag");
                assert_eq!(flag.category, "groceries");
            }
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_category_transaction_never_flagged() {
        let recorder = recorder_with(empty_chain());
        let outcome = recorder
            .record_text(1, "spent 99999 on groceries", day(2025, 10, 19))
            .await
            .unwrap();
        match outcome {
            RecordOutcome::Committed { anomaly, .. } => assert!(anomaly.is_none()),
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_limit_breach_reported() {
        let recorder = recorder_with(empty_chain());
        let mut prefs = recorder.prefs().load(1).await.unwrap();
        prefs.set_limit("groceries", 1_000.0);
        recorder.prefs().save(1, &prefs).await.unwrap();

        let today = day(2025, 10, 19);
        recorder.record_text(1, "spent 800 on groceries", today).await.unwrap();

        let outcome = recorder.record_text(1, "spent 300 on groceries", today).await.unwrap();
        match outcome {
            RecordOutcome::Committed { limit_breach, .. } => {
                let breach = breach_or_panic(limit_breach);
                assert_eq!(breach.cap, 1_000.0);
                assert_eq!(breach.month_spend, 1_100.0);
            }
            other => panic!("expected commit, got {:?}", other),
        }
    }

    fn breach_or_panic(breach: Option<LimitBreach>) -> LimitBreach {
        breach.expect("limit breach expected")
    }

    #[tokio::test]
    async fn test_context_memory_updated_after_commit() {
        let recorder = recorder_with(empty_chain());
        recorder
            .record_text(1, "spent 500 on groceries", day(2025, 10, 19))
            .await
            .unwrap();

        let prefs = recorder.prefs().load(1).await.unwrap();
        assert_eq!(prefs.context_memory.len(), 1);
        assert_eq!(prefs.context_memory[0].category, "groceries");
    }

    #[tokio::test]
    async fn test_lending_roundtrip() {
        let recorder = recorder_with(empty_chain());
        let today = day(2025, 10, 19);

        recorder
            .record_lending(1, "Asha", 500.0, "lunch money", today)
            .await
            .unwrap();

        let miss = recorder
            .mark_returned(1, "Asha", 400.0, Location::Wallet, today)
            .await
            .unwrap();
        assert!(miss.is_none());

        let (record, balances) = recorder
            .mark_returned(1, "Asha", 500.0, Location::Wallet, today)
            .await
            .unwrap()
            .expect("matching record");
        assert_eq!(record.return_location, Some(Location::Wallet));
        assert_eq!(balances.wallet, 500.0);

        // The return landed as a credit transaction
        let txs = recorder.ledger().transactions(1).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].direction, Direction::Credit);
        assert_eq!(txs[0].category, "lending");
    }

    #[tokio::test]
    async fn test_lending_rejects_non_positive_amounts() {
        let recorder = recorder_with(empty_chain());
        let err = recorder
            .record_lending(1, "Asha", 0.0, "x", day(2025, 10, 19))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_unhealthy_provider_skipped_healthy_used() {
        // [A(unhealthy: auth-dead after first call), B(healthy)] -> B serves
        let a = MockBackend::failing("a", ProviderFailure::AuthInvalid);
        let b = MockBackend::named("b");
        let mut chain = empty_chain();
        chain.add_provider(ProviderClient::Mock(a.clone()));
        chain.add_provider(ProviderClient::Mock(b.clone()));
        let recorder = recorder_with(chain);

        let today = day(2025, 10, 19);
        recorder.record_text(1, "spent 100 on food", today).await.unwrap();
        recorder.record_text(1, "spent 200 on food", today).await.unwrap();

        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 2);
    }
}
