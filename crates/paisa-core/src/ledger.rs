//! Ledger capability
//!
//! The ledger is external and append-only; the core reaches it only through
//! this narrow trait. An append must be durable before it returns, and
//! `transactions`/`lending` must reflect every prior append — the returned
//! balances, not the normalizer's echo, are authoritative.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Balances, LendingRecord, LendingStatus, Location, Transaction, UserId};

/// Append/read interface to the external ledger store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Durably append a transaction; returns the committed balances.
    async fn append_transaction(&self, user: UserId, tx: &Transaction) -> Result<Balances>;

    /// Durably append a lending record.
    async fn append_lending(&self, user: UserId, record: &LendingRecord) -> Result<()>;

    /// Transition the oldest matching outstanding lending record to
    /// Returned, setting the return date and destination exactly once.
    /// Returns the updated record, or None when nothing matches.
    async fn mark_lending_returned(
        &self,
        user: UserId,
        person: &str,
        amount: f64,
        return_to: Location,
        return_date: NaiveDate,
    ) -> Result<Option<LendingRecord>>;

    /// Full transaction history in commit order.
    async fn transactions(&self, user: UserId) -> Result<Vec<Transaction>>;

    /// Full lending history in commit order.
    async fn lending(&self, user: UserId) -> Result<Vec<LendingRecord>>;

    /// Balances after the latest committed transaction.
    async fn current_balances(&self, user: UserId) -> Result<Balances>;
}

#[derive(Default)]
struct UserRows {
    transactions: Vec<Transaction>,
    lending: Vec<LendingRecord>,
}

/// In-memory ledger used by tests and local runs.
///
/// Keeps the same append-only discipline as a real store: committed rows are
/// never rewritten, and balances always come from the last committed row.
#[derive(Default)]
pub struct MemoryLedger {
    rows: RwLock<HashMap<UserId, UserRows>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append_transaction(&self, user: UserId, tx: &Transaction) -> Result<Balances> {
        let mut rows = self.rows.write().await;
        let user_rows = rows.entry(user).or_default();
        user_rows.transactions.push(tx.clone());
        Ok(tx.resulting)
    }

    async fn append_lending(&self, user: UserId, record: &LendingRecord) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.entry(user).or_default().lending.push(record.clone());
        Ok(())
    }

    async fn mark_lending_returned(
        &self,
        user: UserId,
        person: &str,
        amount: f64,
        return_to: Location,
        return_date: NaiveDate,
    ) -> Result<Option<LendingRecord>> {
        let mut rows = self.rows.write().await;
        let user_rows = rows.entry(user).or_default();

        let record = user_rows.lending.iter_mut().find(|r| {
            r.status == LendingStatus::Lent
                && r.person.eq_ignore_ascii_case(person)
                && (r.amount - amount).abs() < 0.005
        });

        match record {
            Some(r) => {
                r.status = LendingStatus::Returned;
                r.return_date = Some(return_date);
                r.return_location = Some(return_to);
                Ok(Some(r.clone()))
            }
            None => Ok(None),
        }
    }

    async fn transactions(&self, user: UserId) -> Result<Vec<Transaction>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&user)
            .map(|r| r.transactions.clone())
            .unwrap_or_default())
    }

    async fn lending(&self, user: UserId) -> Result<Vec<LendingRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&user).map(|r| r.lending.clone()).unwrap_or_default())
    }

    async fn current_balances(&self, user: UserId) -> Result<Balances> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&user)
            .and_then(|r| r.transactions.last())
            .map(|t| t.resulting)
            .unwrap_or_default())
    }
}

/// Ledger wrapper that fails every call, for exercising outage handling.
pub struct UnavailableLedger;

#[async_trait]
impl LedgerStore for UnavailableLedger {
    async fn append_transaction(&self, _user: UserId, _tx: &Transaction) -> Result<Balances> {
        Err(Error::LedgerUnavailable("store unreachable".into()))
    }

    async fn append_lending(&self, _user: UserId, _record: &LendingRecord) -> Result<()> {
        Err(Error::LedgerUnavailable("store unreachable".into()))
    }

    async fn mark_lending_returned(
        &self,
        _user: UserId,
        _person: &str,
        _amount: f64,
        _return_to: Location,
        _return_date: NaiveDate,
    ) -> Result<Option<LendingRecord>> {
        Err(Error::LedgerUnavailable("store unreachable".into()))
    }

    async fn transactions(&self, _user: UserId) -> Result<Vec<Transaction>> {
        Err(Error::LedgerUnavailable("store unreachable".into()))
    }

    async fn lending(&self, _user: UserId) -> Result<Vec<LendingRecord>> {
        Err(Error::LedgerUnavailable("store unreachable".into()))
    }

    async fn current_balances(&self, _user: UserId) -> Result<Balances> {
        Err(Error::LedgerUnavailable("store unreachable".into()))
    }
}
