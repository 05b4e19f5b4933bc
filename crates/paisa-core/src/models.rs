//! Core domain models
//!
//! The ledger is an append-only sequence of [`Transaction`] and
//! [`LendingRecord`] entries. Resulting balances are computed once at commit
//! time and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable user identifier supplied by the chat transport.
pub type UserId = i64;

/// Whether a transaction adds money or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Money coming in (salary, returns, transfers in)
    Credit,
    /// Money going out (purchases, bills)
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    /// Sign applied to the amount when adjusting a balance
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Credit => 1.0,
            Direction::Debit => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" | "add" | "income" => Ok(Direction::Credit),
            "debit" | "subtract" | "expense" => Ok(Direction::Debit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Which money store a transaction touches.
///
/// The stack is the main reserve; the wallet is day-to-day pocket money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Stack,
    Wallet,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Stack => "stack",
            Location::Wallet => "wallet",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stack" | "total" | "bank" => Ok(Location::Stack),
            "wallet" | "cash" | "pocket" => Ok(Location::Wallet),
            _ => Err(format!("Unknown location: {}", s)),
        }
    }
}

/// Point-in-time balances for both money stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub stack: f64,
    pub wallet: f64,
}

impl Balances {
    pub fn new(stack: f64, wallet: f64) -> Self {
        Self { stack, wallet }
    }

    pub fn combined(&self) -> f64 {
        self.stack + self.wallet
    }

    /// Apply a signed amount to one location, returning the new balances.
    pub fn apply(&self, direction: Direction, location: Location, amount: f64) -> Self {
        let delta = direction.sign() * amount;
        match location {
            Location::Stack => Self {
                stack: self.stack + delta,
                wallet: self.wallet,
            },
            Location::Wallet => Self {
                stack: self.stack,
                wallet: self.wallet + delta,
            },
        }
    }
}

/// A committed ledger entry.
///
/// Invariants: `amount > 0`; `resulting` was derived from the prior ledger
/// balances plus this entry at commit time and is never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// User-entered calendar date (may lag the commit order)
    pub date: NaiveDate,
    pub direction: Direction,
    pub location: Location,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub merchant: Option<String>,
    pub description: String,
    /// Balances after this entry was applied
    pub resulting: Balances,
}

/// Lifecycle of a lending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LendingStatus {
    Lent,
    Returned,
}

impl LendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LendingStatus::Lent => "lent",
            LendingStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for LendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Money lent to a person, tracked until it comes back.
///
/// Status only ever moves `Lent -> Returned`; `return_date` and
/// `return_location` are set exactly once, at that transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingRecord {
    pub date: NaiveDate,
    pub person: String,
    pub amount: f64,
    pub status: LendingStatus,
    pub description: String,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub return_location: Option<Location>,
}

impl LendingRecord {
    pub fn new(date: NaiveDate, person: &str, amount: f64, description: &str) -> Self {
        Self {
            date,
            person: person.to_string(),
            amount,
            status: LendingStatus::Lent,
            description: description.to_string(),
            return_date: None,
            return_location: None,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.status == LendingStatus::Lent
    }
}

/// Reporting window requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Day => "day",
            ReportPeriod::Week => "week",
            ReportPeriod::Month => "month",
            ReportPeriod::Year => "year",
        }
    }

    /// Trailing window length in days
    pub fn days(&self) -> u32 {
        match self {
            ReportPeriod::Day => 1,
            ReportPeriod::Week => 7,
            ReportPeriod::Month => 30,
            ReportPeriod::Year => 365,
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "today" => Ok(ReportPeriod::Day),
            "week" => Ok(ReportPeriod::Week),
            "month" => Ok(ReportPeriod::Month),
            "year" => Ok(ReportPeriod::Year),
            _ => Err(format!("Unknown report period: {}", s)),
        }
    }
}
