//! Spending analytics
//!
//! Pure functions over a ledger snapshot. Nothing here caches or mutates:
//! every report is recomputed from the transactions handed in, so the
//! analytics can never drift from the ledger. All functions take the current
//! date explicitly, which also keeps them deterministic under test.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Balances, Direction, LendingRecord, LendingStatus, Location, Transaction};

/// Tunable analytics thresholds.
///
/// The anomaly multiplier and trend threshold are configuration, not
/// constants: reasonable deployments disagree on both.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// A transaction is anomalous when it exceeds this multiple of the
    /// rolling per-category average
    pub anomaly_multiplier: f64,
    /// Minimum percent change between adjacent windows before a trend
    /// leaves Stable
    pub trend_threshold_pct: f64,
    /// Window length for trend comparison
    pub trend_window_days: u32,
    /// Trailing window for burn-rate daily averages
    pub burn_window_days: u32,
    /// Wallet balance below which a top-up from the stack is suggested
    pub low_wallet_threshold: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            anomaly_multiplier: 4.0,
            trend_threshold_pct: 15.0,
            trend_window_days: 14,
            burn_window_days: 7,
            low_wallet_threshold: 100.0,
        }
    }
}

/// Trailing-window membership: the N days ending at `today`, inclusive.
fn in_window(date: NaiveDate, today: NaiveDate, days: u32) -> bool {
    date <= today && date > today - Duration::days(days as i64)
}

/// Average debit per day over the trailing window, across both locations.
///
/// Divides by the window length, not the transaction count: quiet days
/// lower the average.
pub fn daily_average(transactions: &[Transaction], window_days: u32, today: NaiveDate) -> f64 {
    if window_days == 0 {
        return 0.0;
    }
    let total: f64 = transactions
        .iter()
        .filter(|t| t.direction == Direction::Debit && in_window(t.date, today, window_days))
        .map(|t| t.amount)
        .sum();
    total / window_days as f64
}

/// Average debit per day for one location over the trailing window.
pub fn daily_average_for_location(
    transactions: &[Transaction],
    location: Location,
    window_days: u32,
    today: NaiveDate,
) -> f64 {
    if window_days == 0 {
        return 0.0;
    }
    let total: f64 = transactions
        .iter()
        .filter(|t| {
            t.direction == Direction::Debit
                && t.location == location
                && in_window(t.date, today, window_days)
        })
        .map(|t| t.amount)
        .sum();
    total / window_days as f64
}

/// One category's share of debit spend in a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub amount: f64,
    pub percent: f64,
}

/// Per-category debit totals as percentages of window spend, largest first.
///
/// Categories with zero spend simply do not appear.
pub fn category_breakdown(
    transactions: &[Transaction],
    window_days: u32,
    today: NaiveDate,
) -> Vec<CategoryShare> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for t in transactions {
        if t.direction == Direction::Debit && in_window(t.date, today, window_days) {
            *totals.entry(t.category.as_str()).or_default() += t.amount;
        }
    }

    let grand_total: f64 = totals.values().sum();
    if grand_total <= 0.0 {
        return Vec::new();
    }

    let mut shares: Vec<CategoryShare> = totals
        .into_iter()
        .map(|(category, amount)| CategoryShare {
            category: category.to_string(),
            amount,
            percent: amount / grand_total * 100.0,
        })
        .collect();

    shares.sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(std::cmp::Ordering::Equal));
    shares
}

/// Direction of spending movement between adjacent windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

/// Compare the current window's per-day debit average against the window
/// immediately before it, bucketed by the configured minimum change so tiny
/// fluctuations read as Stable.
pub fn trend(
    transactions: &[Transaction],
    category: Option<&str>,
    config: &AnalyticsConfig,
    today: NaiveDate,
) -> Trend {
    let days = config.trend_window_days;
    if days == 0 {
        return Trend::Stable;
    }

    let sum_for = |from_exclusive: NaiveDate, to_inclusive: NaiveDate| -> f64 {
        transactions
            .iter()
            .filter(|t| {
                t.direction == Direction::Debit
                    && t.date > from_exclusive
                    && t.date <= to_inclusive
                    && category.map_or(true, |c| t.category == c)
            })
            .map(|t| t.amount)
            .sum()
    };

    let window = Duration::days(days as i64);
    let current = sum_for(today - window, today) / days as f64;
    let previous = sum_for(today - window - window, today - window) / days as f64;

    if previous <= 0.0 {
        return if current > 0.0 {
            Trend::Increasing
        } else {
            Trend::Stable
        };
    }

    let change_pct = (current - previous) / previous * 100.0;
    if change_pct > config.trend_threshold_pct {
        Trend::Increasing
    } else if change_pct < -config.trend_threshold_pct {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Month-end spend projection with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthForecast {
    pub spent_to_date: f64,
    pub projected: f64,
    pub elapsed_days: u32,
    pub days_in_month: u32,
}

impl MonthForecast {
    /// Fraction of the month already observed; the caller's confidence gauge.
    pub fn elapsed_fraction(&self) -> f64 {
        self.elapsed_days as f64 / self.days_in_month as f64
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or(date);
    (first_of_next - Duration::days(1)).day()
}

/// Extrapolate month-to-date debit spend to the end of the month.
pub fn forecast_month_end(transactions: &[Transaction], today: NaiveDate) -> MonthForecast {
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let elapsed_days = today.day();
    let total_days = days_in_month(today);

    let spent_to_date: f64 = transactions
        .iter()
        .filter(|t| t.direction == Direction::Debit && t.date >= month_start && t.date <= today)
        .map(|t| t.amount)
        .sum();

    let daily_rate = spent_to_date / elapsed_days as f64;

    MonthForecast {
        spent_to_date,
        projected: daily_rate * total_days as f64,
        elapsed_days,
        days_in_month: total_days,
    }
}

/// Days of runway for one money store.
///
/// A zero daily average means there is nothing to divide by; that is a lack
/// of evidence, not infinite runway, and it is reported as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnRate {
    Days { daily_burn: f64, days_left: f64 },
    InsufficientData,
}

/// Wallet/stack runway from the trailing daily debit average for that location.
pub fn burn_rate(
    balance: f64,
    transactions: &[Transaction],
    location: Location,
    config: &AnalyticsConfig,
    today: NaiveDate,
) -> BurnRate {
    let daily_burn =
        daily_average_for_location(transactions, location, config.burn_window_days, today);

    if daily_burn <= 0.0 {
        return BurnRate::InsufficientData;
    }

    BurnRate::Days {
        daily_burn,
        days_left: balance / daily_burn,
    }
}

/// A transaction flagged as out of line with its category history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub category: String,
    pub amount: f64,
    /// Rolling per-category average the amount was compared against
    pub baseline: f64,
    /// amount / baseline
    pub ratio: f64,
}

/// Check a candidate debit against the rolling average of its category.
///
/// The first-ever transaction in a category is never flagged: with no
/// baseline there is nothing to deviate from.
pub fn check_anomaly(
    amount: f64,
    category: &str,
    prior_transactions: &[Transaction],
    config: &AnalyticsConfig,
) -> Option<AnomalyFlag> {
    let prior: Vec<f64> = prior_transactions
        .iter()
        .filter(|t| t.direction == Direction::Debit && t.category == category)
        .map(|t| t.amount)
        .collect();

    if prior.is_empty() {
        return None;
    }

    let baseline = prior.iter().sum::<f64>() / prior.len() as f64;
    if baseline <= 0.0 {
        return None;
    }

    let ratio = amount / baseline;
    if ratio >= config.anomaly_multiplier {
        Some(AnomalyFlag {
            category: category.to_string(),
            amount,
            baseline,
            ratio,
        })
    } else {
        None
    }
}

/// Inputs to the composite financial health score.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthInputs {
    /// Debit spend divided by credit income over the window; above 1.0 the
    /// user is drawing down savings
    pub spend_income_ratio: f64,
    pub trend: Trend,
    /// Outstanding lending divided by total ever lent, 0.0 when nothing lent
    pub lending_outstanding_ratio: f64,
}

/// Bounded 0-100 composite score.
///
/// Monotonic in every input: worsening the spend ratio, the trend, or the
/// outstanding-lending ratio while holding the others fixed never raises
/// the score.
pub fn health_score(inputs: &HealthInputs) -> u8 {
    // Spend-vs-income: 50 points, linearly gone by ratio 1.5
    let spend_component = 50.0 * (1.0 - (inputs.spend_income_ratio.max(0.0) / 1.5).min(1.0));

    // Trend stability: 20 points
    let trend_component = match inputs.trend {
        Trend::Stable => 20.0,
        Trend::Decreasing => 14.0,
        Trend::Increasing => 0.0,
    };

    // Lending exposure: 30 points, linearly gone as everything stays out
    let lending_component = 30.0 * (1.0 - inputs.lending_outstanding_ratio.clamp(0.0, 1.0));

    (spend_component + trend_component + lending_component).round() as u8
}

/// Derive health inputs from a ledger snapshot.
pub fn health_inputs(
    transactions: &[Transaction],
    lending: &[LendingRecord],
    config: &AnalyticsConfig,
    window_days: u32,
    today: NaiveDate,
) -> HealthInputs {
    let mut income = 0.0;
    let mut expenses = 0.0;
    for t in transactions {
        if !in_window(t.date, today, window_days) {
            continue;
        }
        match t.direction {
            Direction::Credit => income += t.amount,
            Direction::Debit => expenses += t.amount,
        }
    }

    // No observed income with observed spending is the worst ratio we track
    let spend_income_ratio = if income > 0.0 {
        expenses / income
    } else if expenses > 0.0 {
        1.5
    } else {
        0.0
    };

    let total_lent: f64 = lending.iter().map(|r| r.amount).sum();
    let outstanding: f64 = lending
        .iter()
        .filter(|r| r.is_outstanding())
        .map(|r| r.amount)
        .sum();
    let lending_outstanding_ratio = if total_lent > 0.0 {
        outstanding / total_lent
    } else {
        0.0
    };

    HealthInputs {
        spend_income_ratio,
        trend: trend(transactions, None, config, today),
        lending_outstanding_ratio,
    }
}

/// Aggregate view over all lending records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LendingSummary {
    pub total_lent: f64,
    pub total_returned: f64,
    pub outstanding: f64,
    pub average_amount: f64,
    /// Mean days from lending to return, over returned records only
    pub average_return_days: Option<f64>,
    /// Outstanding amount per person, largest first
    pub outstanding_by_person: Vec<(String, f64)>,
}

/// Summarize lending history: totals, averages, and who still owes what.
pub fn analyze_lending(records: &[LendingRecord]) -> LendingSummary {
    if records.is_empty() {
        return LendingSummary::default();
    }

    let total_lent: f64 = records.iter().map(|r| r.amount).sum();
    let total_returned: f64 = records
        .iter()
        .filter(|r| r.status == LendingStatus::Returned)
        .map(|r| r.amount)
        .sum();

    let return_days: Vec<i64> = records
        .iter()
        .filter(|r| r.status == LendingStatus::Returned)
        .filter_map(|r| r.return_date.map(|rd| (rd - r.date).num_days()))
        .collect();
    let average_return_days = if return_days.is_empty() {
        None
    } else {
        Some(return_days.iter().sum::<i64>() as f64 / return_days.len() as f64)
    };

    let mut by_person: HashMap<&str, f64> = HashMap::new();
    for r in records.iter().filter(|r| r.is_outstanding()) {
        *by_person.entry(r.person.as_str()).or_default() += r.amount;
    }
    let mut outstanding_by_person: Vec<(String, f64)> = by_person
        .into_iter()
        .map(|(p, a)| (p.to_string(), a))
        .collect();
    outstanding_by_person
        .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    LendingSummary {
        total_lent,
        total_returned,
        outstanding: total_lent - total_returned,
        average_amount: total_lent / records.len() as f64,
        average_return_days,
        outstanding_by_person,
    }
}

/// A proposed stack-to-wallet top-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSuggestion {
    pub wallet_balance: f64,
    pub suggested_amount: f64,
}

/// Fallback top-up for users with no wallet spending history yet.
const DEFAULT_TOPUP: f64 = 2_000.0;

/// Propose moving money from the stack when the wallet dips below the
/// configured threshold. The suggestion covers about a week at the recent
/// wallet burn rate, rounded up to the nearest 500.
pub fn suggest_wallet_transfer(
    balances: Balances,
    transactions: &[Transaction],
    config: &AnalyticsConfig,
    today: NaiveDate,
) -> Option<TransferSuggestion> {
    if balances.wallet >= config.low_wallet_threshold {
        return None;
    }

    let daily =
        daily_average_for_location(transactions, Location::Wallet, config.burn_window_days, today);
    let week_of_spend = daily * 7.0;
    let suggested_amount = if week_of_spend > 0.0 {
        (week_of_spend / 500.0).ceil() * 500.0
    } else {
        DEFAULT_TOPUP
    };

    Some(TransferSuggestion {
        wallet_balance: balances.wallet,
        suggested_amount,
    })
}

/// A repeated (description, category, amount) spending pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentPattern {
    pub description: String,
    pub category: String,
    pub amount: f64,
    pub count: usize,
}

/// Repeated debit patterns over the most recent transactions, most frequent
/// first. Patterns seen only once are not shortcuts.
pub fn frequent_transactions(transactions: &[Transaction], limit: usize) -> Vec<FrequentPattern> {
    let recent = transactions.iter().rev().take(100);

    let mut counts: HashMap<(String, String, String), (usize, f64)> = HashMap::new();
    for t in recent.filter(|t| t.direction == Direction::Debit) {
        let key = (
            t.description.to_lowercase(),
            t.category.clone(),
            format!("{:.2}", t.amount),
        );
        let entry = counts.entry(key).or_insert((0, t.amount));
        entry.0 += 1;
    }

    let mut patterns: Vec<FrequentPattern> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= 2)
        .map(|((description, category, _), (count, amount))| FrequentPattern {
            description,
            category,
            amount,
            count,
        })
        .collect();

    patterns.sort_by(|a, b| b.count.cmp(&a.count).then(a.description.cmp(&b.description)));
    patterns.truncate(limit);
    patterns
}
