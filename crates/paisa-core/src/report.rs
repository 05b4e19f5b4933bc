//! Chat-facing report rendering
//!
//! Turns ledger snapshots and analytics results into the plain-text replies
//! the transport sends back. Rendering is presentation only; every number
//! comes from `analytics` or the ledger.

use chrono::{Duration, NaiveDate};

use crate::analytics::{
    analyze_lending, burn_rate, category_breakdown, daily_average, forecast_month_end,
    health_inputs, health_score, suggest_wallet_transfer, trend, AnalyticsConfig, AnomalyFlag,
    BurnRate, Trend,
};
use crate::models::{
    Balances, Direction, LendingRecord, Location, ReportPeriod, Transaction,
};
use crate::recorder::LimitBreach;

/// Confirmation for a committed transaction, with any warnings attached.
pub fn committed_message(
    tx: &Transaction,
    balances: Balances,
    anomaly: Option<&AnomalyFlag>,
    limit_breach: Option<&LimitBreach>,
) -> String {
    let verb = match tx.direction {
        Direction::Debit => "spent from",
        Direction::Credit => "added to",
    };

    let mut out = format!(
        "Recorded: ₹{:.2} {} {} ({})\nStack ₹{:.2} | Wallet ₹{:.2} | Combined ₹{:.2}",
        tx.amount,
        verb,
        tx.location,
        tx.category,
        balances.stack,
        balances.wallet,
        balances.combined(),
    );

    if let Some(flag) = anomaly {
        out.push_str(&format!(
            "\nHeads up: ₹{:.2} is {:.1}x your usual {} spend (₹{:.2}).",
            flag.amount, flag.ratio, flag.category, flag.baseline
        ));
    }
    if let Some(breach) = limit_breach {
        out.push_str(&format!(
            "\nLimit alert: {} is at ₹{:.2} this month, over your ₹{:.2} cap.",
            breach.category, breach.month_spend, breach.cap
        ));
    }
    out
}

/// Transaction history for the requested period, most recent last.
pub fn history(transactions: &[Transaction], period: ReportPeriod, today: NaiveDate) -> String {
    let cutoff = today - Duration::days(period.days() as i64);
    let in_period: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.date > cutoff && t.date <= today)
        .collect();

    if in_period.is_empty() {
        return format!("No transactions in the last {}.", period);
    }

    let mut out = format!("Transactions ({}):\n", period);
    for t in in_period.iter().rev().take(10).rev() {
        let merchant = t
            .merchant
            .as_deref()
            .map(|m| format!(" @ {}", m))
            .unwrap_or_default();
        out.push_str(&format!(
            "{}  {} ₹{:.2}  {}{}\n    {}\n",
            t.date, t.direction, t.amount, t.category, merchant, t.description
        ));
    }
    out
}

/// Overall financial summary: balances, totals, lending position.
pub fn summary(
    balances: Balances,
    transactions: &[Transaction],
    lending: &[LendingRecord],
) -> String {
    let income: f64 = transactions
        .iter()
        .filter(|t| t.direction == Direction::Credit)
        .map(|t| t.amount)
        .sum();
    let expenses: f64 = transactions
        .iter()
        .filter(|t| t.direction == Direction::Debit)
        .map(|t| t.amount)
        .sum();
    let lending_summary = analyze_lending(lending);

    let mut out = String::from("Financial summary\n");
    out.push_str(&format!(
        "Balances: stack ₹{:.2}, wallet ₹{:.2}, combined ₹{:.2}\n",
        balances.stack,
        balances.wallet,
        balances.combined()
    ));
    out.push_str(&format!(
        "Income ₹{:.2} | Expenses ₹{:.2} | Net ₹{:.2}\n",
        income,
        expenses,
        income - expenses
    ));
    out.push_str(&format!(
        "Lending: ₹{:.2} lent, ₹{:.2} returned, ₹{:.2} outstanding",
        lending_summary.total_lent, lending_summary.total_returned, lending_summary.outstanding
    ));

    for (person, amount) in &lending_summary.outstanding_by_person {
        out.push_str(&format!("\n  {} owes ₹{:.2}", person, amount));
    }
    out
}

/// Derived insight report for a period: averages, breakdown, trend,
/// forecast, burn rate, health score.
pub fn insights(
    transactions: &[Transaction],
    lending: &[LendingRecord],
    balances: Balances,
    config: &AnalyticsConfig,
    period: ReportPeriod,
    today: NaiveDate,
) -> String {
    let window = period.days();
    let mut out = format!("Insights ({})\n", period);

    let avg = daily_average(transactions, window, today);
    out.push_str(&format!("Daily average spend: ₹{:.2}\n", avg));

    let shares = category_breakdown(transactions, window, today);
    if shares.is_empty() {
        out.push_str("No spending recorded in this window.\n");
    } else {
        out.push_str("Where it went:\n");
        for share in shares.iter().take(5) {
            out.push_str(&format!(
                "  {} ₹{:.2} ({:.0}%)\n",
                share.category, share.amount, share.percent
            ));
        }
    }

    let overall_trend = trend(transactions, None, config, today);
    out.push_str(&format!("Trend: {}\n", trend_phrase(overall_trend)));

    let forecast = forecast_month_end(transactions, today);
    out.push_str(&format!(
        "Month-end forecast: ₹{:.2} (₹{:.2} so far, {} of {} days observed)\n",
        forecast.projected, forecast.spent_to_date, forecast.elapsed_days, forecast.days_in_month
    ));

    match burn_rate(balances.wallet, transactions, Location::Wallet, config, today) {
        BurnRate::Days { daily_burn, days_left } => out.push_str(&format!(
            "Wallet runway: {:.0} days at ₹{:.2}/day\n",
            days_left, daily_burn
        )),
        BurnRate::InsufficientData => {
            out.push_str("Wallet runway: insufficient data (no recent wallet spending)\n")
        }
    }

    if let Some(s) = suggest_wallet_transfer(balances, transactions, config, today) {
        out.push_str(&format!(
            "Wallet is low (₹{:.2}); consider moving ₹{:.2} over from the stack.\n",
            s.wallet_balance, s.suggested_amount
        ));
    }

    let score = health_score(&health_inputs(transactions, lending, config, window, today));
    out.push_str(&format!("Financial health score: {}/100", score));
    out
}

/// Plain-text dump of the ledger for transports that cannot send files:
/// the last 20 transactions plus the full lending history, pipe-separated.
pub fn export_text(transactions: &[Transaction], lending: &[LendingRecord]) -> String {
    let mut out = String::from("Exported data\n\nTransactions (last 20):\n");
    out.push_str("date | direction | category | amount | description | stack | wallet\n");
    if transactions.is_empty() {
        out.push_str("  (none)\n");
    }
    for t in transactions.iter().rev().take(20).rev() {
        out.push_str(&format!(
            "{} | {} | {} | ₹{:.2} | {} | ₹{:.2} | ₹{:.2}\n",
            t.date,
            t.direction,
            t.category,
            t.amount,
            t.description,
            t.resulting.stack,
            t.resulting.wallet
        ));
    }

    out.push_str("\nLending:\n");
    out.push_str("date | person | amount | status | description | returned on | returned to\n");
    if lending.is_empty() {
        out.push_str("  (none)\n");
    }
    for r in lending {
        let returned_on = r
            .return_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let returned_to = r
            .return_location
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{} | {} | ₹{:.2} | {} | {} | {} | {}\n",
            r.date, r.person, r.amount, r.status, r.description, returned_on, returned_to
        ));
    }
    out
}

fn trend_phrase(t: Trend) -> &'static str {
    match t {
        Trend::Increasing => "spending is increasing",
        Trend::Decreasing => "spending is decreasing",
        Trend::Stable => "spending is stable",
    }
}
