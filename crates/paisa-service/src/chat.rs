//! Chat loop and command dispatch
//!
//! A line-oriented stand-in for a real chat transport: every line is either
//! a free-text statement to record or a slash command. The dispatch layer is
//! transport-agnostic; swapping stdin for a bot API means implementing
//! `ChatTransport` elsewhere and reusing `dispatch` as-is.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use paisa_core::{
    report, ChatTransport, Error, Location, RecordOutcome, Recorder, ReportPeriod, UserId,
};

const HELP: &str = "\
Tell me what you spent or received, e.g. \"spent 500 on groceries at DMart\".
Commands:
  /summary                      overall balances, totals, lending
  /report [day|week|month|year] transaction history
  /insights [day|week|month|year] analytics report
  /lend <person> <amount> [note]
  /returned <person> <amount> [stack|wallet]
  /alias <shorthand> <category>
  /limit <category> <monthly-cap>
  /goal <target> <description>
  /goals                        list saved goals
  /shortcut <trigger> <amount> <category> [note]
  /shortcuts                    saved shortcuts + detected patterns
  /export                       ledger as plain text
  /help";

/// Single local user for the stdio transport.
const LOCAL_USER: UserId = 1;

/// Route one inbound message to the right core operation and render the
/// reply. Never panics; every failure becomes a readable message.
pub async fn dispatch(recorder: &Recorder, user: UserId, text: &str, today: NaiveDate) -> String {
    let text = text.trim();
    if text.is_empty() {
        return HELP.to_string();
    }

    if let Some(rest) = text.strip_prefix('/') {
        return dispatch_command(recorder, user, rest, today).await;
    }

    // A bare shortcut trigger expands to its full statement first
    let expanded = expand_shortcut(recorder, user, text).await;
    let text = expanded.as_deref().unwrap_or(text);

    match recorder.record_text(user, text, today).await {
        Ok(RecordOutcome::Committed {
            transaction,
            balances,
            anomaly,
            limit_breach,
            ..
        }) => report::committed_message(&transaction, balances, anomaly.as_ref(), limit_breach.as_ref()),
        Ok(RecordOutcome::NeedsClarification(clarification)) => clarification.prompt,
        Err(e) if e.is_retryable() => {
            warn!(user, error = %e, "Commit failed, ledger unreachable");
            "Couldn't reach the ledger, nothing was recorded. Please try again.".to_string()
        }
        Err(e) => format!("That didn't work: {}", e),
    }
}

async fn dispatch_command(
    recorder: &Recorder,
    user: UserId,
    command: &str,
    today: NaiveDate,
) -> String {
    let mut parts = command.split_whitespace();
    let verb = parts.next().unwrap_or("").to_lowercase();
    let args: Vec<&str> = parts.collect();

    let result: Result<String, Error> = match verb.as_str() {
        "help" => Ok(HELP.to_string()),
        "summary" => cmd_summary(recorder, user).await,
        "report" => cmd_report(recorder, user, &args, today).await,
        "insights" => cmd_insights(recorder, user, &args, today).await,
        "lend" => cmd_lend(recorder, user, &args, today).await,
        "returned" => cmd_returned(recorder, user, &args, today).await,
        "alias" => cmd_alias(recorder, user, &args).await,
        "limit" => cmd_limit(recorder, user, &args).await,
        "goal" => cmd_goal(recorder, user, &args, today).await,
        "goals" => cmd_goals(recorder, user).await,
        "shortcut" => cmd_shortcut(recorder, user, &args).await,
        "shortcuts" => cmd_shortcuts(recorder, user).await,
        "export" => cmd_export(recorder, user).await,
        _ => Ok(format!("Unknown command /{}. Try /help.", verb)),
    };

    match result {
        Ok(reply) => reply,
        Err(e) if e.is_retryable() => {
            "Couldn't reach the ledger. Please try again.".to_string()
        }
        Err(e) => format!("That didn't work: {}", e),
    }
}

async fn cmd_summary(recorder: &Recorder, user: UserId) -> Result<String, Error> {
    let transactions = recorder.ledger().transactions(user).await?;
    let lending = recorder.ledger().lending(user).await?;
    let balances = recorder.ledger().current_balances(user).await?;
    Ok(report::summary(balances, &transactions, &lending))
}

fn parse_period(args: &[&str]) -> ReportPeriod {
    args.first()
        .and_then(|p| p.parse().ok())
        .unwrap_or(ReportPeriod::Week)
}

async fn cmd_report(
    recorder: &Recorder,
    user: UserId,
    args: &[&str],
    today: NaiveDate,
) -> Result<String, Error> {
    let transactions = recorder.ledger().transactions(user).await?;
    Ok(report::history(&transactions, parse_period(args), today))
}

async fn cmd_insights(
    recorder: &Recorder,
    user: UserId,
    args: &[&str],
    today: NaiveDate,
) -> Result<String, Error> {
    let transactions = recorder.ledger().transactions(user).await?;
    let lending = recorder.ledger().lending(user).await?;
    let balances = recorder.ledger().current_balances(user).await?;
    let period = args
        .first()
        .and_then(|p| p.parse().ok())
        .unwrap_or(ReportPeriod::Month);
    Ok(report::insights(
        &transactions,
        &lending,
        balances,
        recorder.analytics_config(),
        period,
        today,
    ))
}

async fn cmd_lend(
    recorder: &Recorder,
    user: UserId,
    args: &[&str],
    today: NaiveDate,
) -> Result<String, Error> {
    let (person, amount) = match (args.first(), args.get(1).and_then(|a| a.parse::<f64>().ok())) {
        (Some(p), Some(a)) => (*p, a),
        _ => return Ok("Usage: /lend <person> <amount> [note]".to_string()),
    };
    let note = args[2..].join(" ");

    let record = recorder
        .record_lending(user, person, amount, &note, today)
        .await?;
    Ok(format!(
        "Recorded: lent ₹{:.2} to {}. Use /returned when it comes back.",
        record.amount, record.person
    ))
}

async fn cmd_returned(
    recorder: &Recorder,
    user: UserId,
    args: &[&str],
    today: NaiveDate,
) -> Result<String, Error> {
    let (person, amount) = match (args.first(), args.get(1).and_then(|a| a.parse::<f64>().ok())) {
        (Some(p), Some(a)) => (*p, a),
        _ => return Ok("Usage: /returned <person> <amount> [stack|wallet]".to_string()),
    };
    let location = args
        .get(2)
        .and_then(|l| l.parse::<Location>().ok())
        .unwrap_or(Location::Stack);

    match recorder.mark_returned(user, person, amount, location, today).await? {
        Some((record, balances)) => Ok(format!(
            "₹{:.2} back from {} into {}. Stack ₹{:.2} | Wallet ₹{:.2}",
            record.amount, record.person, location, balances.stack, balances.wallet
        )),
        None => Ok(format!(
            "No outstanding lending of ₹{:.2} to {} found. Check the name and amount.",
            amount, person
        )),
    }
}

async fn cmd_alias(recorder: &Recorder, user: UserId, args: &[&str]) -> Result<String, Error> {
    let (shorthand, category) = match (args.first(), args.get(1)) {
        (Some(s), Some(c)) => (*s, *c),
        _ => return Ok("Usage: /alias <shorthand> <category>".to_string()),
    };

    let mut prefs = recorder.prefs().load(user).await?;
    prefs.set_alias(shorthand, category);
    recorder.prefs().save(user, &prefs).await?;
    Ok(format!("Alias saved: {} -> {}", shorthand.to_lowercase(), category.to_lowercase()))
}

async fn cmd_limit(recorder: &Recorder, user: UserId, args: &[&str]) -> Result<String, Error> {
    let (category, cap) = match (args.first(), args.get(1).and_then(|a| a.parse::<f64>().ok())) {
        (Some(c), Some(l)) if l > 0.0 => (*c, l),
        _ => return Ok("Usage: /limit <category> <monthly-cap>".to_string()),
    };

    let mut prefs = recorder.prefs().load(user).await?;
    prefs.set_limit(category, cap);
    recorder.prefs().save(user, &prefs).await?;
    Ok(format!("Monthly cap for {} set to ₹{:.2}", category.to_lowercase(), cap))
}

async fn cmd_goal(
    recorder: &Recorder,
    user: UserId,
    args: &[&str],
    today: NaiveDate,
) -> Result<String, Error> {
    let target = match args.first().and_then(|a| a.parse::<f64>().ok()) {
        Some(t) if t > 0.0 => t,
        _ => return Ok("Usage: /goal <target> <description>".to_string()),
    };
    let description = args[1..].join(" ");

    let mut prefs = recorder.prefs().load(user).await?;
    prefs.add_goal(target, &description, None, today);
    recorder.prefs().save(user, &prefs).await?;
    Ok(format!("Goal saved: ₹{:.2} - {}", target, description))
}

async fn cmd_goals(recorder: &Recorder, user: UserId) -> Result<String, Error> {
    let prefs = recorder.prefs().load(user).await?;
    if prefs.goals.is_empty() {
        return Ok("No goals yet. Set one with /goal <target> <description>.".to_string());
    }
    let mut out = String::from("Goals:");
    for goal in &prefs.goals {
        out.push_str(&format!(
            "\n  ₹{:.2} - {} (since {})",
            goal.target, goal.description, goal.created
        ));
    }
    Ok(out)
}

async fn cmd_shortcut(recorder: &Recorder, user: UserId, args: &[&str]) -> Result<String, Error> {
    let (trigger, amount, category) = match (
        args.first(),
        args.get(1).and_then(|a| a.parse::<f64>().ok()),
        args.get(2),
    ) {
        (Some(t), Some(a), Some(c)) if a > 0.0 => (*t, a, *c),
        _ => return Ok("Usage: /shortcut <trigger> <amount> <category> [note]".to_string()),
    };
    let note = args[3..].join(" ");

    let mut prefs = recorder.prefs().load(user).await?;
    prefs.shortcuts.retain(|s| !s.trigger.eq_ignore_ascii_case(trigger));
    prefs.shortcuts.push(paisa_core::prefs::Shortcut {
        trigger: trigger.to_lowercase(),
        amount,
        category: category.to_lowercase(),
        description: if note.is_empty() { trigger.to_lowercase() } else { note },
    });
    recorder.prefs().save(user, &prefs).await?;
    Ok(format!(
        "Shortcut saved: \"{}\" -> ₹{:.2} on {}",
        trigger.to_lowercase(),
        amount,
        category.to_lowercase()
    ))
}

async fn cmd_shortcuts(recorder: &Recorder, user: UserId) -> Result<String, Error> {
    let prefs = recorder.prefs().load(user).await?;
    let transactions = recorder.ledger().transactions(user).await?;
    let detected = paisa_core::analytics::frequent_transactions(&transactions, 5);

    let mut out = String::from("Shortcuts:");
    if prefs.shortcuts.is_empty() {
        out.push_str("\n  none saved");
    }
    for s in &prefs.shortcuts {
        out.push_str(&format!(
            "\n  \"{}\" -> ₹{:.2} on {}",
            s.trigger, s.amount, s.category
        ));
    }
    if !detected.is_empty() {
        out.push_str("\nPatterns you repeat (candidates for /shortcut):");
        for p in &detected {
            out.push_str(&format!(
                "\n  {} - ₹{:.2} on {} ({}x)",
                p.description, p.amount, p.category, p.count
            ));
        }
    }
    Ok(out)
}

async fn cmd_export(recorder: &Recorder, user: UserId) -> Result<String, Error> {
    let transactions = recorder.ledger().transactions(user).await?;
    let lending = recorder.ledger().lending(user).await?;
    Ok(report::export_text(&transactions, &lending))
}

/// Expand a saved shortcut trigger into its full statement.
async fn expand_shortcut(recorder: &Recorder, user: UserId, text: &str) -> Option<String> {
    let prefs = recorder.prefs().load(user).await.ok()?;
    let shortcut = prefs
        .shortcuts
        .iter()
        .find(|s| s.trigger.eq_ignore_ascii_case(text.trim()))?;
    Some(format!(
        "spent {} on {} ({})",
        shortcut.amount, shortcut.category, shortcut.description
    ))
}

/// Stdin/stdout transport for local runs.
struct StdioTransport {
    lines: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
}

impl StdioTransport {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait]
impl ChatTransport for StdioTransport {
    async fn send(&self, _user: UserId, text: &str) -> paisa_core::Result<()> {
        println!("{}\n", text);
        Ok(())
    }

    async fn receive(&mut self) -> paisa_core::Result<Option<(UserId, String)>> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some((LOCAL_USER, line))),
            None => Ok(None),
        }
    }
}

/// Read statements from stdin until EOF.
pub async fn run_stdio_loop(recorder: Arc<Recorder>) -> Result<()> {
    let mut transport = StdioTransport::new();

    while let Some((user, text)) = transport.receive().await? {
        let today = Local::now().date_naive();
        let reply = dispatch(&recorder, user, &text, today).await;
        transport.send(user, &reply).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paisa_core::{
        AnalyticsConfig, ChainConfig, MemoryLedger, MemoryPreferenceStore, ProviderChain,
    };

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recorder() -> Recorder {
        Recorder::new(
            ProviderChain::new(ChainConfig::default()),
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryPreferenceStore::new()),
            AnalyticsConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_free_text_records_and_confirms() {
        let rec = recorder();
        let reply = dispatch(&rec, 1, "spent 500 on groceries at DMart", day(2025, 10, 19)).await;
        assert!(reply.contains("Recorded"));
        assert!(reply.contains("500.00"));
    }

    #[tokio::test]
    async fn test_amountless_text_prompts_for_amount() {
        let rec = recorder();
        let reply = dispatch(&rec, 1, "bought some things", day(2025, 10, 19)).await;
        assert!(reply.contains("How much"));
    }

    #[tokio::test]
    async fn test_summary_command() {
        let rec = recorder();
        dispatch(&rec, 1, "spent 500 on groceries", day(2025, 10, 19)).await;
        let reply = dispatch(&rec, 1, "/summary", day(2025, 10, 19)).await;
        assert!(reply.contains("Financial summary"));
        assert!(reply.contains("500.00"));
    }

    #[tokio::test]
    async fn test_lend_and_returned_flow() {
        let rec = recorder();
        let today = day(2025, 10, 19);

        let reply = dispatch(&rec, 1, "/lend Asha 500 lunch money", today).await;
        assert!(reply.contains("lent ₹500.00 to Asha"));

        let miss = dispatch(&rec, 1, "/returned Asha 400", today).await;
        assert!(miss.contains("No outstanding lending"));

        let hit = dispatch(&rec, 1, "/returned Asha 500 wallet", today).await;
        assert!(hit.contains("back from Asha"));
    }

    #[tokio::test]
    async fn test_alias_command_changes_categorization() {
        let rec = recorder();
        let today = day(2025, 10, 19);

        dispatch(&rec, 1, "/alias chai food", today).await;
        dispatch(&rec, 1, "spent 20 on chai", today).await;

        let rows = rec.ledger().transactions(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "food");
    }

    #[tokio::test]
    async fn test_shortcut_save_and_trigger() {
        let rec = recorder();
        let today = day(2025, 10, 19);

        let saved = dispatch(&rec, 1, "/shortcut chai 20 food morning chai", today).await;
        assert!(saved.contains("Shortcut saved"));

        let reply = dispatch(&rec, 1, "chai", today).await;
        assert!(reply.contains("Recorded"));

        let rows = rec.ledger().transactions(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 20.0);
        assert_eq!(rows[0].category, "food");

        let listing = dispatch(&rec, 1, "/shortcuts", today).await;
        assert!(listing.contains("chai"));
    }

    #[tokio::test]
    async fn test_goals_listing() {
        let rec = recorder();
        let today = day(2025, 10, 19);

        let empty = dispatch(&rec, 1, "/goals", today).await;
        assert!(empty.contains("No goals"));

        dispatch(&rec, 1, "/goal 10000 emergency fund", today).await;
        let listing = dispatch(&rec, 1, "/goals", today).await;
        assert!(listing.contains("emergency fund"));
    }

    #[tokio::test]
    async fn test_export_command() {
        let rec = recorder();
        let today = day(2025, 10, 19);
        dispatch(&rec, 1, "spent 500 on groceries", today).await;
        dispatch(&rec, 1, "/lend Asha 200 snacks", today).await;

        let reply = dispatch(&rec, 1, "/export", today).await;
        assert!(reply.contains("Exported data"));
        assert!(reply.contains("groceries"));
        assert!(reply.contains("Asha"));
    }

    #[tokio::test]
    async fn test_unknown_command_points_to_help() {
        let rec = recorder();
        let reply = dispatch(&rec, 1, "/dance", day(2025, 10, 19)).await;
        assert!(reply.contains("/help"));
    }

    #[tokio::test]
    async fn test_report_rejects_nothing() {
        let rec = recorder();
        let reply = dispatch(&rec, 1, "/report year", day(2025, 10, 19)).await;
        assert!(reply.contains("No transactions"));
    }
}
