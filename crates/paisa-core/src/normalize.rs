//! Transaction normalization
//!
//! Coerces a [`RawExtraction`] from either extraction path into the canonical
//! [`Transaction`] shape: alias resolution, date stamping, balance math.
//! A missing or non-positive amount is a [`NormalizeOutcome::NeedsClarification`],
//! which is a normal outcome to relay to the user, never an error — and the
//! amount is never silently defaulted to zero.

use chrono::NaiveDate;

use crate::ai::types::RawExtraction;
use crate::alias::AliasResolver;
use crate::models::{Balances, Direction, Location, Transaction};
use crate::parser::resolve_date_phrase;

/// Category recorded when neither the provider nor the user said anything.
pub const DEFAULT_CATEGORY: &str = "other";

/// What a clarification prompt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Amount,
}

/// A normal, user-facing request for a missing field.
#[derive(Debug, Clone, PartialEq)]
pub struct Clarification {
    pub missing: MissingField,
    pub prompt: String,
}

/// Result of normalizing one extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    /// Ready to commit; `resulting` balances are a best-effort echo until the
    /// ledger confirms the append
    Transaction(Transaction),
    /// Not actionable yet; ask the user instead of committing
    NeedsClarification(Clarification),
}

/// Coerce a raw extraction into a committable transaction.
pub fn normalize(
    raw: &RawExtraction,
    aliases: &AliasResolver,
    balances: Balances,
    today: NaiveDate,
) -> NormalizeOutcome {
    let amount = match raw.amount {
        Some(a) if a > 0.0 => a,
        _ => {
            return NormalizeOutcome::NeedsClarification(Clarification {
                missing: MissingField::Amount,
                prompt: format!(
                    "I couldn't find an amount in \"{}\". How much was it?",
                    raw.description
                ),
            });
        }
    };

    let direction = raw.direction.unwrap_or(Direction::Debit);
    let location = infer_location(&raw.description, direction);

    // A stated category goes through the resolver; without one, a registered
    // alias anywhere in the text is the next best signal.
    let category = raw
        .category
        .as_deref()
        .map(|c| aliases.resolve(c))
        .filter(|c| !c.is_empty())
        .or_else(|| aliases.first_match(&raw.description))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let date = raw
        .date_phrase
        .as_deref()
        .and_then(|p| resolve_date_phrase(p, today))
        .unwrap_or(today);

    let resulting = balances.apply(direction, location, amount);

    NormalizeOutcome::Transaction(Transaction {
        date,
        direction,
        location,
        amount,
        category,
        merchant: raw.merchant.clone(),
        description: raw.description.clone(),
        resulting,
    })
}

/// Pick the money store from a location phrase in the text, else the
/// direction default: spending comes out of the wallet, income lands on
/// the stack.
fn infer_location(description: &str, direction: Direction) -> Location {
    let lower = description.to_lowercase();
    let mentions = |words: &[&str]| {
        words
            .iter()
            .any(|w| lower.split_whitespace().any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == *w))
    };

    if mentions(&["wallet", "cash", "pocket"]) {
        Location::Wallet
    } else if mentions(&["stack", "bank", "account"]) {
        Location::Stack
    } else {
        match direction {
            Direction::Debit => Location::Wallet,
            Direction::Credit => Location::Stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn raw(amount: Option<f64>) -> RawExtraction {
        RawExtraction {
            amount,
            direction: Some(Direction::Debit),
            category: Some("groceries".to_string()),
            merchant: Some("DMart".to_string()),
            date_phrase: None,
            description: "spent on groceries at DMart".to_string(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_normalize_valid_extraction() {
        let outcome = normalize(
            &raw(Some(500.0)),
            &AliasResolver::new(),
            Balances::new(10_000.0, 2_000.0),
            day(2025, 10, 19),
        );

        match outcome {
            NormalizeOutcome::Transaction(tx) => {
                assert!(tx.amount > 0.0);
                assert_eq!(tx.amount, 500.0);
                assert_eq!(tx.location, Location::Wallet);
                assert_eq!(tx.resulting.wallet, 1_500.0);
                assert_eq!(tx.resulting.stack, 10_000.0);
                assert_eq!(tx.date, day(2025, 10, 19));
            }
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_amount_needs_clarification() {
        let outcome = normalize(
            &raw(None),
            &AliasResolver::new(),
            Balances::default(),
            day(2025, 10, 19),
        );
        assert!(matches!(
            outcome,
            NormalizeOutcome::NeedsClarification(Clarification {
                missing: MissingField::Amount,
                ..
            })
        ));
    }

    #[test]
    fn test_zero_and_negative_amounts_need_clarification() {
        for bad in [0.0, -10.0] {
            let outcome = normalize(
                &raw(Some(bad)),
                &AliasResolver::new(),
                Balances::default(),
                day(2025, 10, 19),
            );
            assert!(
                matches!(outcome, NormalizeOutcome::NeedsClarification(_)),
                "amount {} must not commit",
                bad
            );
        }
    }

    #[test]
    fn test_alias_resolution_applies() {
        let mut aliases = AliasResolver::new();
        aliases.insert("gro", "groceries");

        let mut r = raw(Some(100.0));
        r.category = Some("gro".to_string());

        match normalize(&r, &aliases, Balances::default(), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => assert_eq!(tx.category, "groceries"),
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_category_passes_through() {
        let mut r = raw(Some(100.0));
        r.category = Some("dinner".to_string());

        match normalize(&r, &AliasResolver::new(), Balances::default(), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => assert_eq!(tx.category, "dinner"),
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_date_stamping() {
        let mut r = raw(Some(1000.0));
        r.date_phrase = Some("yesterday".to_string());

        match normalize(&r, &AliasResolver::new(), Balances::default(), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => assert_eq!(tx.date, day(2025, 10, 18)),
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_credit_defaults_to_stack() {
        let mut r = raw(Some(5000.0));
        r.direction = Some(Direction::Credit);
        r.description = "received salary".to_string();

        match normalize(&r, &AliasResolver::new(), Balances::new(100.0, 50.0), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => {
                assert_eq!(tx.location, Location::Stack);
                assert_eq!(tx.resulting.stack, 5_100.0);
            }
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_location_phrase_overrides_default() {
        let mut r = raw(Some(200.0));
        r.description = "paid 200 from bank account".to_string();

        match normalize(&r, &AliasResolver::new(), Balances::new(1000.0, 500.0), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => {
                assert_eq!(tx.location, Location::Stack);
                assert_eq!(tx.resulting.stack, 800.0);
                assert_eq!(tx.resulting.wallet, 500.0);
            }
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_alias_in_text_fills_missing_category() {
        let mut aliases = AliasResolver::new();
        aliases.insert("chai", "food");

        let mut r = raw(Some(20.0));
        r.category = None;
        r.description = "spent 20 on chai".to_string();

        match normalize(&r, &aliases, Balances::default(), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => assert_eq!(tx.category, "food"),
            other => panic!("expected transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_category_defaults() {
        let mut r = raw(Some(75.0));
        r.category = None;

        match normalize(&r, &AliasResolver::new(), Balances::default(), day(2025, 10, 19)) {
            NormalizeOutcome::Transaction(tx) => assert_eq!(tx.category, DEFAULT_CATEGORY),
            other => panic!("expected transaction, got {:?}", other),
        }
    }
}
