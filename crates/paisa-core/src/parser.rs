//! Rule-based fallback extraction
//!
//! Deterministic, dependency-free parsing used when every completion provider
//! is unavailable. Identical input text plus an identical current date always
//! yields an identical [`RawExtraction`]; the parser never fails, it only
//! degrades to a low-confidence, amount-less result.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;

use crate::ai::types::{RawExtraction, LOW_CONFIDENCE};
use crate::models::Direction;

/// Keywords that mark a transaction as money going out.
const DEBIT_KEYWORDS: &[&str] = &[
    "spent", "spend", "paid", "pay", "bought", "buy", "purchased", "purchase", "gave", "ordered",
];

/// Keywords that mark a transaction as money coming in.
const CREDIT_KEYWORDS: &[&str] = &[
    "received", "receive", "earned", "earn", "salary", "credited", "refund", "refunded", "got",
    "income",
];

/// Keyword table for a best-effort category guess. First match wins, so
/// more specific tokens come before generic ones.
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("groceries", "groceries"),
    ("grocery", "groceries"),
    ("vegetables", "groceries"),
    ("dinner", "food"),
    ("lunch", "food"),
    ("breakfast", "food"),
    ("restaurant", "food"),
    ("snacks", "food"),
    ("coffee", "food"),
    ("food", "food"),
    ("petrol", "fuel"),
    ("diesel", "fuel"),
    ("fuel", "fuel"),
    ("uber", "transport"),
    ("taxi", "transport"),
    ("cab", "transport"),
    ("metro", "transport"),
    ("bus", "transport"),
    ("train", "transport"),
    ("transport", "transport"),
    ("electricity", "bills"),
    ("rent", "bills"),
    ("recharge", "bills"),
    ("internet", "bills"),
    ("bill", "bills"),
    ("bills", "bills"),
    ("movie", "entertainment"),
    ("entertainment", "entertainment"),
    ("clothes", "shopping"),
    ("shopping", "shopping"),
];

/// Deterministic pattern-based extractor.
pub struct RuleParser {
    amount_re: Regex,
    merchant_re: Regex,
    capitalized_re: Regex,
}

impl RuleParser {
    pub fn new() -> Self {
        Self {
            // First monetary magnitude: optional currency marker, digits with
            // optional thousand separators and decimals.
            amount_re: Regex::new(r"(?:₹|\brs\.?\s*)?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)")
                .expect("valid regex"),
            // "at DMart", "from Big Bazaar"
            merchant_re: Regex::new(r"(?:\bat|\bfrom|\bto)\s+([A-Z][\w']*(?:\s+[A-Z][\w']*)*)")
                .expect("valid regex"),
            // Any capitalized token not at the start of the text
            capitalized_re: Regex::new(r"\S\s+([A-Z][a-z][\w']*)").expect("valid regex"),
        }
    }

    /// Parse free text against the given current date.
    pub fn parse(&self, text: &str, today: NaiveDate) -> RawExtraction {
        let lower = text.to_lowercase();

        let amount = self.extract_amount(text);
        let direction = classify_direction(&lower);
        let category = guess_category(&lower);
        let date_phrase = find_date_phrase(&lower, today);
        let merchant = self.guess_merchant(text);

        // Heuristic confidence: an amount is the load-bearing field, a
        // category guess adds a little. Without an amount the result is not
        // actionable and the caller must ask for clarification.
        let confidence = match (&amount, &category) {
            (Some(_), Some(_)) => 0.6,
            (Some(_), None) => 0.5,
            (None, _) => LOW_CONFIDENCE,
        };

        RawExtraction {
            amount,
            direction: Some(direction),
            category,
            merchant,
            date_phrase,
            description: text.trim().to_string(),
            confidence,
        }
    }

    fn extract_amount(&self, text: &str) -> Option<f64> {
        let caps = self.amount_re.captures(text)?;
        let cleaned = caps[1].replace(',', "");
        cleaned.parse::<f64>().ok().filter(|a| *a > 0.0)
    }

    fn guess_merchant(&self, text: &str) -> Option<String> {
        if let Some(caps) = self.merchant_re.captures(text) {
            return Some(caps[1].to_string());
        }
        // Fall back to any capitalized mid-sentence token
        self.capitalized_re
            .captures(text)
            .map(|caps| caps[1].to_string())
            .filter(|m| !is_date_word(&m.to_lowercase()))
    }
}

impl Default for RuleParser {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_direction(lower: &str) -> Direction {
    let has = |words: &[&str]| {
        words
            .iter()
            .any(|w| lower.split_whitespace().any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == *w))
    };

    if has(CREDIT_KEYWORDS) && !has(DEBIT_KEYWORDS) {
        Direction::Credit
    } else {
        // Spending is the overwhelmingly common case in chat entry
        Direction::Debit
    }
}

fn guess_category(lower: &str) -> Option<String> {
    for (keyword, category) in CATEGORY_KEYWORDS {
        if lower
            .split_whitespace()
            .any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == *keyword)
        {
            return Some((*category).to_string());
        }
    }
    None
}

fn is_date_word(word: &str) -> bool {
    matches!(
        word,
        "today"
            | "yesterday"
            | "monday"
            | "tuesday"
            | "wednesday"
            | "thursday"
            | "friday"
            | "saturday"
            | "sunday"
    )
}

/// Locate the first relative date phrase in the (lowercased) text.
///
/// Returns the normalized phrase, suitable for [`resolve_date_phrase`].
fn find_date_phrase(lower: &str, _today: NaiveDate) -> Option<String> {
    if lower.contains("day before yesterday") {
        return Some("day before yesterday".to_string());
    }
    if lower.contains("yesterday") {
        return Some("yesterday".to_string());
    }
    if lower.contains("today") {
        return Some("today".to_string());
    }
    if lower.contains("last week") {
        return Some("last week".to_string());
    }
    for day in [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ] {
        if lower
            .split_whitespace()
            .any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == day)
        {
            return Some(day.to_string());
        }
    }
    None
}

/// Resolve a relative date phrase to an absolute date.
///
/// Weekday names resolve to the most recent occurrence strictly before
/// today. Unknown phrases resolve to None; callers default to today.
pub fn resolve_date_phrase(phrase: &str, today: NaiveDate) -> Option<NaiveDate> {
    let phrase = phrase.trim().to_lowercase();
    let phrase = phrase.strip_prefix("last ").unwrap_or(&phrase);

    match phrase {
        "today" | "now" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        "day before yesterday" => Some(today - Duration::days(2)),
        "week" => Some(today - Duration::days(7)),
        _ => {
            let weekday = parse_weekday(phrase)?;
            let mut back = 1;
            while (today - Duration::days(back)).weekday() != weekday {
                back += 1;
            }
            Some(today - Duration::days(back))
        }
    }
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_basic_expense() {
        let parser = RuleParser::new();
        let raw = parser.parse("spent 500 on groceries at DMart", day(2025, 10, 19));

        assert_eq!(raw.amount, Some(500.0));
        assert_eq!(raw.direction, Some(Direction::Debit));
        assert_eq!(raw.category.as_deref(), Some("groceries"));
        assert_eq!(raw.merchant.as_deref(), Some("DMart"));
        assert!(raw.confidence > LOW_CONFIDENCE);
    }

    #[test]
    fn test_parse_no_amount_is_low_confidence() {
        let parser = RuleParser::new();
        let raw = parser.parse("bought some vegetables", day(2025, 10, 19));

        assert_eq!(raw.amount, None);
        assert!(raw.confidence <= LOW_CONFIDENCE);
        assert!(!raw.is_actionable());
    }

    #[test]
    fn test_parse_never_panics_on_odd_input() {
        let parser = RuleParser::new();
        for text in ["", "!!!", "₹₹₹", "0", "......", "на русском języku"] {
            let raw = parser.parse(text, day(2025, 10, 19));
            // Amount of zero is rejected; these should all be non-actionable
            assert!(!raw.is_actionable(), "input {:?}", text);
        }
    }

    #[test]
    fn test_parse_thousand_separators() {
        let parser = RuleParser::new();
        let raw = parser.parse("paid 1,50,0 for stuff", day(2025, 10, 19));
        // Malformed grouping still yields the first valid magnitude
        assert!(raw.amount.is_some());

        let raw = parser.parse("paid 12,500 rent", day(2025, 10, 19));
        assert_eq!(raw.amount, Some(12500.0));
        assert_eq!(raw.category.as_deref(), Some("bills"));
    }

    #[test]
    fn test_parse_credit_keywords() {
        let parser = RuleParser::new();
        let raw = parser.parse("received salary 45000", day(2025, 10, 19));
        assert_eq!(raw.direction, Some(Direction::Credit));
        assert_eq!(raw.amount, Some(45000.0));
    }

    #[test]
    fn test_parse_defaults_to_debit() {
        let parser = RuleParser::new();
        let raw = parser.parse("300 for coffee", day(2025, 10, 19));
        assert_eq!(raw.direction, Some(Direction::Debit));
    }

    #[test]
    fn test_parse_yesterday_dinner_scenario() {
        let parser = RuleParser::new();
        let raw = parser.parse("yesterday I paid 1000 for dinner", day(2025, 10, 19));

        assert_eq!(raw.amount, Some(1000.0));
        assert_eq!(raw.date_phrase.as_deref(), Some("yesterday"));
        assert_eq!(raw.category.as_deref(), Some("food"));
        assert_eq!(
            resolve_date_phrase(raw.date_phrase.as_deref().unwrap(), day(2025, 10, 19)),
            Some(day(2025, 10, 18))
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = RuleParser::new();
        let a = parser.parse("spent 250 on fuel yesterday", day(2025, 10, 19));
        let b = parser.parse("spent 250 on fuel yesterday", day(2025, 10, 19));
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_weekday_strictly_before_today() {
        // 2025-10-19 is a Sunday
        let today = day(2025, 10, 19);
        assert_eq!(resolve_date_phrase("friday", today), Some(day(2025, 10, 17)));
        // A weekday matching today resolves to the previous week
        assert_eq!(resolve_date_phrase("sunday", today), Some(day(2025, 10, 12)));
        assert_eq!(resolve_date_phrase("last monday", today), Some(day(2025, 10, 13)));
    }

    #[test]
    fn test_resolve_unknown_phrase() {
        assert_eq!(resolve_date_phrase("someday", day(2025, 10, 19)), None);
    }

    #[test]
    fn test_day_before_yesterday() {
        let parser = RuleParser::new();
        let raw = parser.parse("paid 90 for snacks day before yesterday", day(2025, 10, 19));
        assert_eq!(raw.date_phrase.as_deref(), Some("day before yesterday"));
        assert_eq!(
            resolve_date_phrase("day before yesterday", day(2025, 10, 19)),
            Some(day(2025, 10, 17))
        );
    }
}
