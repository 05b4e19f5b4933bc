//! JSON parsing helpers for completion-provider responses
//!
//! Models often wrap the JSON payload in prose or code fences, so the
//! helpers here locate the first balanced JSON object before deserializing.

use serde::Deserialize;

use crate::models::Direction;

use super::types::{ProviderFailure, RawExtraction};

/// Extraction payload as providers are prompted to emit it.
///
/// Field coercion is deliberately loose: small models frequently return the
/// amount as a string, or an empty string for missing fields.
#[derive(Debug, Deserialize)]
struct WireExtraction {
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    merchant: Option<String>,
    #[serde(default)]
    date_phrase: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Locate the first balanced `{...}` object in a model reply.
fn find_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0;

    for (i, c) in response[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn coerce_amount(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|a| *a > 0.0),
        serde_json::Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            cleaned.parse::<f64>().ok().filter(|a| *a > 0.0)
        }
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse a provider reply into a [`RawExtraction`].
///
/// `original_text` backfills the description when the model omits one.
pub fn parse_extraction(
    response: &str,
    original_text: &str,
) -> Result<RawExtraction, ProviderFailure> {
    let response = response.trim();

    let json_str = find_json_object(response).ok_or_else(|| {
        let truncated = if response.len() > 200 {
            format!("{}...", &response[..200])
        } else {
            response.to_string()
        };
        ProviderFailure::MalformedResponse(format!("no JSON object in reply: {}", truncated))
    })?;

    let wire: WireExtraction = serde_json::from_str(json_str)
        .map_err(|e| ProviderFailure::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let amount = wire.amount.as_ref().and_then(coerce_amount);
    let direction = wire
        .direction
        .as_deref()
        .and_then(|d| d.trim().to_lowercase().parse::<Direction>().ok());

    let description =
        non_empty(wire.description).unwrap_or_else(|| original_text.trim().to_string());

    // Provider-reported confidence, clamped; absent means we only trust the
    // result as far as it carries an amount.
    let confidence = wire
        .confidence
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(if amount.is_some() { 0.8 } else { 0.2 });

    Ok(RawExtraction {
        amount,
        direction,
        category: non_empty(wire.category).map(|c| c.to_lowercase()),
        merchant: non_empty(wire.merchant),
        date_phrase: non_empty(wire.date_phrase).map(|p| p.to_lowercase()),
        description,
        confidence,
    })
}
