//! Alias resolution
//!
//! Users register shorthand tokens for categories ("gro" -> "groceries").
//! Lookup is case-insensitive and longest-exact-match only; there is no
//! fuzzy matching, which would silently mis-categorize. Unregistered tokens
//! pass through unchanged as an advisory category guess.

use std::collections::HashMap;

/// Case-insensitive shorthand-to-category table.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    aliases: HashMap<String, String>,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from an existing mapping (e.g. user preferences).
    pub fn from_map(aliases: &HashMap<String, String>) -> Self {
        let aliases = aliases
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
            .collect();
        Self { aliases }
    }

    pub fn insert(&mut self, shorthand: &str, category: &str) {
        self.aliases
            .insert(shorthand.trim().to_lowercase(), category.trim().to_lowercase());
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Resolve a token to its canonical category.
    ///
    /// The whole token is tried first; failing that, the longest registered
    /// alias that exactly equals a whitespace-delimited prefix or suffix run
    /// of the token is used. A token with no registered alias is returned
    /// unchanged (lowercased) — category is advisory, never an error.
    pub fn resolve(&self, token: &str) -> String {
        let token = token.trim().to_lowercase();

        if let Some(canonical) = self.aliases.get(&token) {
            return canonical.clone();
        }

        // Longest-exact-match over word runs inside the token, so "gro run"
        // with alias "gro" still resolves. Candidates sorted longest first.
        let words: Vec<&str> = token.split_whitespace().collect();
        let mut best: Option<&String> = None;
        let mut best_len = 0;

        for start in 0..words.len() {
            for end in (start + 1)..=words.len() {
                let candidate = words[start..end].join(" ");
                if candidate.len() > best_len {
                    if let Some(canonical) = self.aliases.get(&candidate) {
                        best_len = candidate.len();
                        best = Some(canonical);
                    }
                }
            }
        }

        best.cloned().unwrap_or(token)
    }

    /// Find the longest registered alias appearing as a word run in free
    /// text, and return its canonical category. Used when an extraction
    /// carries no category of its own.
    pub fn first_match(&self, text: &str) -> Option<String> {
        let lower = text.trim().to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        let mut best: Option<&String> = None;
        let mut best_len = 0;
        for start in 0..words.len() {
            for end in (start + 1)..=words.len() {
                let candidate = words[start..end].join(" ");
                if candidate.len() > best_len {
                    if let Some(canonical) = self.aliases.get(&candidate) {
                        best_len = candidate.len();
                        best = Some(canonical);
                    }
                }
            }
        }
        best.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AliasResolver {
        let mut r = AliasResolver::new();
        r.insert("gro", "groceries");
        r.insert("gro run", "groceries");
        r.insert("ent", "entertainment");
        r
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(resolver().resolve("gro"), "groceries");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(resolver().resolve("GRO"), "groceries");
        assert_eq!(resolver().resolve("  Ent "), "entertainment");
    }

    #[test]
    fn test_longest_match_wins() {
        let mut r = AliasResolver::new();
        r.insert("gro", "groceries");
        r.insert("gro run", "weekly-groceries");
        assert_eq!(r.resolve("gro run"), "weekly-groceries");
    }

    #[test]
    fn test_unregistered_passes_through() {
        assert_eq!(resolver().resolve("dinner"), "dinner");
        assert_eq!(resolver().resolve("Dinner"), "dinner");
    }

    #[test]
    fn test_no_fuzzy_matching() {
        // "groc" is not "gro"; it must pass through untouched
        assert_eq!(resolver().resolve("groc"), "groc");
    }

    #[test]
    fn test_first_match_in_free_text() {
        let r = resolver();
        assert_eq!(
            r.first_match("spent 20 on gro this morning"),
            Some("groceries".to_string())
        );
        assert_eq!(r.first_match("spent 20 on tea"), None);
    }

    #[test]
    fn test_idempotent() {
        let r = resolver();
        let once = r.resolve("gro");
        let twice = r.resolve(&once);
        // Resolving the result again yields the same canonical category
        assert_eq!(r.resolve(&twice), once);
    }
}
