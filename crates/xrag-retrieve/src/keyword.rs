//! Substring-count keyword scoring.

/// Extra score when the whole query occurs verbatim in the text.
pub const PHRASE_BONUS: u32 = 2;

/// Lower-cased, trimmed query plus its tokens (split on non-word characters).
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordQuery {
    phrase: String,
    tokens: Vec<String>,
}

impl KeywordQuery {
    pub fn parse(query: &str) -> Self {
        let phrase = query.trim().to_lowercase();
        let tokens = phrase
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { phrase, tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Sum of non-overlapping token occurrences in `text`, plus the phrase
    /// bonus. `None` when `require_all_terms` is set and a token is missing.
    pub fn score(&self, text: &str, require_all_terms: bool) -> Option<u32> {
        if self.tokens.is_empty() {
            return Some(0);
        }
        let text = text.to_lowercase();
        let mut score = 0u32;
        for token in &self.tokens {
            let count = text.matches(token.as_str()).count() as u32;
            if require_all_terms && count == 0 {
                return None;
            }
            score += count;
        }
        if text.contains(&self.phrase) {
            score += PHRASE_BONUS;
        }
        Some(score)
    }
}
