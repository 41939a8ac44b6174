//! Lexical keyword scoring, independent of vectors.
//!
//! A lightweight relevance signal: queries are reduced to a set of tokens,
//! and a chunk scores by the fraction of those tokens it contains. No
//! stemming, no inverted index — a deliberate complement to the vector
//! channel, not a search engine.

/// Fixed bilingual stop-word list applied during keyword extraction.
const STOP_WORDS: &[&str] = &[
    // Chinese function words
    "的", "了", "是", "在", "和", "与", "或", "等", "有", "为", "以", "于", "及",
    // English function words
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "and", "or", "but", "if",
    "to", "of", "in", "on", "at", "for", "with",
];

/// True for CJK unified ideographs.
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Extract keywords from text: lowercase, strip characters that are neither
/// alphanumeric nor CJK ideographs, split on whitespace, and drop one-char
/// tokens and stop words.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();

    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || is_cjk(c) || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Fraction of `keywords` occurring as case-insensitive substrings of
/// `content`, in [0, 1]. An empty keyword set scores 0.
pub fn keyword_score(keywords: &[String], content: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }

    let content_lower = content.to_lowercase();
    let matches = keywords
        .iter()
        .filter(|kw| content_lower.contains(kw.as_str()))
        .count();

    matches as f64 / keywords.len() as f64
}
