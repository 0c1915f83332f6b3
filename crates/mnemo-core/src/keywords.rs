//! Keyword extraction and overlap measures.
//!
//! Pattern detection, centrality, structured recall scoring, and digest
//! themes all compare records by the same case-folded, stop-word-free
//! keyword sets.

use std::collections::{HashMap, HashSet};

/// Default minimum keyword length in characters
pub const MIN_KEYWORD_LENGTH: usize = 4;

const DELIMITERS: &[char] = &[
    ' ', '\t', '\n', '\r', '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'',
];

const STOP_WORDS: &[&str] = &[
    "the", "this", "that", "these", "those", "with", "from", "have", "has", "been", "will",
    "would", "could", "should", "what", "when", "where", "which", "while", "your", "their",
    "there", "here",
];

/// Case-sensitive check against the lowercase stop-word list
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Distinct keywords in first-seen order
pub fn extract_keywords(text: &str, min_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for token in text.split(DELIMITERS) {
        if token.chars().count() < min_len {
            continue;
        }
        let word = token.to_lowercase();
        if is_stop_word(&word) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
    }

    keywords
}

/// Keyword set for overlap comparisons
pub fn keyword_set(text: &str, min_len: usize) -> HashSet<String> {
    extract_keywords(text, min_len).into_iter().collect()
}

/// Number of keywords present in both sets
pub fn shared_count(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    if a.len() <= b.len() {
        a.iter().filter(|k| b.contains(*k)).count()
    } else {
        b.iter().filter(|k| a.contains(*k)).count()
    }
}

/// Shared keywords divided by the larger set size; 0 when either is empty
pub fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let larger = a.len().max(b.len());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    shared_count(a, b) as f64 / larger as f64
}

/// Fraction of `query` keywords that appear in `content`
pub fn coverage(query: &HashSet<String>, content: &HashSet<String>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    shared_count(query, content) as f64 / query.len() as f64
}

/// Most frequent keywords across `texts`, ties broken alphabetically
pub fn top_keywords<'a>(
    texts: impl IntoIterator<Item = &'a str>,
    min_len: usize,
    limit: usize,
) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for keyword in extract_keywords(text, min_len) {
            *counts.entry(keyword).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(k, _)| k).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_drops_short_and_stop_words() {
        let keywords = extract_keywords("The user asked: where is THIS config file?", 4);
        assert_eq!(keywords, vec!["user", "asked", "config", "file"]);
    }

    #[test]
    fn test_extract_dedups_case_insensitively() {
        let keywords = extract_keywords("Rust rust RUST borrow", 4);
        assert_eq!(keywords, vec!["rust", "borrow"]);
    }

    #[test]
    fn test_extract_splits_on_punctuation() {
        let keywords = extract_keywords("(deploy)[rollback]{cache}\"quoted\"", 4);
        assert_eq!(keywords, vec!["deploy", "rollback", "cache", "quoted"]);
    }

    #[test]
    fn test_overlap_ratio_uses_larger_set() {
        let a = keyword_set("deploy staging server today", 4);
        let b = keyword_set("deploy staging", 4);
        assert!((overlap_ratio(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(overlap_ratio(&a, &HashSet::new()), 0.0);
    }

    #[test]
    fn test_coverage() {
        let query = keyword_set("database migration", 4);
        let content = keyword_set("ran the database migration twice", 4);
        assert!((coverage(&query, &content) - 1.0).abs() < 1e-9);

        let content = keyword_set("database backup", 4);
        assert!((coverage(&query, &content) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_top_keywords() {
        let texts = ["deploy server", "deploy cache", "cache deploy"];
        let top = top_keywords(texts.iter().copied(), 4, 2);
        assert_eq!(top, vec!["deploy", "cache"]);
    }
}
