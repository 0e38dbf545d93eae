//! Keyword extraction and resume match scoring.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::MatchingConfig;

/// Deduplicated lowercase keywords, kept sorted for stable logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeywordSet(BTreeSet<String>);

impl KeywordSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.0.contains(keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lowercase, split on whitespace, drop stop words and short tokens.
pub fn extract_keywords(text: &str, stop_words: &BTreeSet<String>, min_length: usize) -> KeywordSet {
    text.to_lowercase()
        .split_whitespace()
        .filter(|word| !stop_words.contains(*word) && word.chars().count() >= min_length)
        .map(str::to_string)
        .collect()
}

/// Union in every industry bucket that contains one of the keywords.
/// Terms brought in by expansion are not expanded again.
pub fn expand_with_industry_map(
    keywords: &KeywordSet,
    industry_map: &BTreeMap<String, Vec<String>>,
) -> KeywordSet {
    let mut expanded = keywords.0.clone();
    for keyword in keywords.iter() {
        for terms in industry_map.values() {
            if terms.iter().any(|t| t == keyword) {
                expanded.extend(terms.iter().cloned());
            }
        }
    }
    KeywordSet(expanded)
}

/// Fraction of keywords that occur as substrings of `document_text`.
pub fn match_percentage(document_text: &str, keywords: &KeywordSet) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords.iter().filter(|k| document_text.contains(k)).count();
    hits as f64 / keywords.len() as f64
}

pub fn qualifies(document_text: &str, keywords: &KeywordSet, threshold: f64) -> bool {
    match_percentage(document_text, keywords) >= threshold
}

/// Extract and expand the keywords for free-text search criteria.
pub fn criteria_keywords(criteria: &str, config: &MatchingConfig) -> KeywordSet {
    let base = extract_keywords(criteria, &config.stop_words, config.min_keyword_length);
    expand_with_industry_map(&base, &config.industry_keywords)
}

/// Breakdown of one resume against search criteria.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordAnalysis {
    pub qualified: bool,
    pub match_percentage: f64,
    pub total_keywords: usize,
    pub matching_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub threshold: f64,
}

/// Score `document_text` (already lowercased) against `criteria`.
pub fn analyze(document_text: &str, criteria: &str, config: &MatchingConfig) -> KeywordAnalysis {
    let keywords = criteria_keywords(criteria, config);
    let (matching, missing): (Vec<String>, Vec<String>) = keywords
        .iter()
        .map(str::to_string)
        .partition(|k| document_text.contains(k.as_str()));

    let match_percentage = match_percentage(document_text, &keywords);
    KeywordAnalysis {
        qualified: match_percentage >= config.match_threshold,
        match_percentage,
        total_keywords: keywords.len(),
        matching_keywords: matching,
        missing_keywords: missing,
        threshold: config.match_threshold,
    }
}
