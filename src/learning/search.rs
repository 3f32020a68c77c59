//! Semantic pattern search.
//!
//! Scores a query against each pattern's searchable text with four methods
//! and keeps the best, not the sum: exact overlap, synonym-aware overlap,
//! in-order subsequence overlap, and per-word edit-distance similarity. Each
//! hit is annotated with the method that won, for explainability.

use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SearchConfig;
use crate::learning::store::Pattern;

/// Which method produced a hit's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Synonym,
    Subsequence,
    EditDistance,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Id of the matched pattern
    pub pattern_id: String,

    /// Best-of-four score in [0, 1]
    pub score: f64,

    /// The method that produced the score
    pub method: MatchMethod,
}

struct CachedSearch {
    key: (String, usize),
    hits: Vec<SearchHit>,
    at: Instant,
}

/// Fuzzy matcher over the pattern store.
pub struct SemanticSearch {
    config: SearchConfig,
    cache: Mutex<Option<CachedSearch>>,
}

impl std::fmt::Debug for SemanticSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticSearch").finish()
    }
}

impl SemanticSearch {
    /// Create a matcher from configuration.
    pub fn new(config: SearchConfig) -> Self {
        Self { config, cache: Mutex::new(None) }
    }

    /// Find the top `limit` patterns matching a query.
    ///
    /// Results below the minimum score are excluded. Repeated queries over an
    /// unchanged store are served from a short-lived cache.
    pub fn search(&self, query: &str, patterns: &[Pattern], limit: usize) -> Vec<SearchHit> {
        let normalized = normalize_query(query);
        let key = (normalized.clone(), patterns.len());

        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.key == key && cached.at.elapsed() < self.config.cache_ttl() {
                    debug!("search served from cache");
                    return cached.hits.iter().take(limit).cloned().collect();
                }
            }
        }

        let query_words: Vec<String> =
            normalized.split_whitespace().map(str::to_string).collect();

        let mut hits: Vec<SearchHit> = patterns
            .iter()
            .filter_map(|pattern| {
                let (score, method) = self.score_pattern(&normalized, &query_words, pattern);
                (score >= self.config.min_score).then(|| SearchHit {
                    pattern_id: pattern.id.clone(),
                    score,
                    method,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        *self.cache.lock() = Some(CachedSearch { key, hits: hits.clone(), at: Instant::now() });
        hits.truncate(limit);
        hits
    }

    /// Best-of-four score for one pattern.
    fn score_pattern(
        &self,
        query: &str,
        query_words: &[String],
        pattern: &Pattern,
    ) -> (f64, MatchMethod) {
        let text = pattern.searchable_text().to_lowercase();
        let text_words: Vec<&str> = text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let candidates = [
            (exact_score(query, query_words, &text, &text_words), MatchMethod::Exact),
            (
                self.synonym_score(query_words, &text_words) * 0.7,
                MatchMethod::Synonym,
            ),
            (subsequence_score(query_words, &text_words) * 0.5, MatchMethod::Subsequence),
            (edit_distance_score(query_words, &text_words) * 0.3, MatchMethod::EditDistance),
        ];

        candidates
            .into_iter()
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0.0, MatchMethod::Exact))
    }

    /// Word overlap where a query word may match any member of its synonym
    /// group.
    fn synonym_score(&self, query_words: &[String], text_words: &[&str]) -> f64 {
        if query_words.is_empty() {
            return 0.0;
        }

        let matched = query_words
            .iter()
            .filter(|qw| {
                text_words.iter().any(|tw| *tw == qw.as_str())
                    || self.synonyms_of(qw).iter().any(|syn| text_words.contains(&syn.as_str()))
            })
            .count();

        matched as f64 / query_words.len() as f64
    }

    fn synonyms_of(&self, word: &str) -> &[String] {
        self.config
            .synonym_groups
            .iter()
            .find(|group| group.iter().any(|w| w == word))
            .map_or(&[], Vec::as_slice)
    }
}

/// Exact match: full-query substring scores 1.0, else plain word overlap.
fn exact_score(query: &str, query_words: &[String], text: &str, text_words: &[&str]) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    if text.contains(query) {
        return 1.0;
    }
    if query_words.is_empty() {
        return 0.0;
    }

    let matched =
        query_words.iter().filter(|qw| text_words.contains(&qw.as_str())).count();
    matched as f64 / query_words.len() as f64
}

/// Fraction of query words appearing in the text in order.
fn subsequence_score(query_words: &[String], text_words: &[&str]) -> f64 {
    if query_words.is_empty() {
        return 0.0;
    }

    let mut matched = 0usize;
    let mut cursor = 0usize;
    for qw in query_words {
        if let Some(offset) = text_words[cursor.min(text_words.len())..]
            .iter()
            .position(|tw| tw == &qw.as_str())
        {
            matched += 1;
            cursor = cursor + offset + 1;
        }
    }

    matched as f64 / query_words.len() as f64
}

/// Average best normalized Levenshtein similarity per query word.
fn edit_distance_score(query_words: &[String], text_words: &[&str]) -> f64 {
    if query_words.is_empty() || text_words.is_empty() {
        return 0.0;
    }

    let total: f64 = query_words
        .iter()
        .map(|qw| {
            text_words
                .iter()
                .map(|tw| normalized_levenshtein(qw, tw))
                .fold(0.0, f64::max)
        })
        .sum();

    total / query_words.len() as f64
}

/// Levenshtein similarity normalized to [0, 1].
fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Classic two-row Levenshtein edit distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
