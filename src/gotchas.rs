//! Known failure patterns.
//!
//! A gotcha records a context + action combination known to cause failures,
//! keyed by extracted keywords rather than sequence equality. Confidence only
//! moves through explicit deprecation or feedback, never by time decay.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{GotchaConfig, StoreConfig};
use crate::error::EngineResult;
use crate::storage::JsonStore;

/// Where a gotcha came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GotchaSource {
    /// Created by the QA feedback processor
    QaFeedback,
    /// Authored by a human
    Manual,
}

/// A recorded anti-pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gotcha {
    /// Globally unique id
    pub id: String,

    /// The action that failed
    pub pattern: String,

    /// The context it failed in
    pub context: String,

    /// Error text, if captured
    #[serde(default)]
    pub error: Option<String>,

    /// Why this combination fails
    pub reason: String,

    /// A safer alternative, if known
    #[serde(default)]
    pub alternative: Option<String>,

    /// Keywords extracted from pattern and context
    pub keywords: Vec<String>,

    /// How many times this gotcha was observed
    pub occurrences: u32,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// When the gotcha was first recorded
    pub created_at: DateTime<Utc>,

    /// When the gotcha was last observed
    pub updated_at: DateTime<Utc>,

    /// Origin of the record
    pub source: GotchaSource,
}

/// Input shape for recording a gotcha.
#[derive(Debug, Clone)]
pub struct NewGotcha {
    pub pattern: String,
    pub context: String,
    pub error: Option<String>,
    pub reason: String,
    pub alternative: Option<String>,
    pub source: GotchaSource,
}

/// Result of recording a gotcha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new gotcha was created
    Created(String),
    /// The observation merged into an existing near-duplicate
    Merged(String),
}

impl RecordOutcome {
    /// The id of the created or merged gotcha.
    pub fn id(&self) -> &str {
        match self {
            Self::Created(id) | Self::Merged(id) => id,
        }
    }
}

/// A query hit with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotchaMatch {
    pub gotcha: Gotcha,
    pub relevance: f64,
}

/// On-disk shape of the gotcha store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GotchaFile {
    #[serde(default)]
    pub version: u32,
    pub gotchas: Vec<Gotcha>,
}

/// Keyword-indexed store of known failure patterns.
pub struct GotchaRegistry {
    storage: JsonStore,
    config: GotchaConfig,
    file: GotchaFile,
}

impl std::fmt::Debug for GotchaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GotchaRegistry").field("gotchas", &self.file.gotchas.len()).finish()
    }
}

static WORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

/// Extract lowercase keywords longer than two characters, first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for word in WORD_SPLIT.split(&text.to_lowercase()) {
        if word.len() > 2 && !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
    }
    keywords
}

/// Fraction of a gotcha's keywords present in the query keywords.
fn overlap_fraction(gotcha_keywords: &[String], query_keywords: &[String]) -> f64 {
    if gotcha_keywords.is_empty() {
        return 0.0;
    }
    let shared =
        gotcha_keywords.iter().filter(|k| query_keywords.contains(k)).count();
    shared as f64 / gotcha_keywords.len() as f64
}

impl GotchaRegistry {
    /// Open the registry, loading whatever the backing file holds.
    pub async fn open(store: &StoreConfig, config: GotchaConfig) -> Self {
        let storage = JsonStore::new(store.gotchas_path.clone());
        let file: GotchaFile = storage.load().await;
        Self { storage, config, file }
    }

    /// Open an empty registry over the given path. Used by tests.
    pub fn empty(path: std::path::PathBuf, config: GotchaConfig) -> Self {
        Self { storage: JsonStore::new(path), config, file: GotchaFile::default() }
    }

    /// Persist the current state.
    pub async fn persist(&self) -> EngineResult<()> {
        self.storage.save(&self.file).await
    }

    /// Number of stored gotchas.
    pub fn len(&self) -> usize {
        self.file.gotchas.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.file.gotchas.is_empty()
    }

    /// Look up a gotcha by id.
    pub fn get(&self, id: &str) -> Option<&Gotcha> {
        self.file.gotchas.iter().find(|g| g.id == id)
    }

    /// Record an observation, merging into a near-duplicate when the keyword
    /// overlap reaches the relevance threshold.
    pub fn record(&mut self, new: NewGotcha) -> RecordOutcome {
        let keywords = extract_keywords(&format!("{} {}", new.pattern, new.context));

        let duplicate = self
            .file
            .gotchas
            .iter()
            .map(|g| (g.id.clone(), overlap_fraction(&g.keywords, &keywords)))
            .filter(|(_, overlap)| *overlap >= self.config.relevance_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((id, _)) = duplicate {
            if let Some(gotcha) = self.file.gotchas.iter_mut().find(|g| g.id == id) {
                gotcha.occurrences += 1;
                gotcha.confidence = (gotcha.confidence + 0.05).min(1.0);
                gotcha.updated_at = Utc::now();
                if gotcha.error.is_none() {
                    gotcha.error = new.error;
                }
            }
            return RecordOutcome::Merged(id);
        }

        let now = Utc::now();
        let gotcha = Gotcha {
            id: Uuid::new_v4().to_string(),
            pattern: new.pattern,
            context: new.context,
            error: new.error,
            reason: new.reason,
            alternative: new.alternative,
            keywords,
            occurrences: 1,
            confidence: 0.6,
            created_at: now,
            updated_at: now,
            source: new.source,
        };
        let id = gotcha.id.clone();
        self.file.gotchas.push(gotcha);
        RecordOutcome::Created(id)
    }

    /// Query gotchas relevant to a context description.
    ///
    /// Returns the best matches above the relevance threshold, excluding
    /// low-confidence entries.
    pub fn query(&self, context: &str) -> Vec<GotchaMatch> {
        let query_keywords = extract_keywords(context);
        if query_keywords.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<GotchaMatch> = self
            .file
            .gotchas
            .iter()
            .filter(|g| g.confidence >= self.config.min_confidence)
            .filter_map(|g| {
                let relevance = overlap_fraction(&g.keywords, &query_keywords);
                (relevance >= self.config.relevance_threshold)
                    .then(|| GotchaMatch { gotcha: g.clone(), relevance })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(self.config.max_results);
        matches
    }

    /// Explicitly lower a gotcha's confidence. The only way confidence decays.
    pub fn deprecate(&mut self, id: &str, amount: f64) {
        if let Some(gotcha) = self.file.gotchas.iter_mut().find(|g| g.id == id) {
            gotcha.confidence = (gotcha.confidence - amount).max(0.0);
            gotcha.updated_at = Utc::now();
        }
    }

    /// All stored gotchas.
    pub fn all(&self) -> &[Gotcha] {
        &self.file.gotchas
    }
}
