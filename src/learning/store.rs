//! Learned pattern store.
//!
//! Persists patterns to a flat JSON file through the storage seam. Mutations
//! happen in memory and are written back as a whole-file rewrite. Deprecated
//! patterns are retained for audit but excluded from ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{EngineError, EngineResult};
use crate::learning::capture::PatternCandidate;
use crate::learning::validator::{PatternValidator, SimilarityScore, ValidationReport};
use crate::storage::JsonStore;

/// Lifecycle status of a learned pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// Stored but not yet eligible for ranking
    #[default]
    Pending,
    /// Promoted into suggestion ranking
    Active,
    /// Retired after repeated failures; kept for audit
    Deprecated,
}

/// A learned, reusable command sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Globally unique id
    pub id: String,

    /// The command sequence, in execution order
    pub sequence: Vec<String>,

    /// Agents observed running the sequence
    pub agents: Vec<String>,

    /// How many sessions produced this pattern
    pub occurrences: u32,

    /// Fraction of executions that succeeded
    pub success_rate: f64,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Lifecycle status
    pub status: PatternStatus,

    /// When the pattern was first captured
    pub first_seen: DateTime<Utc>,

    /// When the pattern was last observed or used
    pub last_seen: DateTime<Utc>,

    /// Workflow the pattern belongs to, if known
    #[serde(default)]
    pub workflow: Option<String>,
}

impl Pattern {
    /// Build a fresh pattern from a capture candidate.
    fn from_candidate(candidate: &PatternCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: candidate.sequence.clone(),
            agents: candidate.agents.clone(),
            occurrences: 1,
            success_rate: 1.0,
            confidence: 0.5,
            status: PatternStatus::Pending,
            first_seen: now,
            last_seen: now,
            workflow: candidate.workflow.clone(),
        }
    }

    /// Text searched by the semantic matcher.
    pub fn searchable_text(&self) -> String {
        let mut text = self.sequence.join(" ");
        if let Some(workflow) = &self.workflow {
            text.push(' ');
            text.push_str(workflow);
        }
        for agent in &self.agents {
            text.push(' ');
            text.push_str(agent);
        }
        text
    }
}

/// On-disk shape of the pattern store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternFile {
    /// Schema version for future migrations
    #[serde(default)]
    pub version: u32,

    /// All stored patterns, deprecated ones included
    pub patterns: Vec<Pattern>,
}

/// Result of offering a candidate to the store.
#[derive(Debug, Clone)]
pub enum StoreOutcome {
    /// A new pattern was created
    Inserted(String),
    /// The candidate merged into an existing near-duplicate
    Merged { id: String, score: SimilarityScore },
    /// Validation rejected the candidate
    Rejected(ValidationReport),
}

/// Flat-file store of learned patterns.
pub struct PatternStore {
    storage: JsonStore,
    max_patterns: usize,
    file: PatternFile,
}

impl std::fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternStore").field("patterns", &self.file.patterns.len()).finish()
    }
}

impl PatternStore {
    /// Open the store, loading whatever the backing file holds.
    pub async fn open(config: &StoreConfig) -> Self {
        let storage = JsonStore::new(config.patterns_path.clone());
        let file: PatternFile = storage.load().await;
        Self { storage, max_patterns: config.max_patterns, file }
    }

    /// Open an empty in-memory store over the given path. Used by tests.
    pub fn empty(path: std::path::PathBuf, max_patterns: usize) -> Self {
        Self { storage: JsonStore::new(path), max_patterns, file: PatternFile::default() }
    }

    /// Persist the current state as a whole-file rewrite.
    pub async fn persist(&self) -> EngineResult<()> {
        self.storage.save(&self.file).await
    }

    /// Number of stored patterns, deprecated ones included.
    pub fn len(&self) -> usize {
        self.file.patterns.len()
    }

    /// Whether the store holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.file.patterns.is_empty()
    }

    /// Look up a pattern by id.
    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.file.patterns.iter().find(|p| p.id == id)
    }

    /// All stored patterns.
    pub fn all(&self) -> &[Pattern] {
        &self.file.patterns
    }

    /// Patterns with the given status.
    pub fn by_status(&self, status: PatternStatus) -> Vec<&Pattern> {
        self.file.patterns.iter().filter(|p| p.status == status).collect()
    }

    /// Patterns eligible for suggestion ranking: promoted and not deprecated.
    pub fn active(&self, validator: &PatternValidator) -> Vec<&Pattern> {
        self.file
            .patterns
            .iter()
            .filter(|p| p.status != PatternStatus::Deprecated && validator.is_promoted(p))
            .collect()
    }

    /// Offer a validated candidate: merge into a near-duplicate or insert.
    ///
    /// Merging bumps the occurrence count and nudges confidence up by 0.1,
    /// capped at 1.0. Promotion to `Active` happens when the validator's
    /// thresholds are met.
    pub fn offer(
        &mut self,
        candidate: &PatternCandidate,
        validator: &PatternValidator,
        known_commands: &[String],
    ) -> StoreOutcome {
        let report = validator.validate(candidate, known_commands);
        if !report.valid {
            debug!(errors = ?report.errors, "candidate rejected");
            return StoreOutcome::Rejected(report);
        }

        if let Some((existing, score)) = validator.find_duplicate(candidate, &self.file.patterns) {
            let id = existing.id.clone();
            if let Some(pattern) = self.file.patterns.iter_mut().find(|p| p.id == id) {
                pattern.occurrences += 1;
                pattern.confidence = (pattern.confidence + 0.1).min(1.0);
                pattern.last_seen = Utc::now();
                for agent in &candidate.agents {
                    if !pattern.agents.contains(agent) {
                        pattern.agents.push(agent.clone());
                    }
                }
                if pattern.status == PatternStatus::Pending && validator.is_promoted(pattern) {
                    pattern.status = PatternStatus::Active;
                    info!(id = %pattern.id, "pattern promoted");
                }
            }
            return StoreOutcome::Merged { id, score };
        }

        let pattern = Pattern::from_candidate(candidate);
        let id = pattern.id.clone();
        self.file.patterns.push(pattern);
        self.evict_if_needed();
        StoreOutcome::Inserted(id)
    }

    /// Patterns similar to a command sequence, best first.
    pub fn find_similar(&self, sequence: &[String]) -> Vec<(&Pattern, SimilarityScore)> {
        let mut similar: Vec<(&Pattern, SimilarityScore)> = self
            .file
            .patterns
            .iter()
            .map(|p| (p, crate::learning::sequence_similarity(sequence, &p.sequence)))
            .filter(|(_, score)| score.similarity > 0.0)
            .collect();
        similar.sort_by(|a, b| {
            b.1.similarity.partial_cmp(&a.1.similarity).unwrap_or(std::cmp::Ordering::Equal)
        });
        similar
    }

    /// Apply a confidence delta, clamped to [0, 1]. Returns the new value.
    pub fn adjust_confidence(&mut self, id: &str, delta: f64) -> EngineResult<f64> {
        let pattern = self
            .file
            .patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))?;
        pattern.confidence = (pattern.confidence + delta).clamp(0.0, 1.0);
        Ok(pattern.confidence)
    }

    /// Update the rolling success rate from an execution outcome.
    pub fn record_execution(&mut self, id: &str, success: bool) -> EngineResult<()> {
        let pattern = self
            .file
            .patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))?;

        let prior = pattern.success_rate * f64::from(pattern.occurrences);
        pattern.occurrences += 1;
        pattern.success_rate =
            (prior + if success { 1.0 } else { 0.0 }) / f64::from(pattern.occurrences);
        pattern.last_seen = Utc::now();
        Ok(())
    }

    /// Mark a pattern deprecated. It stays in the store for audit.
    pub fn deprecate(&mut self, id: &str) -> EngineResult<()> {
        let pattern = self
            .file
            .patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))?;
        pattern.status = PatternStatus::Deprecated;
        info!(id = %id, "pattern deprecated");
        Ok(())
    }

    /// Refresh `last_seen`, e.g. when a suggestion sourced from the pattern
    /// was accepted.
    pub fn touch(&mut self, id: &str) {
        if let Some(pattern) = self.file.patterns.iter_mut().find(|p| p.id == id) {
            pattern.last_seen = Utc::now();
        }
    }

    /// Drop lowest-confidence patterns once the cap is exceeded.
    fn evict_if_needed(&mut self) {
        while self.file.patterns.len() > self.max_patterns {
            let victim = self
                .file
                .patterns
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    a.1.confidence
                        .partial_cmp(&b.1.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(idx, _)| idx);
            match victim {
                Some(idx) => {
                    let removed = self.file.patterns.remove(idx);
                    debug!(id = %removed.id, confidence = removed.confidence, "evicted pattern");
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, ValidatorConfig};

    fn validator() -> PatternValidator {
        PatternValidator::new(CaptureConfig::default(), ValidatorConfig::default())
    }

    fn candidate(commands: &[&str]) -> PatternCandidate {
        PatternCandidate {
            sequence: commands.iter().map(|c| (*c).to_string()).collect(),
            agents: vec!["dev".into()],
            workflow: Some("story-cycle".into()),
            session_id: "s1".into(),
        }
    }

    fn store_at(dir: &tempfile::TempDir) -> PatternStore {
        PatternStore::empty(dir.path().join("patterns.json"), 200)
    }

    #[tokio::test]
    async fn test_insert_then_merge_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let v = validator();

        let c = candidate(&["create-story", "develop-story", "run-tests"]);
        let outcome = store.offer(&c, &v, &[]);
        let id = match outcome {
            StoreOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {other:?}"),
        };

        let outcome = store.offer(&c, &v, &[]);
        match outcome {
            StoreOutcome::Merged { id: merged_id, score } => {
                assert_eq!(merged_id, id);
                assert!(score.exact);
                assert_eq!(score.similarity, 1.0);
            }
            other => panic!("expected merge, got {other:?}"),
        }

        let pattern = store.get(&id).unwrap();
        assert_eq!(pattern.occurrences, 2);
        assert!((pattern.confidence - 0.6).abs() < 1e-9);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_dissimilar_sequences_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let v = validator();

        store.offer(&candidate(&["create-story", "develop-story", "run-tests", "commit"]), &v, &[]);
        let outcome =
            store.offer(&candidate(&["qa-gate", "review-story", "deploy", "commit"]), &v, &[]);

        assert!(matches!(outcome, StoreOutcome::Inserted(_)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_candidate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let outcome = store.offer(&candidate(&["ls"]), &validator(), &[]);

        match outcome {
            StoreOutcome::Rejected(report) => assert!(!report.errors.is_empty()),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_confidence_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let v = validator();

        let StoreOutcome::Inserted(id) =
            store.offer(&candidate(&["create-story", "develop-story", "run-tests"]), &v, &[])
        else {
            panic!("expected insert");
        };

        store.adjust_confidence(&id, 5.0).unwrap();
        assert_eq!(store.get(&id).unwrap().confidence, 1.0);

        store.adjust_confidence(&id, -5.0).unwrap();
        assert_eq!(store.get(&id).unwrap().confidence, 0.0);
    }

    #[tokio::test]
    async fn test_eviction_drops_lowest_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PatternStore::empty(dir.path().join("patterns.json"), 2);
        let v = validator();

        let StoreOutcome::Inserted(low) =
            store.offer(&candidate(&["create-story", "develop-story", "run-tests"]), &v, &[])
        else {
            panic!()
        };
        let StoreOutcome::Inserted(high) =
            store.offer(&candidate(&["qa-gate", "review-story", "deploy"]), &v, &[])
        else {
            panic!()
        };

        store.adjust_confidence(&low, -0.4).unwrap();
        store.adjust_confidence(&high, 0.4).unwrap();

        store.offer(&candidate(&["create-epic", "commit", "push-release"]), &v, &[]);

        assert_eq!(store.len(), 2);
        assert!(store.get(&low).is_none());
        assert!(store.get(&high).is_some());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let v = validator();

        let saved = {
            let mut store = PatternStore::empty(path.clone(), 200);
            store.offer(&candidate(&["create-story", "develop-story", "run-tests"]), &v, &[]);
            store.persist().await.unwrap();
            store.all().to_vec()
        };

        let config = StoreConfig {
            patterns_path: path,
            gotchas_path: dir.path().join("gotchas.json"),
            feedback_path: dir.path().join("feedback.json"),
            max_patterns: 200,
        };
        let reloaded = PatternStore::open(&config).await;
        assert_eq!(reloaded.all(), saved.as_slice());
    }

    #[tokio::test]
    async fn test_find_similar_orders_by_score() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let v = validator();

        store.offer(&candidate(&["create-story", "develop-story", "run-tests"]), &v, &[]);
        store.offer(&candidate(&["qa-gate", "review-story", "deploy"]), &v, &[]);

        let query =
            vec!["create-story".to_string(), "develop-story".to_string(), "commit".to_string()];
        let similar = store.find_similar(&query);

        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].0.sequence[0], "create-story");
        assert!(similar[0].1.similarity > 0.5);
    }

    #[tokio::test]
    async fn test_active_requires_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_at(&dir);
        let v = validator();

        let c = candidate(&["create-story", "develop-story", "run-tests"]);
        let StoreOutcome::Inserted(id) = store.offer(&c, &v, &[]) else { panic!() };

        // One occurrence: pending, not active.
        assert!(store.active(&v).is_empty());

        // Second observation promotes it.
        store.offer(&c, &v, &[]);
        let active = store.active(&v);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);

        // Deprecation removes it from ranking but not from the store.
        store.deprecate(&id).unwrap();
        assert!(store.active(&v).is_empty());
        assert_eq!(store.len(), 1);
    }
}
