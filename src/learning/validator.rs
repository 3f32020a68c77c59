//! Pattern validation and duplicate detection.
//!
//! Validation never throws: rule violations come back as a typed report with
//! errors and warnings. Duplicate detection combines set similarity with
//! positional similarity so reordered sequences do not falsely merge.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{CaptureConfig, ValidatorConfig};
use crate::learning::capture::PatternCandidate;
use crate::learning::store::Pattern;
use crate::registry::normalize_command;

/// Outcome of validating a candidate pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the candidate may be stored
    pub valid: bool,

    /// Rule violations that reject the candidate
    pub errors: Vec<String>,

    /// Non-fatal observations
    pub warnings: Vec<String>,
}

/// Similarity between two command sequences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Combined similarity in [0, 1]
    pub similarity: f64,

    /// Whether the sequences are identical
    pub exact: bool,
}

/// Validates candidates and finds near-duplicates among stored patterns.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    capture: CaptureConfig,
    config: ValidatorConfig,
}

impl PatternValidator {
    /// Create a validator from configuration.
    pub fn new(capture: CaptureConfig, config: ValidatorConfig) -> Self {
        Self { capture, config }
    }

    /// The similarity threshold at or above which patterns merge.
    pub fn merge_threshold(&self) -> f64 {
        self.config.merge_threshold
    }

    /// Whether a stored pattern is promoted, i.e. eligible for ranking.
    pub fn is_promoted(&self, pattern: &Pattern) -> bool {
        pattern.success_rate >= self.config.promotion_success_rate
            && pattern.occurrences >= self.config.promotion_occurrences
    }

    /// Validate a candidate against the capture rules and a known-command set.
    pub fn validate(&self, candidate: &PatternCandidate, known_commands: &[String]) -> ValidationReport {
        let mut report = ValidationReport { valid: true, ..Default::default() };
        let len = candidate.sequence.len();

        if len < self.capture.min_sequence_len {
            report.errors.push(format!(
                "sequence too short: {len} < {}",
                self.capture.min_sequence_len
            ));
        }
        if len > self.capture.max_sequence_len {
            report.errors.push(format!(
                "sequence too long: {len} > {}",
                self.capture.max_sequence_len
            ));
        }

        if !candidate.sequence.iter().any(|cmd| self.is_key_command(cmd)) {
            report.errors.push("sequence contains no key workflow command".to_string());
        }

        // Prefix-tolerant recognition: unknown commands are only a warning.
        for cmd in &candidate.sequence {
            let normalized = normalize_command(cmd);
            let recognized = known_commands
                .iter()
                .any(|known| normalized.starts_with(known.as_str()) || known.starts_with(&normalized));
            if !recognized {
                report.warnings.push(format!("unrecognized command '{cmd}'"));
            }
        }

        for window in candidate.sequence.windows(2) {
            if normalize_command(&window[0]) == normalize_command(&window[1]) {
                report.warnings.push(format!("duplicate consecutive command '{}'", window[0]));
            }
        }

        report.valid = report.errors.is_empty();
        report
    }

    /// Whether a command counts as a key workflow step.
    pub fn is_key_command(&self, command: &str) -> bool {
        let normalized = normalize_command(command);
        self.capture.key_commands.iter().any(|key| normalized.contains(key.as_str()))
    }

    /// Find the best near-duplicate of a candidate among stored patterns.
    ///
    /// Returns the pattern id and score when the similarity reaches the merge
    /// threshold.
    pub fn find_duplicate<'a>(
        &self,
        candidate: &PatternCandidate,
        existing: &'a [Pattern],
    ) -> Option<(&'a Pattern, SimilarityScore)> {
        existing
            .iter()
            .map(|pattern| (pattern, sequence_similarity(&candidate.sequence, &pattern.sequence)))
            .filter(|(_, score)| score.similarity >= self.config.merge_threshold)
            .max_by(|a, b| {
                a.1.similarity.partial_cmp(&b.1.similarity).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Similarity of two command sequences: 0.4 x Jaccard over the command sets
/// plus 0.6 x positional identity. An exact match short-circuits to 1.0.
pub fn sequence_similarity(a: &[String], b: &[String]) -> SimilarityScore {
    if a == b {
        return SimilarityScore { similarity: 1.0, exact: true };
    }
    if a.is_empty() || b.is_empty() {
        return SimilarityScore { similarity: 0.0, exact: false };
    }

    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let jaccard =
        set_a.intersection(&set_b).count() as f64 / set_a.union(&set_b).count() as f64;

    let longer = a.len().max(b.len());
    let positional = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| x == y)
        .count() as f64
        / longer as f64;

    SimilarityScore { similarity: jaccard * 0.4 + positional * 0.6, exact: false }
}
