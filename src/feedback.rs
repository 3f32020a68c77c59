//! Quality-gate feedback processing.
//!
//! Translates externally-produced quality verdicts into pattern confidence
//! adjustments, deprecation of chronically failing patterns, and new gotchas
//! for critical failures. The feedback log is append-only; per-pattern stats
//! are a derived, mutable aggregate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::EngineResult;
use crate::gotchas::{GotchaRegistry, GotchaSource, NewGotcha};
use crate::learning::{PatternStatus, PatternStore};
use crate::storage::JsonStore;

/// Consecutive failures after which a pattern is deprecated.
const DEPRECATION_STRIKES: u32 = 3;

/// External quality-gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Pass,
    Concerns,
    Fail,
    Waived,
}

/// A quality verdict as supplied by the external gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaVerdict {
    /// Overall gate decision
    pub gate_decision: GateDecision,

    /// Blocking issue descriptions
    #[serde(default)]
    pub blocking_issues: Vec<String>,

    /// Whether the security checklist passed, if it ran
    #[serde(default)]
    pub security_checklist: Option<bool>,

    /// Whether the test suite passed, if it ran
    #[serde(default)]
    pub testing: Option<bool>,
}

/// Normalized outcome taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackOutcome {
    Success,
    Partial,
    Failure,
}

/// Severity attached to an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One appended feedback record. Never mutated after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Globally unique id
    pub id: String,

    /// Pattern the verdict applies to, if known
    pub pattern_id: Option<String>,

    /// Normalized outcome
    pub outcome: FeedbackOutcome,

    /// Severity of the outcome
    pub severity: Severity,

    /// Issues carried over from the verdict
    pub issues: Vec<String>,

    /// When the verdict was processed
    pub timestamp: DateTime<Utc>,
}

/// Derived rolling stats per pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternStats {
    pub total_executions: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_failures: u32,
}

/// On-disk shape of the feedback store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackFile {
    #[serde(default)]
    pub version: u32,

    /// Append-only verdict log
    pub records: Vec<FeedbackRecord>,

    /// Derived aggregate keyed by pattern id
    pub stats: HashMap<String, PatternStats>,
}

/// Context accompanying a verdict.
#[derive(Debug, Clone, Default)]
pub struct FeedbackContext {
    /// Pattern the quality run exercised, if known
    pub pattern_id: Option<String>,

    /// Story under review
    pub story: Option<String>,

    /// Command or action the gate evaluated
    pub action: Option<String>,
}

/// What a processed verdict changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackReport {
    /// Pattern ids whose confidence moved
    pub patterns_affected: Vec<String>,

    /// Gotcha ids created from critical failures
    pub gotchas_created: Vec<String>,

    /// Alternative pattern ids worth trying instead
    pub suggestions: Vec<String>,

    /// Human-readable log of applied actions
    pub actions: Vec<String>,
}

/// Applies quality verdicts to the pattern and gotcha stores.
pub struct QaFeedbackProcessor {
    storage: JsonStore,
    file: FeedbackFile,
}

impl std::fmt::Debug for QaFeedbackProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaFeedbackProcessor").field("records", &self.file.records.len()).finish()
    }
}

impl QaFeedbackProcessor {
    /// Open the processor, loading the existing feedback log.
    pub async fn open(config: &StoreConfig) -> Self {
        let storage = JsonStore::new(config.feedback_path.clone());
        let file: FeedbackFile = storage.load().await;
        Self { storage, file }
    }

    /// Open an empty processor over the given path. Used by tests.
    pub fn empty(path: std::path::PathBuf) -> Self {
        Self { storage: JsonStore::new(path), file: FeedbackFile::default() }
    }

    /// Persist the log and stats.
    pub async fn persist(&self) -> EngineResult<()> {
        self.storage.save(&self.file).await
    }

    /// The append-only record log.
    pub fn records(&self) -> &[FeedbackRecord] {
        &self.file.records
    }

    /// Rolling stats for a pattern.
    pub fn stats(&self, pattern_id: &str) -> PatternStats {
        self.file.stats.get(pattern_id).copied().unwrap_or_default()
    }

    /// Process a quality verdict against the stores.
    pub fn process(
        &mut self,
        verdict: &QaVerdict,
        context: &FeedbackContext,
        patterns: &mut PatternStore,
        gotchas: &mut GotchaRegistry,
    ) -> FeedbackReport {
        let (outcome, severity) = classify(verdict);
        let mut report = FeedbackReport::default();

        self.file.records.push(FeedbackRecord {
            id: Uuid::new_v4().to_string(),
            pattern_id: context.pattern_id.clone(),
            outcome,
            severity,
            issues: verdict.blocking_issues.clone(),
            timestamp: Utc::now(),
        });

        if let Some(pattern_id) = &context.pattern_id {
            self.apply_to_pattern(pattern_id, outcome, severity, patterns, &mut report);
        }

        if outcome == FeedbackOutcome::Failure && severity == Severity::Critical {
            let recorded = gotchas.record(NewGotcha {
                pattern: context
                    .action
                    .clone()
                    .unwrap_or_else(|| "quality gate failure".to_string()),
                context: context.story.clone().unwrap_or_else(|| "unknown story".to_string()),
                error: verdict.blocking_issues.first().cloned(),
                reason: format!(
                    "critical quality-gate failure: {}",
                    verdict.blocking_issues.join("; ")
                ),
                alternative: None,
                source: GotchaSource::QaFeedback,
            });
            report.actions.push(format!("recorded gotcha {}", recorded.id()));
            report.gotchas_created.push(recorded.id().to_string());
        }

        report
    }

    fn apply_to_pattern(
        &mut self,
        pattern_id: &str,
        outcome: FeedbackOutcome,
        severity: Severity,
        patterns: &mut PatternStore,
        report: &mut FeedbackReport,
    ) {
        if patterns.get(pattern_id).is_none() {
            warn!(pattern = %pattern_id, "verdict references unknown pattern");
            return;
        }

        let stats = self.file.stats.entry(pattern_id.to_string()).or_default();
        match outcome {
            FeedbackOutcome::Success => {
                stats.total_executions += 1;
                stats.successes += 1;
                stats.consecutive_failures = 0;
            }
            FeedbackOutcome::Failure => {
                stats.total_executions += 1;
                stats.failures += 1;
                stats.consecutive_failures += 1;
            }
            // Partial outcomes count the run but leave the streak untouched.
            FeedbackOutcome::Partial => {
                stats.total_executions += 1;
            }
        }
        let strikes = stats.consecutive_failures;

        let delta = confidence_delta(outcome, severity);
        if let Ok(confidence) = patterns.adjust_confidence(pattern_id, delta) {
            report.patterns_affected.push(pattern_id.to_string());
            report.actions.push(format!(
                "adjusted confidence of {pattern_id} by {delta:+.2} to {confidence:.2}"
            ));
        }

        match outcome {
            FeedbackOutcome::Success | FeedbackOutcome::Failure => {
                let _ = patterns.record_execution(pattern_id, outcome == FeedbackOutcome::Success);
            }
            FeedbackOutcome::Partial => {}
        }

        if strikes >= DEPRECATION_STRIKES
            && patterns.get(pattern_id).map(|p| p.status) != Some(PatternStatus::Deprecated)
        {
            if patterns.deprecate(pattern_id).is_ok() {
                info!(pattern = %pattern_id, strikes, "pattern deprecated after repeated failures");
                report.actions.push(format!(
                    "deprecated {pattern_id} after {strikes} consecutive failures"
                ));
            }
        }

        if outcome == FeedbackOutcome::Failure {
            report.suggestions = self.alternatives_for(pattern_id, patterns);
            if !report.suggestions.is_empty() {
                report
                    .actions
                    .push(format!("suggested {} alternative pattern(s)", report.suggestions.len()));
            }
        }
    }

    /// Alternative patterns of the same workflow with a proven track record.
    fn alternatives_for(&self, failing_id: &str, patterns: &PatternStore) -> Vec<String> {
        let workflow = patterns.get(failing_id).and_then(|p| p.workflow.clone());

        patterns
            .all()
            .iter()
            .filter(|p| p.id != failing_id)
            .filter(|p| p.status != PatternStatus::Deprecated)
            .filter(|p| p.workflow == workflow)
            .filter(|p| {
                let stats = self.stats(&p.id);
                let executions = stats.total_executions.max(p.occurrences);
                p.success_rate >= 0.8 && executions >= 3
            })
            .map(|p| p.id.clone())
            .collect()
    }
}

/// Map a verdict to the outcome taxonomy.
fn classify(verdict: &QaVerdict) -> (FeedbackOutcome, Severity) {
    match verdict.gate_decision {
        GateDecision::Pass => (FeedbackOutcome::Success, Severity::Low),
        GateDecision::Concerns | GateDecision::Waived => (FeedbackOutcome::Partial, Severity::Medium),
        GateDecision::Fail => {
            let security_failed = verdict.security_checklist == Some(false);
            let critical_issue = verdict.blocking_issues.iter().any(|issue| {
                let lower = issue.to_lowercase();
                lower.contains("security") || lower.contains("data loss") || lower.contains("critical")
            });
            let severity = if security_failed || critical_issue {
                Severity::Critical
            } else {
                Severity::High
            };
            (FeedbackOutcome::Failure, severity)
        }
    }
}

/// Confidence delta for an outcome, critical failures hitting hardest.
fn confidence_delta(outcome: FeedbackOutcome, severity: Severity) -> f64 {
    match (outcome, severity) {
        (FeedbackOutcome::Success, _) => 0.05,
        (FeedbackOutcome::Partial, _) => -0.05,
        (FeedbackOutcome::Failure, Severity::Critical) => -0.2,
        (FeedbackOutcome::Failure, _) => -0.1,
    }
}
