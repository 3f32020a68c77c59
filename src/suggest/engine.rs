//! Ranked next-action suggestions.
//!
//! Composes the workflow registry and confidence scorer, boosts suggestions
//! predicted by learned patterns, lets deterministic runtime signals outrank
//! heuristics, and falls back to a static per-agent table when the registry
//! is unavailable. Results are cached per context key for a short TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::SuggestConfig;
use crate::learning::Pattern;
use crate::registry::{normalize_command, NextStep, WorkflowRegistry};
use crate::scoring::{CandidateSuggestion, ConfidenceScorer};
use crate::suggest::context::{RuntimeSignal, SessionContext};

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// An unambiguous externally-supplied runtime signal
    Deterministic,
    /// A workflow definition next step
    Workflow,
    /// A workflow next step boosted by a learned pattern
    Pattern,
    /// The static per-agent fallback table
    Fallback,
}

impl SuggestionSource {
    fn rank(self) -> u8 {
        match self {
            Self::Deterministic => 0,
            Self::Pattern => 1,
            Self::Workflow => 2,
            Self::Fallback => 3,
        }
    }
}

/// A single ranked suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Command to run next
    pub command: String,

    /// Argument template, if the definition provides one
    pub args: Option<String>,

    /// Human-readable description
    pub description: Option<String>,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Definition priority, lower first
    pub priority: u32,

    /// Provenance of the suggestion
    pub source: SuggestionSource,
}

/// The full result of a suggestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSet {
    /// Matched workflow, if any
    pub workflow: Option<String>,

    /// Current state within the workflow, if resolvable
    pub current_state: Option<String>,

    /// Confidence of the top suggestion
    pub confidence: f64,

    /// Ranked suggestions, best first
    pub suggestions: Vec<Suggestion>,

    /// Whether the mean confidence is below the uncertainty threshold
    pub is_uncertain: bool,

    /// Optional advisory message, set on fallback paths
    pub message: Option<String>,
}

struct CachedSuggestion {
    key: String,
    result: SuggestionSet,
    at: Instant,
}

/// Produces ranked next-action suggestions for a session context.
pub struct SuggestionEngine {
    registry: Arc<WorkflowRegistry>,
    scorer: ConfidenceScorer,
    config: SuggestConfig,
    cache: Mutex<Option<CachedSuggestion>>,
}

impl std::fmt::Debug for SuggestionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionEngine").finish()
    }
}

static FALLBACK_TABLE: Lazy<HashMap<&'static str, Vec<(&'static str, &'static str)>>> =
    Lazy::new(|| {
        let mut table = HashMap::new();
        table.insert(
            "sm",
            vec![
                ("create-story", "Draft the next story from the backlog"),
                ("plan-sprint", "Review and plan the sprint backlog"),
            ],
        );
        table.insert(
            "dev",
            vec![
                ("develop-story", "Pick up the next approved story"),
                ("run-tests", "Run the test suite"),
            ],
        );
        table.insert(
            "qa",
            vec![
                ("review-story", "Review the most recently developed story"),
                ("qa-gate", "Run the quality gate"),
            ],
        );
        table.insert(
            "pm",
            vec![
                ("create-epic", "Define the next epic"),
                ("review-backlog", "Groom the product backlog"),
            ],
        );
        table
    });

impl SuggestionEngine {
    /// Create an engine over a registry and scorer.
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        scorer: ConfidenceScorer,
        config: SuggestConfig,
    ) -> Self {
        Self { registry, scorer, config, cache: Mutex::new(None) }
    }

    /// Produce ranked suggestions for a context.
    ///
    /// `patterns` are the active learned patterns used for boosting; `signal`
    /// is an optional deterministic recommendation that outranks heuristics.
    /// Never errors: registry failures degrade to the static fallback table.
    pub async fn suggest_next(
        &self,
        context: &SessionContext,
        patterns: &[Pattern],
        signal: Option<&RuntimeSignal>,
    ) -> SuggestionSet {
        let key = context_key(context);

        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.key == key && cached.at.elapsed() < self.config.cache_ttl() {
                    debug!("suggestion served from cache");
                    return cached.result.clone();
                }
            }
        }

        let result = self.compute(context, patterns, signal).await;

        *self.cache.lock() =
            Some(CachedSuggestion { key, result: result.clone(), at: Instant::now() });
        result
    }

    /// Drop the cached result.
    pub fn invalidate_cache(&self) {
        *self.cache.lock() = None;
    }

    async fn compute(
        &self,
        context: &SessionContext,
        patterns: &[Pattern],
        signal: Option<&RuntimeSignal>,
    ) -> SuggestionSet {
        let matched = match self.registry.match_workflow(&context.last_commands).await {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "workflow registry unavailable, using fallback suggestions");
                return self.fallback(context, signal, "workflow registry unavailable");
            }
        };

        let Some(matched) = matched else {
            return self.fallback(context, signal, "no workflow matched the recent history");
        };

        // The set is already cached by the registry; this re-read is cheap.
        let Ok(set) = self.registry.load().await else {
            return self.fallback(context, signal, "workflow registry unavailable");
        };

        let current_state = context.last_command.as_deref().and_then(|cmd| {
            WorkflowRegistry::find_current_state(&set, &matched.name, cmd).map(str::to_string)
        });

        let steps = current_state
            .as_deref()
            .map(|state| WorkflowRegistry::next_steps(&set, &matched.name, state))
            .unwrap_or_default();

        if steps.is_empty() {
            return self.fallback(context, signal, "no next steps defined for the current state");
        }

        let workflow = set.get(&matched.name);
        let agents = workflow.map(|w| w.agents.clone()).unwrap_or_default();
        let triggers: Vec<String> =
            workflow.map(|w| w.triggers().map(str::to_string).collect()).unwrap_or_default();

        let mut suggestions: Vec<Suggestion> = steps
            .iter()
            .map(|step| self.score_step(step, &agents, &triggers, context, &set, &matched.name))
            .collect();

        apply_pattern_boosts(&mut suggestions, patterns, context, self.config.pattern_boost_base);

        if let Some(signal) = signal {
            prepend_signal(&mut suggestions, signal);
        }

        sort_suggestions(&mut suggestions);

        finish(Some(matched.name), current_state, suggestions, None, self.config.uncertainty_threshold)
    }

    /// Score one next step through the confidence scorer, blended with the
    /// transition confidence from the definition.
    fn score_step(
        &self,
        step: &NextStep,
        agents: &[String],
        triggers: &[String],
        context: &SessionContext,
        set: &crate::registry::WorkflowSet,
        workflow: &str,
    ) -> Suggestion {
        let candidate = CandidateSuggestion {
            trigger: step.command.clone(),
            agents: agents.to_vec(),
            key_commands: triggers.to_vec(),
        };
        let scored = self.scorer.score(Some(&candidate), Some(context));

        let transition_confidence = set
            .get(workflow)
            .and_then(|w| w.states.iter().find(|t| t.trigger == step.command))
            .map_or(0.7, |t| t.confidence);

        Suggestion {
            command: step.command.clone(),
            args: step.args.clone(),
            description: step.description.clone(),
            confidence: (scored * 0.7 + transition_confidence * 0.3).clamp(0.0, 1.0),
            priority: step.priority,
            source: SuggestionSource::Workflow,
        }
    }

    /// Static per-agent suggestions for when the registry cannot help.
    fn fallback(
        &self,
        context: &SessionContext,
        signal: Option<&RuntimeSignal>,
        message: &str,
    ) -> SuggestionSet {
        let agent = context.agent_id.as_deref().unwrap_or("dev");
        let entries = FALLBACK_TABLE.get(agent).or_else(|| FALLBACK_TABLE.get("dev"));

        let mut suggestions: Vec<Suggestion> = entries
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(idx, (command, description))| Suggestion {
                command: (*command).to_string(),
                args: None,
                description: Some((*description).to_string()),
                confidence: 0.3,
                priority: idx as u32 + 1,
                source: SuggestionSource::Fallback,
            })
            .collect();

        if let Some(signal) = signal {
            prepend_signal(&mut suggestions, signal);
        }
        sort_suggestions(&mut suggestions);

        finish(
            None,
            None,
            suggestions,
            Some(message.to_string()),
            self.config.uncertainty_threshold,
        )
    }
}

/// Boost suggestions whose command a learned pattern predicts as the
/// successor of the recent history.
fn apply_pattern_boosts(
    suggestions: &mut [Suggestion],
    patterns: &[Pattern],
    context: &SessionContext,
    base: f64,
) {
    let Some(last) = context.last_command.as_deref().map(normalize_command) else {
        return;
    };

    for pattern in patterns {
        let Some(position) =
            pattern.sequence.iter().rposition(|cmd| normalize_command(cmd) == last)
        else {
            continue;
        };
        let Some(predicted) = pattern.sequence.get(position + 1) else {
            continue;
        };

        let similarity = prefix_similarity(&pattern.sequence[..=position], &context.last_commands);
        let boost = base
            + (f64::from(pattern.occurrences) * 0.02).min(0.1)
            + pattern.success_rate * 0.05
            + similarity * 0.05;

        let predicted_norm = normalize_command(predicted);
        for suggestion in suggestions.iter_mut() {
            if normalize_command(&suggestion.command) == predicted_norm {
                suggestion.confidence = (suggestion.confidence + boost).min(1.0);
                suggestion.source = SuggestionSource::Pattern;
                debug!(command = %suggestion.command, boost, "pattern boost applied");
            }
        }
    }
}

/// Fraction of the pattern prefix found at identical offsets from the end of
/// the history.
fn prefix_similarity(prefix: &[String], history: &[String]) -> f64 {
    if prefix.is_empty() || history.is_empty() {
        return 0.0;
    }

    let matched = prefix
        .iter()
        .rev()
        .zip(history.iter().rev())
        .filter(|(p, h)| normalize_command(p) == normalize_command(h))
        .count();
    matched as f64 / prefix.len() as f64
}

/// Prepend a deterministic recommendation, deduplicating heuristic entries
/// for the same command.
fn prepend_signal(suggestions: &mut Vec<Suggestion>, signal: &RuntimeSignal) {
    let command_norm = normalize_command(&signal.command);

    let existing_confidence = suggestions
        .iter()
        .filter(|s| normalize_command(&s.command) == command_norm)
        .map(|s| s.confidence)
        .fold(0.0, f64::max);
    suggestions.retain(|s| normalize_command(&s.command) != command_norm);

    suggestions.insert(
        0,
        Suggestion {
            command: signal.command.clone(),
            args: signal.args.clone(),
            description: Some(signal.reason.clone()),
            confidence: existing_confidence.max(0.9),
            priority: 0,
            source: SuggestionSource::Deterministic,
        },
    );
}

/// Descending confidence; deterministic sources win ties.
fn sort_suggestions(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.source.rank().cmp(&b.source.rank()))
            .then(a.priority.cmp(&b.priority))
    });
}

fn finish(
    workflow: Option<String>,
    current_state: Option<String>,
    suggestions: Vec<Suggestion>,
    message: Option<String>,
    uncertainty_threshold: f64,
) -> SuggestionSet {
    let confidence = suggestions.first().map_or(0.0, |s| s.confidence);
    let mean = if suggestions.is_empty() {
        0.0
    } else {
        suggestions.iter().map(|s| s.confidence).sum::<f64>() / suggestions.len() as f64
    };

    SuggestionSet {
        workflow,
        current_state,
        confidence,
        suggestions,
        is_uncertain: mean < uncertainty_threshold,
        message,
    }
}

/// Deterministic cache key over the identifying parts of a context.
fn context_key(context: &SessionContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(context.agent_id.as_deref().unwrap_or(""));
    hasher.update([0]);
    hasher.update(context.last_command.as_deref().unwrap_or(""));
    hasher.update([0]);
    for cmd in context.last_commands.iter().rev().take(3) {
        hasher.update(cmd.as_bytes());
        hasher.update([0]);
    }
    hasher.update(
        context.story_path.as_ref().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default(),
    );
    hasher.update([0]);
    hasher.update(context.branch.as_deref().unwrap_or(""));
    format!("{:x}", hasher.finalize())
}
