//! Multi-factor confidence scoring.
//!
//! Scores a candidate suggestion against live session context as a weighted
//! sum of four independent signals, each normalized to [0, 1]. The weights
//! are validated once at construction and always sum to exactly 1.0.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::error::{EngineError, EngineResult};
use crate::registry::normalize_command;
use crate::suggest::{SessionContext, WorkflowPhase};

/// Candidate suggestion shape consumed by the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSuggestion {
    /// The trigger command being suggested
    pub trigger: String,

    /// Agent sequence of the owning workflow, in execution order
    pub agents: Vec<String>,

    /// Key commands expected earlier in the history if this is the right path
    pub key_commands: Vec<String>,
}

/// A candidate annotated with its confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: CandidateSuggestion,
    pub score: f64,
}

/// Validated scoring weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    command: f64,
    agent: f64,
    history: f64,
    project_state: f64,
}

impl ScoringWeights {
    /// Build weights, rejecting any set that does not sum to 1.0.
    pub fn new(config: &ScoringConfig) -> EngineResult<Self> {
        let sum = config.command + config.agent + config.history + config.project_state;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(EngineError::InvalidWeights { sum });
        }
        Ok(Self {
            command: config.command,
            agent: config.agent,
            history: config.history,
            project_state: config.project_state,
        })
    }
}

/// Scores suggestions against session context.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: ScoringWeights,
}

impl ConfidenceScorer {
    /// Create a scorer. Fails immediately on mismatched weights.
    pub fn new(config: &ScoringConfig) -> EngineResult<Self> {
        Ok(Self { weights: ScoringWeights::new(config)? })
    }

    /// Score a suggestion against a context.
    ///
    /// Degraded input is a neutral zero, never an error: a missing suggestion
    /// or missing context scores 0.0.
    pub fn score(
        &self,
        suggestion: Option<&CandidateSuggestion>,
        context: Option<&SessionContext>,
    ) -> f64 {
        let (Some(suggestion), Some(context)) = (suggestion, context) else {
            return 0.0;
        };

        let command = self.match_command(&suggestion.trigger, context.last_command.as_deref());
        let agent = Self::match_agent(&suggestion.agents, context.agent_id.as_deref());
        let history = Self::match_history(&suggestion.key_commands, &context.last_commands);
        let state = Self::match_project_state(&suggestion.trigger, context);

        let total = command * self.weights.command
            + agent * self.weights.agent
            + history * self.weights.history
            + state * self.weights.project_state;

        total.clamp(0.0, 1.0)
    }

    /// Score a batch and stable-sort it by descending confidence.
    pub fn rank(
        &self,
        candidates: Vec<CandidateSuggestion>,
        context: &SessionContext,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let score = self.score(Some(&candidate), Some(context));
                ScoredCandidate { candidate, score }
            })
            .collect();

        // Vec::sort_by is stable, so equal scores keep their input order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Command match: 1.0 on normalized equality, else shared word-stem
    /// fraction between trigger and last command.
    fn match_command(&self, trigger: &str, last_command: Option<&str>) -> f64 {
        let Some(last_command) = last_command else { return 0.0 };

        let trigger_norm = normalize_command(trigger);
        let command_norm = normalize_command(last_command);
        if trigger_norm == command_norm {
            return 1.0;
        }

        let a = stem_tokens(&trigger_norm);
        let b = stem_tokens(&command_norm);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let shared = a.intersection(&b).count() as f64;
        let union = a.union(&b).count() as f64;
        shared / union
    }

    /// Agent match: zero when the context agent is absent from the workflow's
    /// agent sequence; otherwise later positions score higher, since
    /// later-stage agents are closer to "next".
    fn match_agent(agents: &[String], agent_id: Option<&str>) -> f64 {
        let Some(agent_id) = agent_id else { return 0.0 };
        let Some(position) = agents.iter().position(|a| a == agent_id) else {
            return 0.0;
        };
        (position + 1) as f64 / agents.len() as f64
    }

    /// History depth: fraction of key commands found in recent history, with
    /// a recency bonus for occurrences near the end.
    fn match_history(key_commands: &[String], history: &[String]) -> f64 {
        if key_commands.is_empty() || history.is_empty() {
            return 0.0;
        }

        let normalized: Vec<String> = history.iter().map(|c| normalize_command(c)).collect();
        let n = normalized.len() as f64;

        let total: f64 = key_commands
            .iter()
            .map(|key| {
                let key_norm = normalize_command(key);
                normalized
                    .iter()
                    .rposition(|cmd| cmd.contains(&key_norm))
                    .map_or(0.0, |idx| 0.5 + 0.5 * ((idx + 1) as f64 / n))
            })
            .sum();

        (total / key_commands.len() as f64).clamp(0.0, 1.0)
    }

    /// Project-state fit: neutral 0.5 baseline, boosted when the trigger text
    /// correlates with a live state signal.
    fn match_project_state(trigger: &str, context: &SessionContext) -> f64 {
        let lower = trigger.to_lowercase();
        let state = &context.project_state;
        let mut score: f64 = 0.5;

        if (lower.contains("commit") || lower.contains("git")) && state.has_uncommitted_changes {
            score += 0.3;
        }
        if lower.contains("test") && state.failing_tests {
            score += 0.3;
        }
        if (lower.contains("deploy") || lower.contains("push"))
            && state.phase == WorkflowPhase::Deployment
        {
            score += 0.2;
        }
        if (lower.contains("review") || lower.contains("qa")) && state.phase == WorkflowPhase::Review
        {
            score += 0.2;
        }
        if lower.contains("develop") && state.story_active {
            score += 0.15;
        }

        score.clamp(0.0, 1.0)
    }
}

/// Tokenize on non-alphanumeric boundaries and reduce to crude word stems.
fn stem_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(stem)
        .collect()
}

/// Crude suffix stripping, enough to equate "testing"/"tested"/"tests".
fn stem(token: &str) -> String {
    let t = token.to_lowercase();
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(stripped) = t.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped.to_string();
            }
        }
    }
    t
}
