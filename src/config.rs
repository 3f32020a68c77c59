//! Engine configuration.
//!
//! All tunable thresholds, weights, TTLs, and heuristic tables live here as
//! data so they can be adjusted without recompilation. Every section carries
//! working defaults and loads from a TOML file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow registry settings
    pub registry: RegistryConfig,

    /// Confidence scoring weights
    pub scoring: ScoringConfig,

    /// Wave analysis settings
    pub waves: WavesConfig,

    /// Suggestion engine settings
    pub suggest: SuggestConfig,

    /// Pattern capture settings
    pub capture: CaptureConfig,

    /// Pattern validation settings
    pub validator: ValidatorConfig,

    /// Pattern store settings
    pub store: StoreConfig,

    /// Gotcha registry settings
    pub gotchas: GotchaConfig,

    /// Semantic search settings
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            scoring: ScoringConfig::default(),
            waves: WavesConfig::default(),
            suggest: SuggestConfig::default(),
            capture: CaptureConfig::default(),
            validator: ValidatorConfig::default(),
            store: StoreConfig::default(),
            gotchas: GotchaConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default data directory (`~/.flowsense`).
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".flowsense")
    }
}

/// Workflow registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the workflow definitions YAML file
    pub definitions_path: PathBuf,

    /// Cache time-to-live in seconds
    pub cache_ttl_secs: u64,

    /// Minimum trigger matches for a workflow to be considered
    pub match_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            definitions_path: Config::default_data_dir().join("workflows.yaml"),
            cache_ttl_secs: 300,
            match_threshold: 2,
        }
    }
}

impl RegistryConfig {
    /// Cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Confidence scoring weights. Must sum to exactly 1.0; validated when the
/// scorer is constructed, not at call time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight for the command match signal
    pub command: f64,

    /// Weight for the agent position signal
    pub agent: f64,

    /// Weight for the history depth signal
    pub history: f64,

    /// Weight for the project state fit signal
    pub project_state: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { command: 0.40, agent: 0.25, history: 0.20, project_state: 0.15 }
    }
}

/// Wave analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WavesConfig {
    /// Default duration in minutes for tasks whose name matches a keyword
    pub duration_defaults: Vec<DurationDefault>,

    /// Fallback duration in minutes when no keyword matches
    pub default_duration: u32,
}

/// A keyword-to-duration default entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationDefault {
    /// Substring matched against the task id or name
    pub keyword: String,

    /// Duration in minutes
    pub minutes: u32,
}

impl Default for WavesConfig {
    fn default() -> Self {
        // First match wins, so more specific phases come before generic nouns.
        let table = [
            ("develop", 30),
            ("implement", 30),
            ("review", 20),
            ("qa", 20),
            ("test", 15),
            ("deploy", 10),
            ("epic", 25),
            ("story", 20),
            ("doc", 10),
        ];
        Self {
            duration_defaults: table
                .iter()
                .map(|(keyword, minutes)| DurationDefault {
                    keyword: (*keyword).to_string(),
                    minutes: *minutes,
                })
                .collect(),
            default_duration: 15,
        }
    }
}

impl WavesConfig {
    /// Resolve the duration for a task with no explicit duration.
    pub fn duration_for(&self, task_name: &str) -> u32 {
        let lower = task_name.to_lowercase();
        self.duration_defaults
            .iter()
            .find(|d| lower.contains(&d.keyword))
            .map_or(self.default_duration, |d| d.minutes)
    }
}

/// Suggestion engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Suggestion cache time-to-live in seconds
    pub cache_ttl_secs: u64,

    /// Mean confidence below which a result is flagged uncertain
    pub uncertainty_threshold: f64,

    /// Base boost applied when a learned pattern predicts a suggestion
    pub pattern_boost_base: f64,

    /// Path to the prior-session log, if any
    pub session_log_path: Option<PathBuf>,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            uncertainty_threshold: 0.5,
            pattern_boost_base: 0.05,
            session_log_path: None,
        }
    }
}

impl SuggestConfig {
    /// Cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Pattern capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum sequence length for a capturable pattern
    pub min_sequence_len: usize,

    /// Maximum sequence length retained per session buffer
    pub max_sequence_len: usize,

    /// Commands that mark a workflow as ending
    pub terminal_commands: Vec<String>,

    /// Commands considered key workflow steps; a candidate must contain one
    pub key_commands: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_sequence_len: 3,
            max_sequence_len: 20,
            terminal_commands: vec![
                "push".into(),
                "pr".into(),
                "deploy".into(),
                "complete".into(),
                "done".into(),
                "finish".into(),
            ],
            key_commands: vec![
                "create-epic".into(),
                "create-story".into(),
                "develop-story".into(),
                "review-story".into(),
                "run-tests".into(),
                "qa-gate".into(),
                "commit".into(),
                "deploy".into(),
            ],
        }
    }
}

/// Pattern validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Similarity at or above which two patterns merge
    pub merge_threshold: f64,

    /// Minimum success rate for promotion into ranking
    pub promotion_success_rate: f64,

    /// Minimum occurrences for promotion into ranking
    pub promotion_occurrences: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { merge_threshold: 0.85, promotion_success_rate: 0.8, promotion_occurrences: 2 }
    }
}

/// Pattern store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the patterns JSON file
    pub patterns_path: PathBuf,

    /// Path to the gotchas JSON file
    pub gotchas_path: PathBuf,

    /// Path to the feedback log JSON file
    pub feedback_path: PathBuf,

    /// Maximum number of stored patterns before eviction
    pub max_patterns: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let dir = Config::default_data_dir();
        Self {
            patterns_path: dir.join("patterns.json"),
            gotchas_path: dir.join("gotchas.json"),
            feedback_path: dir.join("feedback.json"),
            max_patterns: 200,
        }
    }
}

/// Gotcha registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GotchaConfig {
    /// Keyword overlap at or above which a gotcha is relevant to a query
    pub relevance_threshold: f64,

    /// Minimum confidence for a gotcha to be returned
    pub min_confidence: f64,

    /// Maximum number of gotchas returned per query
    pub max_results: usize,
}

impl Default for GotchaConfig {
    fn default() -> Self {
        Self { relevance_threshold: 0.7, min_confidence: 0.5, max_results: 5 }
    }
}

/// Semantic search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum score for a result to be included
    pub min_score: f64,

    /// Result cache time-to-live in seconds
    pub cache_ttl_secs: u64,

    /// Synonym groups used by the synonym-aware match method
    pub synonym_groups: Vec<Vec<String>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let groups: &[&[&str]] = &[
            &["create", "make", "generate", "add", "new"],
            &["delete", "remove", "drop", "clear"],
            &["test", "verify", "check", "validate"],
            &["deploy", "push", "release", "ship"],
            &["fix", "repair", "patch", "resolve"],
            &["review", "inspect", "audit", "examine"],
            &["story", "task", "ticket", "issue"],
            &["start", "begin", "init", "open"],
        ];
        Self {
            min_score: 0.3,
            cache_ttl_secs: 30,
            synonym_groups: groups
                .iter()
                .map(|g| g.iter().map(|s| (*s).to_string()).collect())
                .collect(),
        }
    }
}

impl SearchConfig {
    /// Cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
