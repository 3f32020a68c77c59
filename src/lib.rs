//! # Flowsense
//!
//! Workflow intelligence engine for AI-assisted delivery sessions.
//!
//! Flowsense turns a history of commands, agents and project state into
//! ranked next-action suggestions, parallel execution plans, and a
//! self-tuning store of learned command patterns.
//!
//! ## Subsystems
//!
//! - **Registry**: loads workflow definitions (named graphs of states and
//!   triggers) and matches command histories against them
//! - **Scoring**: multi-factor confidence scoring of candidate suggestions
//! - **Waves**: dependency-graph analysis into parallel "waves" with cycle
//!   detection and critical-path computation
//! - **Suggest**: context assembly and ranked next-action suggestions
//! - **Learning**: pattern capture, validation, storage, and semantic search
//! - **Gotchas**: known failure patterns, keyword-indexed
//! - **Feedback**: quality-gate verdicts tuning pattern confidence
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowsense::{Config, ContextOptions, Engine};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.registry.definitions_path = "workflows.yaml".into();
//!
//! let engine = Engine::new(config).await?;
//! let context = engine.build_context(ContextOptions::default()).await;
//! let suggestions = engine.suggest_next(&context).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::collapsible_if)]

pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod gotchas;
pub mod learning;
pub mod registry;
pub mod scoring;
pub mod storage;
pub mod suggest;
pub mod waves;

pub use config::Config;
pub use engine::{Engine, LearnOutcome};
pub use error::{EngineError, EngineResult};
pub use feedback::{
    FeedbackContext, FeedbackOutcome, FeedbackRecord, FeedbackReport, GateDecision, PatternStats,
    QaFeedbackProcessor, QaVerdict, Severity,
};
pub use gotchas::{Gotcha, GotchaMatch, GotchaRegistry, GotchaSource, NewGotcha};
pub use learning::{
    CaptureOutcome, MatchMethod, Pattern, PatternCandidate, PatternCapture, PatternStatus,
    PatternStore, PatternValidator, SearchHit, SemanticSearch, StoreOutcome,
};
pub use registry::{
    NextStep, StateTransition, Workflow, WorkflowMatch, WorkflowRegistry, WorkflowSet,
};
pub use scoring::{CandidateSuggestion, ConfidenceScorer, ScoredCandidate};
pub use suggest::{
    ContextOptions, ContextSource, RuntimeSignal, SessionContext, SessionLog, SignalKind,
    Suggestion, SuggestionEngine, SuggestionSet, SuggestionSource, WorkflowPhase,
};
pub use waves::{TaskSpec, Wave, WaveAnalysis, WaveAnalyzer, WaveMetrics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = "flowsense";
