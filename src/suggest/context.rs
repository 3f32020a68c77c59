//! Session context assembly.
//!
//! The engine never detects git state or session history itself; a
//! `ContextSource` supplies those signals best-effort and missing sources
//! degrade to defaults. Context is ephemeral and rebuilt per invocation.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::JsonStore;

/// Coarse workflow phase derived from the most recent command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowPhase {
    Planning,
    Development,
    Review,
    Deployment,
    #[default]
    Unknown,
}

impl WorkflowPhase {
    /// Infer the phase from the last command by substring match.
    pub fn from_command(command: &str) -> Self {
        let lower = command.to_lowercase();
        if lower.contains("develop") {
            Self::Development
        } else if lower.contains("review") || lower.contains("qa") {
            Self::Review
        } else if lower.contains("push") || lower.contains("deploy") {
            Self::Deployment
        } else if lower.contains("create") || lower.contains("story") || lower.contains("epic") {
            Self::Planning
        } else {
            Self::Unknown
        }
    }
}

/// Live project state signals consumed by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    /// Inferred workflow phase
    pub phase: WorkflowPhase,

    /// Whether the working tree has uncommitted changes
    pub has_uncommitted_changes: bool,

    /// Whether the last known test run failed
    pub failing_tests: bool,

    /// Whether a story file is currently in progress
    pub story_active: bool,
}

/// Ephemeral session context, rebuilt per invocation from external signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Active agent id, e.g. "dev" or "qa"
    pub agent_id: Option<String>,

    /// Most recent command
    pub last_command: Option<String>,

    /// Recent command history, oldest first
    pub last_commands: Vec<String>,

    /// Path to the active story file
    pub story_path: Option<PathBuf>,

    /// Current git branch, if a detector supplied one
    pub branch: Option<String>,

    /// Live project state signals
    pub project_state: ProjectState,
}

/// A prior-session log as written by the host process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLog {
    /// Commands from the previous session, oldest first
    pub last_commands: Vec<String>,

    /// Story that was in progress, if any
    pub current_story: Option<String>,

    /// Whether a workflow was active when the session ended
    pub workflow_active: bool,

    /// Uncommitted-changes flag at session end
    pub has_uncommitted_changes: bool,

    /// Failing-tests flag at session end
    pub failing_tests: bool,
}

/// An unambiguous next action derived from a deterministic runtime signal
/// (story status, QA gate, CI result) supplied by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSignal {
    /// Which collaborator produced the signal
    pub kind: SignalKind,

    /// The recommended command
    pub command: String,

    /// Argument template for the command
    #[serde(default)]
    pub args: Option<String>,

    /// Why this action is unambiguous
    pub reason: String,
}

/// Origin of a deterministic runtime signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Story,
    Qa,
    Ci,
}

/// External provider of session signals. All methods are best-effort.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// The prior-session log, if one exists.
    async fn session_log(&self) -> Option<SessionLog>;

    /// The current git branch. Detection itself lives outside the engine.
    async fn branch(&self) -> Option<String>;

    /// A deterministic next-action signal, if one is currently unambiguous.
    async fn runtime_signal(&self) -> Option<RuntimeSignal>;
}

/// Context source backed by a session-log file. Branch detection and runtime
/// signals are left to richer hosts.
#[derive(Debug, Clone, Default)]
pub struct FileSessionSource {
    log_path: Option<PathBuf>,
}

impl FileSessionSource {
    /// Create a source reading the given session-log file.
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self { log_path }
    }
}

#[async_trait]
impl ContextSource for FileSessionSource {
    async fn session_log(&self) -> Option<SessionLog> {
        let path = self.log_path.as_ref()?;
        if !path.exists() {
            return None;
        }
        Some(JsonStore::new(path.clone()).load::<SessionLog>().await)
    }

    async fn branch(&self) -> Option<String> {
        None
    }

    async fn runtime_signal(&self) -> Option<RuntimeSignal> {
        None
    }
}

/// Caller-supplied overrides for context assembly.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Active agent id
    pub agent_id: Option<String>,

    /// Explicit story-path override, wins over the session log
    pub story_path: Option<PathBuf>,

    /// Command history supplied directly; wins over the session log
    pub last_commands: Vec<String>,
}

/// Assemble a session context from overrides and external signals.
///
/// Precedence: explicit overrides, then the prior-session log, then detected
/// branch, then project state derived from the last command.
pub async fn build_context(options: ContextOptions, source: &dyn ContextSource) -> SessionContext {
    let log = source.session_log().await;

    let last_commands = if options.last_commands.is_empty() {
        log.as_ref().map(|l| l.last_commands.clone()).unwrap_or_default()
    } else {
        options.last_commands
    };

    let story_path = options
        .story_path
        .or_else(|| log.as_ref().and_then(|l| l.current_story.as_ref().map(PathBuf::from)));

    let last_command = last_commands.last().cloned();

    let phase = last_command.as_deref().map(WorkflowPhase::from_command).unwrap_or_default();

    let project_state = ProjectState {
        phase,
        has_uncommitted_changes: log.as_ref().is_some_and(|l| l.has_uncommitted_changes),
        failing_tests: log.as_ref().is_some_and(|l| l.failing_tests),
        story_active: story_path.is_some(),
    };

    SessionContext {
        agent_id: options.agent_id,
        last_command,
        last_commands,
        story_path,
        branch: source.branch().await,
        project_state,
    }
}
