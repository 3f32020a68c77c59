//! Pattern capture from live sessions.
//!
//! Buffers commands per session and emits a candidate pattern when a session
//! ends successfully. Failed sessions reset the buffer and are never stored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CaptureConfig;
use crate::registry::normalize_command;

/// A candidate pattern extracted from one completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCandidate {
    /// Commands in execution order
    pub sequence: Vec<String>,

    /// Agents observed during the session, in first-seen order
    pub agents: Vec<String>,

    /// Workflow the session was following, if known
    pub workflow: Option<String>,

    /// Session that produced the candidate
    pub session_id: String,
}

/// Result of feeding a command or completion signal to the capture buffer.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Still buffering; nothing to report
    Buffering,

    /// The session produced a candidate pattern
    Candidate(PatternCandidate),

    /// The session ended without a usable pattern
    Rejected {
        /// Why no candidate was emitted
        reason: String,
    },
}

impl CaptureOutcome {
    /// Whether this outcome carries a candidate.
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::Candidate(_))
    }
}

#[derive(Debug, Default)]
struct SessionBuffer {
    commands: Vec<String>,
    agents: Vec<String>,
    workflow: Option<String>,
}

/// Buffers commands per session and extracts candidate patterns.
#[derive(Debug, Default)]
pub struct PatternCapture {
    config: CaptureConfig,
    sessions: HashMap<String, SessionBuffer>,
}

impl PatternCapture {
    /// Create a capture buffer from configuration.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config, sessions: HashMap::new() }
    }

    /// Record a command for a session.
    ///
    /// A recognized workflow-ending command closes the session as successful;
    /// anything else keeps buffering. Buffers are bounded: the oldest command
    /// falls off once the cap is reached.
    pub fn record(
        &mut self,
        session_id: &str,
        command: &str,
        agent: Option<&str>,
    ) -> CaptureOutcome {
        let buffer = self.sessions.entry(session_id.to_string()).or_default();

        buffer.commands.push(command.to_string());
        if buffer.commands.len() > self.config.max_sequence_len {
            buffer.commands.remove(0);
        }
        if let Some(agent) = agent {
            if !buffer.agents.iter().any(|a| a == agent) {
                buffer.agents.push(agent.to_string());
            }
        }

        if self.is_terminal_command(command) {
            return self.complete(session_id, true);
        }

        CaptureOutcome::Buffering
    }

    /// Attach the active workflow name to a session.
    pub fn set_workflow(&mut self, session_id: &str, workflow: &str) {
        self.sessions.entry(session_id.to_string()).or_default().workflow =
            Some(workflow.to_string());
    }

    /// Close a session explicitly.
    ///
    /// The buffer is consumed either way; failures are never stored.
    pub fn complete(&mut self, session_id: &str, success: bool) -> CaptureOutcome {
        let Some(buffer) = self.sessions.remove(session_id) else {
            return CaptureOutcome::Rejected { reason: "unknown session".to_string() };
        };

        if !success {
            debug!(session = %session_id, "failed session discarded");
            return CaptureOutcome::Rejected { reason: "session was not successful".to_string() };
        }

        if buffer.commands.len() < self.config.min_sequence_len {
            return CaptureOutcome::Rejected {
                reason: format!(
                    "sequence too short: {} < {}",
                    buffer.commands.len(),
                    self.config.min_sequence_len
                ),
            };
        }

        let has_key = buffer.commands.iter().any(|cmd| {
            let normalized = normalize_command(cmd);
            self.config.key_commands.iter().any(|key| normalized.contains(key.as_str()))
        });
        if !has_key {
            return CaptureOutcome::Rejected {
                reason: "sequence contains no key workflow command".to_string(),
            };
        }

        CaptureOutcome::Candidate(PatternCandidate {
            sequence: buffer.commands,
            agents: buffer.agents,
            workflow: buffer.workflow,
            session_id: session_id.to_string(),
        })
    }

    /// Number of sessions currently buffering.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn is_terminal_command(&self, command: &str) -> bool {
        let normalized = normalize_command(command);
        self.config.terminal_commands.iter().any(|t| normalized.contains(t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> PatternCapture {
        PatternCapture::new(CaptureConfig::default())
    }

    #[test]
    fn test_terminal_command_emits_candidate() {
        let mut c = capture();

        assert!(matches!(c.record("s1", "create-story", Some("sm")), CaptureOutcome::Buffering));
        assert!(matches!(c.record("s1", "develop-story", Some("dev")), CaptureOutcome::Buffering));

        let outcome = c.record("s1", "git push", Some("dev"));
        let CaptureOutcome::Candidate(candidate) = outcome else {
            panic!("expected candidate, got {outcome:?}");
        };
        assert_eq!(candidate.sequence, vec!["create-story", "develop-story", "git push"]);
        assert_eq!(candidate.agents, vec!["sm", "dev"]);
        assert_eq!(candidate.session_id, "s1");
        assert_eq!(c.open_sessions(), 0);
    }

    #[test]
    fn test_failed_session_never_stored() {
        let mut c = capture();
        c.record("s1", "create-story", None);
        c.record("s1", "develop-story", None);
        c.record("s1", "run-tests", None);

        let outcome = c.complete("s1", false);
        assert!(matches!(outcome, CaptureOutcome::Rejected { .. }));

        // The buffer was reset, not retained.
        assert_eq!(c.open_sessions(), 0);
    }

    #[test]
    fn test_short_sequence_rejected_with_reason() {
        let mut c = capture();
        c.record("s1", "create-story", None);

        let outcome = c.complete("s1", true);
        let CaptureOutcome::Rejected { reason } = outcome else {
            panic!("expected rejection");
        };
        assert!(reason.contains("too short"));
    }

    #[test]
    fn test_sequence_without_key_command_rejected() {
        let mut c = capture();
        c.record("s1", "ls", None);
        c.record("s1", "cat notes.md", None);
        c.record("s1", "grep foo", None);

        let outcome = c.complete("s1", true);
        let CaptureOutcome::Rejected { reason } = outcome else {
            panic!("expected rejection");
        };
        assert!(reason.contains("key workflow command"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut c = capture();
        c.record("s1", "create-story", None);
        c.record("s2", "review-story", None);

        assert_eq!(c.open_sessions(), 2);
        c.complete("s1", false);
        assert_eq!(c.open_sessions(), 1);
    }

    #[test]
    fn test_buffer_bounded_at_max_len() {
        let mut c = PatternCapture::new(CaptureConfig {
            max_sequence_len: 3,
            ..CaptureConfig::default()
        });

        c.record("s1", "create-story", None);
        c.record("s1", "a", None);
        c.record("s1", "b", None);
        c.record("s1", "develop-story", None);

        let CaptureOutcome::Candidate(candidate) = c.complete("s1", true) else {
            panic!("expected candidate");
        };
        assert_eq!(candidate.sequence, vec!["a", "b", "develop-story"]);
    }

    #[test]
    fn test_workflow_attached_to_candidate() {
        let mut c = capture();
        c.set_workflow("s1", "story-cycle");
        c.record("s1", "create-story", None);
        c.record("s1", "develop-story", None);
        c.record("s1", "run-tests", None);

        let CaptureOutcome::Candidate(candidate) = c.complete("s1", true) else {
            panic!("expected candidate");
        };
        assert_eq!(candidate.workflow.as_deref(), Some("story-cycle"));
    }
}
