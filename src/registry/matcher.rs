//! Lexical workflow matching.
//!
//! Matches a raw command history against workflow definitions by counting
//! trigger occurrences. Matching is lexical by design, not ML-based.

use serde::{Deserialize, Serialize};

use crate::registry::schema::WorkflowSet;

/// Result of matching a command history against the workflow set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMatch {
    /// Name of the best-matching workflow
    pub name: String,

    /// Number of triggers found in the history
    pub score: usize,

    /// The triggers that matched, in workflow definition order
    pub matched_commands: Vec<String>,
}

/// Normalize a raw command for matching.
///
/// Lowercases, strips a leading `*` (the persona command sigil), and drops
/// trailing "completed"/"successfully" status words.
pub fn normalize_command(raw: &str) -> String {
    let mut cmd = raw.trim().to_lowercase();
    if let Some(stripped) = cmd.strip_prefix('*') {
        cmd = stripped.trim_start().to_string();
    }

    loop {
        let trimmed = cmd
            .trim_end()
            .trim_end_matches("successfully")
            .trim_end_matches("completed")
            .trim_end()
            .to_string();
        if trimmed == cmd {
            break;
        }
        cmd = trimmed;
    }

    cmd
}

/// Match a command history against every workflow in the set.
///
/// Each workflow scores one point per trigger that appears anywhere in the
/// normalized history. Returns the highest scorer at or above `threshold`,
/// ties broken by first-seen order in the definitions file.
pub fn match_workflows(
    set: &WorkflowSet,
    history: &[String],
    threshold: usize,
) -> Option<WorkflowMatch> {
    let normalized: Vec<String> = history.iter().map(|c| normalize_command(c)).collect();

    let mut best: Option<WorkflowMatch> = None;

    for workflow in &set.workflows {
        let matched: Vec<String> = workflow
            .triggers()
            .filter(|trigger| normalized.iter().any(|cmd| cmd.contains(trigger)))
            .map(str::to_string)
            .collect();

        let score = matched.len();
        if score < threshold {
            continue;
        }

        // Strictly-greater keeps the first-seen workflow on ties.
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(WorkflowMatch {
                name: workflow.name.clone(),
                score,
                matched_commands: matched,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::parser::parse_definitions;

    fn test_set() -> WorkflowSet {
        parse_definitions(
            r#"
workflows:
  - name: epic-creation
    states:
      - { state: epic-created, trigger: create-epic }
      - { state: story-created, trigger: create-story }
      - { state: story-developed, trigger: develop-story }
  - name: qa-cycle
    states:
      - { state: reviewed, trigger: review-story }
      - { state: gated, trigger: qa-gate }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("*Create-Epic"), "create-epic");
        assert_eq!(normalize_command("develop-story completed"), "develop-story");
        assert_eq!(normalize_command("qa-gate completed successfully"), "qa-gate");
        assert_eq!(normalize_command("  push  "), "push");
    }

    #[test]
    fn test_match_epic_creation_history() {
        let set = test_set();
        let history = vec!["create-epic".to_string(), "create-story".to_string()];

        let matched = match_workflows(&set, &history, 2).unwrap();
        assert_eq!(matched.name, "epic-creation");
        assert!(matched.score >= 2);
        assert_eq!(matched.matched_commands, vec!["create-epic", "create-story"]);
    }

    #[test]
    fn test_unrelated_history_returns_none() {
        let set = test_set();
        let history = vec!["ls".to_string(), "cat readme".to_string()];
        assert!(match_workflows(&set, &history, 2).is_none());
    }

    #[test]
    fn test_single_trigger_below_threshold() {
        let set = test_set();
        let history = vec!["create-epic".to_string()];
        assert!(match_workflows(&set, &history, 2).is_none());
    }

    #[test]
    fn test_normalized_forms_still_match() {
        let set = test_set();
        let history =
            vec!["*Create-Epic".to_string(), "create-story completed successfully".to_string()];

        let matched = match_workflows(&set, &history, 2).unwrap();
        assert_eq!(matched.name, "epic-creation");
    }

    #[test]
    fn test_tie_broken_by_definition_order() {
        let set = parse_definitions(
            r#"
workflows:
  - name: first
    states:
      - { state: a, trigger: alpha }
      - { state: b, trigger: beta }
  - name: second
    states:
      - { state: a, trigger: alpha }
      - { state: b, trigger: beta }
"#,
        )
        .unwrap();

        let history = vec!["alpha".to_string(), "beta".to_string()];
        let matched = match_workflows(&set, &history, 2).unwrap();
        assert_eq!(matched.name, "first");
    }
}
