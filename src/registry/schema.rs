//! Workflow definition schema.
//!
//! Defines the YAML structure for workflow definition files. A definitions
//! file holds an ordered list of workflows; order matters because matching
//! ties are broken by first-seen order.

use serde::{Deserialize, Serialize};

/// A full set of workflow definitions, as loaded from one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSet {
    /// Workflows in file order
    pub workflows: Vec<Workflow>,
}

/// A named multi-step workflow: a graph of states and triggers.
///
/// Immutable once loaded; the registry replaces the whole set on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name, unique within the set
    pub name: String,

    /// Description of what this workflow accomplishes
    #[serde(default)]
    pub description: Option<String>,

    /// Agent sequence that owns this workflow, in execution order
    #[serde(default)]
    pub agents: Vec<String>,

    /// State transitions in definition order
    pub states: Vec<StateTransition>,
}

/// A transition: the trigger command that produces a state, and the steps
/// that become available once the state is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// State name produced by the trigger
    pub state: String,

    /// Command that transitions into this state
    pub trigger: String,

    /// Confidence that this transition is on the happy path, in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Candidate next actions from this state
    #[serde(default)]
    pub next_steps: Vec<NextStep>,
}

/// A candidate next action offered from a state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextStep {
    /// Command to run
    pub command: String,

    /// Argument template, e.g. `"{story_path}"`
    #[serde(default)]
    pub args: Option<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Ordering priority, lower runs first
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_confidence() -> f64 {
    0.7
}

fn default_priority() -> u32 {
    1
}

impl Workflow {
    /// Look up the transition for a state.
    pub fn transition(&self, state: &str) -> Option<&StateTransition> {
        self.states.iter().find(|t| t.state == state)
    }

    /// All trigger commands of this workflow, in definition order.
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|t| t.trigger.as_str())
    }
}

impl WorkflowSet {
    /// Look up a workflow by name.
    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.name == name)
    }

    /// Number of workflows in the set.
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
