//! Workflow definitions loader.
//!
//! Parse-don't-validate: the definitions file is checked for shape here so
//! downstream code can assume a well-formed `WorkflowSet`. A missing file is
//! fatal and never retried.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::registry::schema::WorkflowSet;

/// Load and validate a workflow definitions file.
pub async fn load_definitions(path: &Path) -> EngineResult<WorkflowSet> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::DefinitionsNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(EngineError::DefinitionsParse(e.to_string())),
    };

    parse_definitions(&content)
}

/// Parse definitions from YAML content.
pub fn parse_definitions(content: &str) -> EngineResult<WorkflowSet> {
    let set: WorkflowSet =
        serde_yaml::from_str(content).map_err(|e| EngineError::DefinitionsParse(e.to_string()))?;
    validate(&set)?;
    Ok(set)
}

/// Shape validation at the load boundary.
fn validate(set: &WorkflowSet) -> EngineResult<()> {
    let mut names = HashSet::new();

    for workflow in &set.workflows {
        if workflow.name.trim().is_empty() {
            return Err(EngineError::DefinitionsParse("workflow with empty name".to_string()));
        }
        if !names.insert(workflow.name.as_str()) {
            return Err(EngineError::DefinitionsParse(format!(
                "duplicate workflow name '{}'",
                workflow.name
            )));
        }

        let mut states = HashSet::new();
        for transition in &workflow.states {
            if !states.insert(transition.state.as_str()) {
                return Err(EngineError::DefinitionsParse(format!(
                    "duplicate state '{}' in workflow '{}'",
                    transition.state, workflow.name
                )));
            }
            if !(0.0..=1.0).contains(&transition.confidence) {
                return Err(EngineError::DefinitionsParse(format!(
                    "confidence {} out of range for state '{}' in workflow '{}'",
                    transition.confidence, transition.state, workflow.name
                )));
            }
        }
    }

    Ok(())
}
