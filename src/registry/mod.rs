//! Workflow registry.
//!
//! Loads and caches workflow definitions, and answers lookups against them.
//! The cached set is replaced wholesale on reload, never partially mutated.

mod matcher;
mod parser;
mod schema;

pub use matcher::{match_workflows, normalize_command, WorkflowMatch};
pub use parser::{load_definitions, parse_definitions};
pub use schema::{NextStep, StateTransition, Workflow, WorkflowSet};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::EngineResult;

struct CachedSet {
    set: Arc<WorkflowSet>,
    loaded_at: Instant,
}

/// Registry over a workflow-definitions file with a TTL-bound cache.
pub struct WorkflowRegistry {
    path: PathBuf,
    ttl: Duration,
    match_threshold: usize,
    cache: Mutex<Option<CachedSet>>,
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry").field("path", &self.path).finish()
    }
}

impl WorkflowRegistry {
    /// Create a registry from configuration.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            path: config.definitions_path.clone(),
            ttl: config.cache_ttl(),
            match_threshold: config.match_threshold,
            cache: Mutex::new(None),
        }
    }

    /// Load the workflow set, serving from cache within the TTL.
    ///
    /// A missing definitions file is fatal (`DefinitionsNotFound`) and is
    /// surfaced on every call rather than retried internally.
    pub async fn load(&self) -> EngineResult<Arc<WorkflowSet>> {
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    debug!("workflow definitions served from cache");
                    return Ok(Arc::clone(&cached.set));
                }
            }
        }

        let set = Arc::new(load_definitions(&self.path).await?);
        *self.cache.lock() =
            Some(CachedSet { set: Arc::clone(&set), loaded_at: Instant::now() });
        Ok(set)
    }

    /// Drop the cached set so the next load re-reads the file.
    pub fn invalidate_cache(&self) {
        *self.cache.lock() = None;
    }

    /// Match a command history against all known workflows.
    pub async fn match_workflow(&self, history: &[String]) -> EngineResult<Option<WorkflowMatch>> {
        let set = self.load().await?;
        Ok(match_workflows(&set, history, self.match_threshold))
    }

    /// The transition for a state in a workflow, if any.
    pub fn transitions<'a>(
        set: &'a WorkflowSet,
        workflow: &str,
        state: &str,
    ) -> Option<&'a StateTransition> {
        set.get(workflow)?.transition(state)
    }

    /// Next steps from a state, sorted by ascending priority.
    pub fn next_steps(set: &WorkflowSet, workflow: &str, state: &str) -> Vec<NextStep> {
        let mut steps = Self::transitions(set, workflow, state)
            .map(|t| t.next_steps.clone())
            .unwrap_or_default();
        steps.sort_by_key(|s| s.priority);
        steps
    }

    /// Reverse-map a just-completed trigger to the state it produces.
    pub fn find_current_state<'a>(
        set: &'a WorkflowSet,
        workflow: &str,
        command: &str,
    ) -> Option<&'a str> {
        let normalized = normalize_command(command);
        set.get(workflow)?
            .states
            .iter()
            .find(|t| normalized.contains(&t.trigger))
            .map(|t| t.state.as_str())
    }
}
