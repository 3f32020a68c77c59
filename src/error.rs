//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur inside the workflow intelligence engine.
///
/// Only two variants are allowed to halt an operation: a missing or
/// unparsable definitions file, and a circular task dependency. Everything
/// else degrades to a fallback at the call site.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Workflow definitions file does not exist. Fatal, never retried.
    #[error("Workflow definitions not found: {}", .0.display())]
    DefinitionsNotFound(PathBuf),

    /// Workflow definitions file exists but cannot be parsed.
    #[error("Failed to parse workflow definitions: {0}")]
    DefinitionsParse(String),

    /// A task graph contains a cycle. Carries the ordered cycle and a
    /// human-readable suggestion for which edge to break.
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The nodes forming the cycle, in traversal order.
        cycle: Vec<String>,
        /// Hint for the author, e.g. "break the dependency edge b -> a".
        suggestion: String,
    },

    /// Scoring weights do not sum to 1.0.
    #[error("Scoring weights must sum to 1.0, got {sum}")]
    InvalidWeights { sum: f64 },

    /// A referenced pattern does not exist in the store.
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    /// Storage write failed. Reads never produce this: a corrupt or missing
    /// store is treated as empty.
    #[error("Storage error for {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization of a store payload failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_display() {
        let err = EngineError::CircularDependency {
            cycle: vec!["a".into(), "c".into(), "b".into(), "a".into()],
            suggestion: "break the dependency edge b -> a".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a -> c -> b -> a"));
    }

    #[test]
    fn test_invalid_weights_display() {
        let err = EngineError::InvalidWeights { sum: 0.9 };
        assert!(err.to_string().contains("0.9"));
    }
}
