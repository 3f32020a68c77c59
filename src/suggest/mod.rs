//! Suggestion engine: context assembly and ranked next-action suggestions.

mod context;
mod engine;

pub use context::{
    build_context, ContextOptions, ContextSource, FileSessionSource, ProjectState, RuntimeSignal,
    SessionContext, SessionLog, SignalKind, WorkflowPhase,
};
pub use engine::{Suggestion, SuggestionEngine, SuggestionSet, SuggestionSource};
