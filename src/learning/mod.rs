//! Pattern learning subsystem.
//!
//! Observes completed sessions, extracts and validates reusable command
//! sequences, stores them with confidence metadata, and finds related
//! patterns via semantic search.

mod capture;
mod search;
mod store;
mod validator;

pub use capture::{CaptureOutcome, PatternCandidate, PatternCapture};
pub use search::{MatchMethod, SearchHit, SemanticSearch};
pub use store::{Pattern, PatternFile, PatternStatus, PatternStore, StoreOutcome};
pub use validator::{sequence_similarity, PatternValidator, SimilarityScore, ValidationReport};
