//! Parallel wave analysis over task dependency graphs.

mod analyzer;
mod graph;

pub use analyzer::{Wave, WaveAnalysis, WaveAnalyzer, WaveMetrics};
pub use graph::{build_dependency_graph, find_cycle, DependencyGraph, TaskSpec};
