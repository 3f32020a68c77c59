//! Wave analysis: parallel execution planning over a task DAG.
//!
//! Groups tasks into waves of concurrently-runnable work, computes the
//! critical path, and estimates the speedup over sequential execution. Waves
//! describe logical concurrency for the caller to exploit; the analysis
//! itself is pure and synchronous.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::WavesConfig;
use crate::error::{EngineError, EngineResult};
use crate::waves::graph::{build_dependency_graph, find_cycle, DependencyGraph, TaskSpec};

/// A set of tasks whose dependencies are all satisfied, schedulable together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    /// 1-based wave number
    pub wave_number: usize,

    /// Task keys in this wave
    pub tasks: Vec<String>,

    /// Whether the wave holds more than one task
    pub parallel: bool,

    /// Wave duration in minutes: the max of its tasks, since they run
    /// concurrently
    pub estimated_duration: u32,
}

/// Summary metrics for a wave analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveMetrics {
    /// Sum of all task durations in minutes
    pub sequential_minutes: u32,

    /// Sum of wave durations in minutes
    pub parallel_minutes: u32,

    /// Number of waves
    pub wave_count: usize,

    /// Widest wave
    pub max_wave_width: usize,
}

/// Complete analysis of one workflow's task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveAnalysis {
    /// Workflow the tasks belong to
    pub workflow_id: String,

    /// Number of scheduled tasks
    pub total_tasks: usize,

    /// Waves in execution order
    pub waves: Vec<Wave>,

    /// Speedup over sequential execution, as a whole percentage
    pub optimization_gain: u32,

    /// Longest duration-weighted path, root to sink
    pub critical_path: Vec<String>,

    /// Summary metrics
    pub metrics: WaveMetrics,
}

/// Analyzes task dependency graphs into parallel execution plans.
#[derive(Debug, Clone, Default)]
pub struct WaveAnalyzer {
    config: WavesConfig,
}

impl WaveAnalyzer {
    /// Create an analyzer with the given duration defaults.
    pub fn new(config: WavesConfig) -> Self {
        Self { config }
    }

    /// Analyze a task list into waves and a critical path.
    ///
    /// An empty task list yields an empty analysis. A cycle raises
    /// `CircularDependencyError` and must propagate to the caller; silently
    /// degrading to sequential execution would hide a real authoring bug.
    pub fn analyze(&self, workflow_id: &str, tasks: &[TaskSpec]) -> EngineResult<WaveAnalysis> {
        if tasks.is_empty() {
            return Ok(WaveAnalysis {
                workflow_id: workflow_id.to_string(),
                total_tasks: 0,
                waves: Vec::new(),
                optimization_gain: 0,
                critical_path: Vec::new(),
                metrics: WaveMetrics::default(),
            });
        }

        let graph = build_dependency_graph(tasks, |task| {
            task.duration_minutes.unwrap_or_else(|| self.config.duration_for(task.key()))
        });

        if let Some(cycle) = find_cycle(&graph) {
            let suggestion = break_edge_suggestion(&cycle);
            return Err(EngineError::CircularDependency { cycle, suggestion });
        }

        let waves = schedule_waves(&graph);
        let critical_path = critical_path(&graph);

        let sequential_minutes: u32 = graph.durations.values().sum();
        let parallel_minutes: u32 = waves.iter().map(|w| w.estimated_duration).sum();

        let optimization_gain = if sequential_minutes == 0 {
            0
        } else {
            let gain = f64::from(sequential_minutes - parallel_minutes)
                / f64::from(sequential_minutes)
                * 100.0;
            gain.round() as u32
        };

        let metrics = WaveMetrics {
            sequential_minutes,
            parallel_minutes,
            wave_count: waves.len(),
            max_wave_width: waves.iter().map(|w| w.tasks.len()).max().unwrap_or(0),
        };

        Ok(WaveAnalysis {
            workflow_id: workflow_id.to_string(),
            total_tasks: graph.nodes.len(),
            waves,
            optimization_gain,
            critical_path,
            metrics,
        })
    }
}

/// Kahn-style wave grouping: repeatedly take every node whose unscheduled
/// in-degree is zero.
fn schedule_waves(graph: &DependencyGraph) -> Vec<Wave> {
    let mut remaining: HashMap<&str, usize> =
        graph.nodes.iter().map(|n| (n.as_str(), graph.in_degree(n))).collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| remaining.get(n.as_str()) == Some(&0))
            .map(String::clone)
            .collect();

        // A DAG always has at least one zero in-degree node remaining.
        if ready.is_empty() {
            break;
        }

        for node in &ready {
            remaining.remove(node.as_str());
            if let Some(dependents) = graph.edges.get(node) {
                for dependent in dependents {
                    if let Some(degree) = remaining.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }
        }

        let estimated_duration =
            ready.iter().filter_map(|n| graph.durations.get(n)).copied().max().unwrap_or(0);

        waves.push(Wave {
            wave_number: waves.len() + 1,
            parallel: ready.len() > 1,
            estimated_duration,
            tasks: ready,
        });
    }

    waves
}

/// Longest duration-weighted path, via dynamic programming over the DAG in
/// wave (topological) order.
fn critical_path(graph: &DependencyGraph) -> Vec<String> {
    let order: Vec<String> =
        schedule_waves(graph).into_iter().flat_map(|wave| wave.tasks).collect();

    let mut longest: HashMap<&str, u32> = HashMap::new();
    let mut predecessor: HashMap<&str, &str> = HashMap::new();

    for node in &order {
        let duration = graph.durations.get(node).copied().unwrap_or(0);
        let best_pred = graph
            .in_edges
            .get(node)
            .into_iter()
            .flatten()
            .max_by_key(|pred| longest.get(pred.as_str()).copied().unwrap_or(0));

        let base = best_pred
            .map(|pred| longest.get(pred.as_str()).copied().unwrap_or(0))
            .unwrap_or(0);

        longest.insert(node.as_str(), base + duration);
        if let Some(pred) = best_pred {
            predecessor.insert(node.as_str(), pred.as_str());
        }
    }

    let Some(mut current) =
        order.iter().map(String::as_str).max_by_key(|n| longest.get(n).copied().unwrap_or(0))
    else {
        return Vec::new();
    };

    let mut path = vec![current.to_string()];
    while let Some(pred) = predecessor.get(current) {
        path.push((*pred).to_string());
        current = pred;
    }
    path.reverse();
    path
}

/// Human-readable hint for breaking a detected cycle.
fn break_edge_suggestion(cycle: &[String]) -> String {
    match cycle {
        [.., second_last, last] => {
            format!("break the dependency edge {second_last} -> {last}")
        }
        _ => "break one dependency edge in the cycle".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> WaveAnalyzer {
        WaveAnalyzer::new(WavesConfig::default())
    }

    fn diamond(durations: [u32; 3]) -> Vec<TaskSpec> {
        vec![
            TaskSpec::new("a", vec![]).with_duration(durations[0]),
            TaskSpec::new("b", vec![]).with_duration(durations[1]),
            TaskSpec::new("c", vec!["a".into(), "b".into()]).with_duration(durations[2]),
        ]
    }

    #[test]
    fn test_empty_task_list_is_empty_analysis() {
        let analysis = analyzer().analyze("wf", &[]).unwrap();
        assert_eq!(analysis.total_tasks, 0);
        assert!(analysis.waves.is_empty());
        assert!(analysis.critical_path.is_empty());
        assert_eq!(analysis.optimization_gain, 0);
    }

    #[test]
    fn test_two_waves_from_fork_join() {
        let analysis = analyzer().analyze("wf", &diamond([5, 3, 4])).unwrap();

        assert_eq!(analysis.waves.len(), 2);
        assert_eq!(analysis.waves[0].tasks, vec!["a", "b"]);
        assert!(analysis.waves[0].parallel);
        assert_eq!(analysis.waves[0].estimated_duration, 5);
        assert_eq!(analysis.waves[1].tasks, vec!["c"]);
        assert!(!analysis.waves[1].parallel);
    }

    #[test]
    fn test_optimization_gain_exactly_33_percent() {
        // Sequential 30, parallel max(10,10)+10 = 20, gain 33%.
        let analysis = analyzer().analyze("wf", &diamond([10, 10, 10])).unwrap();

        assert_eq!(analysis.metrics.sequential_minutes, 30);
        assert_eq!(analysis.metrics.parallel_minutes, 20);
        assert_eq!(analysis.optimization_gain, 33);
    }

    #[test]
    fn test_cycle_raises_circular_dependency() {
        let tasks = vec![
            TaskSpec::new("a", vec!["b".into()]),
            TaskSpec::new("b", vec!["c".into()]),
            TaskSpec::new("c", vec!["a".into()]),
        ];
        let err = analyzer().analyze("wf", &tasks).unwrap_err();

        match err {
            EngineError::CircularDependency { cycle, suggestion } => {
                for node in ["a", "b", "c"] {
                    assert!(cycle.contains(&node.to_string()));
                }
                assert!(suggestion.contains("break the dependency edge"));
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_self_loop_raises() {
        let tasks = vec![TaskSpec::new("a", vec!["a".into()])];
        assert!(matches!(
            analyzer().analyze("wf", &tasks),
            Err(EngineError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_critical_path_follows_duration() {
        // a -> b(20) -> d and a -> c(3) -> d; the heavy branch wins.
        let tasks = vec![
            TaskSpec::new("a", vec![]).with_duration(5),
            TaskSpec::new("b", vec!["a".into()]).with_duration(20),
            TaskSpec::new("c", vec!["a".into()]).with_duration(3),
            TaskSpec::new("d", vec!["b".into(), "c".into()]).with_duration(2),
        ];
        let analysis = analyzer().analyze("wf", &tasks).unwrap();

        assert_eq!(analysis.critical_path, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_duration_defaults_apply() {
        let tasks = vec![
            TaskSpec::new("develop-auth", vec![]),
            TaskSpec::new("mystery", vec!["develop-auth".into()]),
        ];
        let analysis = analyzer().analyze("wf", &tasks).unwrap();

        // develop keyword resolves to 30, unknown task to the global default.
        assert_eq!(analysis.waves[0].estimated_duration, 30);
        assert_eq!(analysis.waves[1].estimated_duration, 15);
    }

    #[test]
    fn test_linear_chain_has_no_gain() {
        let tasks = vec![
            TaskSpec::new("a", vec![]).with_duration(10),
            TaskSpec::new("b", vec!["a".into()]).with_duration(10),
        ];
        let analysis = analyzer().analyze("wf", &tasks).unwrap();

        assert_eq!(analysis.optimization_gain, 0);
        assert!(analysis.waves.iter().all(|w| !w.parallel));
    }
}
