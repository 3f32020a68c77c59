//! Task dependency graph construction and cycle detection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A task as supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task id; the name is used as the key when absent
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable task name
    #[serde(default)]
    pub name: Option<String>,

    /// Ids of tasks that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Estimated duration in minutes
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl TaskSpec {
    /// Create a task with an id and dependencies.
    pub fn new(id: impl Into<String>, depends_on: Vec<String>) -> Self {
        Self { id: Some(id.into()), name: None, depends_on, duration_minutes: None }
    }

    /// Set the duration in minutes.
    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// The graph key for this task: id, falling back to name.
    pub fn key(&self) -> &str {
        self.id.as_deref().or(self.name.as_deref()).unwrap_or("")
    }
}

/// Adjacency and reverse-adjacency view over a task list.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node keys in input order
    pub nodes: Vec<String>,

    /// dependency -> dependents
    pub edges: HashMap<String, Vec<String>>,

    /// dependent -> dependencies
    pub in_edges: HashMap<String, Vec<String>>,

    /// Resolved duration per node, in minutes
    pub durations: HashMap<String, u32>,
}

impl DependencyGraph {
    /// In-degree of a node.
    pub fn in_degree(&self, node: &str) -> usize {
        self.in_edges.get(node).map_or(0, Vec::len)
    }
}

/// Build the adjacency maps for a task list.
///
/// Dependencies pointing at unknown ids are dropped, not errors: an absent
/// dependency is treated as already satisfied. Duration resolution is left to
/// the caller via `resolve_duration`.
pub fn build_dependency_graph(
    tasks: &[TaskSpec],
    resolve_duration: impl Fn(&TaskSpec) -> u32,
) -> DependencyGraph {
    let mut graph = DependencyGraph::default();

    for task in tasks {
        let key = task.key().to_string();
        if key.is_empty() {
            continue;
        }
        graph.edges.entry(key.clone()).or_default();
        graph.in_edges.entry(key.clone()).or_default();
        graph.durations.insert(key.clone(), resolve_duration(task));
        graph.nodes.push(key);
    }

    for task in tasks {
        let key = task.key().to_string();
        for dep in &task.depends_on {
            if !graph.durations.contains_key(dep) {
                debug!(task = %key, dependency = %dep, "dropping dependency on unknown task");
                continue;
            }
            if let Some(dependents) = graph.edges.get_mut(dep) {
                dependents.push(key.clone());
            }
            if let Some(deps) = graph.in_edges.get_mut(&key) {
                deps.push(dep.clone());
            }
        }
    }

    graph
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Find a cycle via three-color depth-first search.
///
/// Returns the ordered cycle the first time a gray node is re-entered, with
/// the entry node repeated at the end. A self-loop is a cycle of length 1.
pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<String>> {
    let mut colors: HashMap<&str, Color> =
        graph.nodes.iter().map(|n| (n.as_str(), Color::White)).collect();

    for start in &graph.nodes {
        if colors[start.as_str()] == Color::White {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(graph, start, &mut colors, &mut stack) {
                return Some(cycle);
            }
        }
    }

    None
}

fn visit<'a>(
    graph: &'a DependencyGraph,
    node: &'a str,
    colors: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    colors.insert(node, Color::Gray);
    stack.push(node);

    if let Some(next) = graph.edges.get(node) {
        for succ in next {
            match colors.get(succ.as_str()).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    // Back edge: the cycle is the stack suffix from the gray node.
                    let from = stack.iter().position(|n| *n == succ.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[from..].iter().map(|n| (*n).to_string()).collect();
                    cycle.push(succ.clone());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = visit(graph, succ, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    colors.insert(node, Color::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(tasks: &[TaskSpec]) -> DependencyGraph {
        build_dependency_graph(tasks, |t| t.duration_minutes.unwrap_or(15))
    }

    #[test]
    fn test_build_graph_basic() {
        let tasks = vec![
            TaskSpec::new("a", vec![]),
            TaskSpec::new("b", vec![]),
            TaskSpec::new("c", vec!["a".into(), "b".into()]),
        ];
        let graph = graph_of(&tasks);

        assert_eq!(graph.nodes, vec!["a", "b", "c"]);
        assert_eq!(graph.edges["a"], vec!["c"]);
        assert_eq!(graph.in_degree("c"), 2);
        assert_eq!(graph.in_degree("a"), 0);
    }

    #[test]
    fn test_name_fallback_when_id_absent() {
        let task = TaskSpec { name: Some("write-docs".into()), ..Default::default() };
        let graph = graph_of(&[task]);
        assert_eq!(graph.nodes, vec!["write-docs"]);
    }

    #[test]
    fn test_unknown_dependency_dropped() {
        let tasks = vec![TaskSpec::new("a", vec!["ghost".into()])];
        let graph = graph_of(&tasks);

        assert_eq!(graph.in_degree("a"), 0);
    }

    #[test]
    fn test_no_cycle_in_dag() {
        let tasks = vec![
            TaskSpec::new("a", vec![]),
            TaskSpec::new("b", vec!["a".into()]),
            TaskSpec::new("c", vec!["b".into()]),
        ];
        assert!(find_cycle(&graph_of(&tasks)).is_none());
    }

    #[test]
    fn test_three_node_cycle_detected() {
        // a -> c -> b -> a
        let tasks = vec![
            TaskSpec::new("a", vec!["b".into()]),
            TaskSpec::new("b", vec!["c".into()]),
            TaskSpec::new("c", vec!["a".into()]),
        ];
        let cycle = find_cycle(&graph_of(&tasks)).unwrap();

        for node in ["a", "b", "c"] {
            assert!(cycle.contains(&node.to_string()), "cycle missing {node}: {cycle:?}");
        }
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_self_loop_is_length_one_cycle() {
        let tasks = vec![TaskSpec::new("a", vec!["a".into()])];
        let cycle = find_cycle(&graph_of(&tasks)).unwrap();
        assert_eq!(cycle, vec!["a", "a"]);
    }
}
