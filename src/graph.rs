//! Task graph construction and dependency resolution
//!
//! Uses petgraph to build a DAG over the built-in task set and derive the
//! execution plan: groups of tasks that may run concurrently, with a strict
//! happens-before barrier between groups.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::tasks::TaskKind;

/// The task dependency graph
#[derive(Debug)]
pub struct PipelineGraph {
    graph: DiGraph<TaskKind, ()>,
    index: HashMap<TaskKind, NodeIndex>,
}

impl PipelineGraph {
    /// Build the graph from the task registry's ordering edges
    pub fn new() -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for kind in TaskKind::ALL {
            let idx = graph.add_node(kind);
            index.insert(kind, idx);
        }

        for kind in TaskKind::ALL {
            let task_idx = index[&kind];
            for dep in kind.after() {
                // Edge goes from dependency TO dependent (dep must run first)
                graph.add_edge(index[dep], task_idx, ());
            }
        }

        // The registry is static, but a bad edit to `after()` should fail
        // loudly rather than hang the planner.
        if is_cyclic_directed(&graph) {
            let cycle = Self::find_cycle_description(&graph, &index);
            return Err(PipelineError::CyclicDependency { cycle });
        }

        Ok(Self { graph, index })
    }

    /// Execution plan for the full pipeline: every task, grouped by depth
    pub fn full_plan(&self) -> Result<ExecutionPlan> {
        let sorted = toposort(&self.graph, None).map_err(|_| PipelineError::CyclicDependency {
            cycle: "unknown cycle detected".to_string(),
        })?;

        let tasks: Vec<TaskKind> = sorted.into_iter().map(|idx| self.graph[idx]).collect();
        Ok(self.group_by_depth(tasks))
    }

    /// Plan for a single task run by name; ordering edges are ignored, the
    /// task runs alone (matching the original per-task CLI entry points).
    pub fn single_plan(kind: TaskKind) -> ExecutionPlan {
        ExecutionPlan {
            groups: vec![vec![kind]],
        }
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, kind: TaskKind) -> Vec<TaskKind> {
        self.graph
            .neighbors_directed(self.index[&kind], petgraph::Direction::Incoming)
            .map(|idx| self.graph[idx])
            .collect()
    }

    /// Group toposorted tasks by "depth": each task lands in the earliest
    /// group after all of its dependencies' groups.
    fn group_by_depth(&self, tasks: Vec<TaskKind>) -> ExecutionPlan {
        let mut groups: Vec<Vec<TaskKind>> = Vec::new();
        let mut depth_of: HashMap<TaskKind, usize> = HashMap::new();

        for kind in tasks {
            let depth = self
                .dependencies(kind)
                .iter()
                .filter_map(|dep| depth_of.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);

            while groups.len() <= depth {
                groups.push(Vec::new());
            }
            groups[depth].push(kind);
            depth_of.insert(kind, depth);
        }

        ExecutionPlan { groups }
    }

    /// Find a human-readable description of a cycle
    fn find_cycle_description(
        graph: &DiGraph<TaskKind, ()>,
        index: &HashMap<TaskKind, NodeIndex>,
    ) -> String {
        for (&kind, &idx) in index {
            let mut visited = std::collections::HashSet::new();
            let mut path = vec![kind.name().to_string()];

            if Self::dfs_find_cycle(graph, idx, idx, &mut visited, &mut path) {
                return path.join(" -> ");
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        graph: &DiGraph<TaskKind, ()>,
        current: NodeIndex,
        target: NodeIndex,
        visited: &mut std::collections::HashSet<NodeIndex>,
        path: &mut Vec<String>,
    ) -> bool {
        for neighbor in graph.neighbors(current) {
            if neighbor == target && path.len() > 1 {
                path.push(graph[target].name().to_string());
                return true;
            }

            if visited.insert(neighbor) {
                path.push(graph[neighbor].name().to_string());
                if Self::dfs_find_cycle(graph, neighbor, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }

        false
    }
}

/// Groups of tasks; groups run in order, members of a group run concurrently
#[derive(Debug)]
pub struct ExecutionPlan {
    pub groups: Vec<Vec<TaskKind>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_plan_groups() {
        let graph = PipelineGraph::new().unwrap();
        let plan = graph.full_plan().unwrap();

        // clean -> {styles, js} -> html
        assert_eq!(plan.groups.len(), 3);
        assert_eq!(plan.groups[0], vec![TaskKind::Clean]);
        assert_eq!(plan.groups[2], vec![TaskKind::Markup]);

        let mut middle = plan.groups[1].clone();
        middle.sort_by_key(|k| k.name());
        assert_eq!(middle, vec![TaskKind::Scripts, TaskKind::Styles]);
    }

    #[test]
    fn test_single_plan_ignores_edges() {
        let plan = PipelineGraph::single_plan(TaskKind::Markup);
        assert_eq!(plan.groups, vec![vec![TaskKind::Markup]]);
    }

    #[test]
    fn test_dependencies() {
        let graph = PipelineGraph::new().unwrap();
        assert!(graph.dependencies(TaskKind::Clean).is_empty());
        assert_eq!(graph.dependencies(TaskKind::Styles), vec![TaskKind::Clean]);

        let mut markup_deps = graph.dependencies(TaskKind::Markup);
        markup_deps.sort_by_key(|k| k.name());
        assert_eq!(markup_deps, vec![TaskKind::Scripts, TaskKind::Styles]);
    }
}
