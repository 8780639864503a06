//! `DependencyGraph`: an adjacency set with a reverse index, rejecting
//! any edge that would introduce a cycle.
//!
//! Schedules are nodes, `dependsOn` edges point from a dependent
//! schedule to the schedule it depends on, and acyclicity is checked
//! with a DFS probe before the edge is committed.

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;

use stagekit_error::StagekitError;

/// A directed graph over schedule ids, used to validate `dependsOn`
/// declarations and compute execution order for a requested subset.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<u64, ()>,
}

fn node_id(schedule_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    schedule_id.hash(&mut hasher);
    hasher.finish()
}

impl DependencyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schedule as a node, if not already present.
    pub fn add_node(&mut self, schedule_id: &str) {
        self.graph.add_node(node_id(schedule_id));
    }

    /// Add an edge `dependent -> dependency`. Rejected if it would
    /// create a cycle: adding `dependent -> dependency` cycles exactly
    /// when a path `dependency -> ... -> dependent` already exists.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<(), StagekitError> {
        let dependent_id = node_id(dependent);
        let dependency_id = node_id(dependency);
        self.graph.add_node(dependent_id);
        self.graph.add_node(dependency_id);

        if dependent_id == dependency_id
            || has_path_connecting(&self.graph, dependency_id, dependent_id, None)
        {
            return Err(StagekitError::other(
                format!("dependency '{dependency}' for '{dependent}' would introduce a cycle"),
                false,
            ));
        }

        self.graph.add_edge(dependent_id, dependency_id, ());
        Ok(())
    }

    /// Whether `schedule_id` has been registered as a node.
    #[must_use]
    pub fn contains(&self, schedule_id: &str) -> bool {
        self.graph.contains_node(node_id(schedule_id))
    }

    /// Whether the graph has any edge at all (used by tests and
    /// diagnostics, not by the scheduler itself).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Remove a schedule and every edge touching it.
    pub fn remove_node(&mut self, schedule_id: &str) {
        self.graph.remove_node(node_id(schedule_id));
    }
}
