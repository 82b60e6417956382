//! Dependency DAG over a batch of [`ChangeFragment`]s.
//!
//! Nodes are stored `id -> node` with forward (`dependency_hints`) and
//! reverse (`dependents`) adjacency lists -- no back-pointers, so the
//! structure stays `Send` and trivially cloneable by id.

use std::collections::{HashMap, HashSet};

use codegraph_core::ChangeFragment;

/// A single DAG node: the fragment plus the ids of fragments that depend on it.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub fragment: ChangeFragment,
    pub dependents: Vec<String>,
}

/// Dependency graph built from one batch's [`ChangeFragment`]s.
///
/// Cycles are detected, not prevented: [`Self::detect_cycles`] reports them
/// and callers decide whether to fail the operation or continue without the
/// implicated fragments.
pub struct DependencyDag {
    nodes: HashMap<String, DagNode>,
}

impl DependencyDag {
    #[must_use]
    pub fn new(fragments: Vec<ChangeFragment>) -> Self {
        let mut nodes: HashMap<String, DagNode> = fragments
            .into_iter()
            .map(|f| (f.id.clone(), DagNode { fragment: f, dependents: Vec::new() }))
            .collect();

        let edges: Vec<(String, String)> = nodes
            .values()
            .flat_map(|n| n.fragment.dependency_hints.iter().map(move |dep| (dep.clone(), n.fragment.id.clone())))
            .collect();
        for (dep, dependent) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(dependent);
            }
        }

        Self { nodes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn fragment(&self, id: &str) -> Option<&ChangeFragment> {
        self.nodes.get(id).map(|n| &n.fragment)
    }

    /// Fragments with no (in-set) dependencies.
    #[must_use]
    pub fn roots(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.fragment.dependency_hints.iter().all(|d| !self.nodes.contains_key(d)))
            .map(|n| n.fragment.id.clone())
            .collect()
    }

    /// Fragments nothing in this batch depends on.
    #[must_use]
    pub fn leaves(&self) -> Vec<String> {
        self.nodes.values().filter(|n| n.dependents.is_empty()).map(|n| n.fragment.id.clone()).collect()
    }

    /// Fragments ready to run: not yet completed, and every in-set
    /// dependency is already in `completed`.
    #[must_use]
    pub fn ready_nodes(&self, completed: &HashSet<String>) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| !completed.contains(&n.fragment.id))
            .filter(|n| n.fragment.dependency_hints.iter().all(|d| !self.nodes.contains_key(d) || completed.contains(d)))
            .map(|n| n.fragment.id.clone())
            .collect()
    }

    /// DFS-with-recursion-stack cycle detection. Records every cycle found
    /// rather than aborting on the first one.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut stack = Vec::new();
        let mut cycles = Vec::new();

        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            if !visited.contains(id) {
                self.dfs_visit(id, &mut visited, &mut on_stack, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn dfs_visit(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        stack: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(id.to_string());
        on_stack.insert(id.to_string());
        stack.push(id.to_string());

        if let Some(node) = self.nodes.get(id) {
            for dep in &node.fragment.dependency_hints {
                if !self.nodes.contains_key(dep) {
                    continue;
                }
                if on_stack.contains(dep) {
                    if let Some(pos) = stack.iter().position(|x| x == dep) {
                        cycles.push(stack[pos..].to_vec());
                    }
                } else if !visited.contains(dep) {
                    self.dfs_visit(dep, visited, on_stack, stack, cycles);
                }
            }
        }

        stack.pop();
        on_stack.remove(id);
    }
}
