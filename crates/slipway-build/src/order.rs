//! Dependency layering for action graphs
//!
//! The executor decides the real schedule. Layers are computed here for
//! diagnostics (`slipway graph`) and to reject cyclic graphs before the
//! executor ever sees them.
use crate::error::{BuildError, BuildResult};
use std::collections::HashSet;

/// Index-based dependency graph over a list of named nodes
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    /// `dependencies[i]` lists the nodes node `i` depends on
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create a graph; `dependencies` must have one entry per name
    pub fn new(names: Vec<String>, dependencies: Vec<Vec<usize>>) -> BuildResult<Self> {
        if names.len() != dependencies.len() {
            return Err(BuildError::InvalidConfiguration(format!(
                "dependency graph has {} nodes but {} dependency lists",
                names.len(),
                dependencies.len()
            )));
        }
        for (node, deps) in dependencies.iter().enumerate() {
            if let Some(bad) = deps.iter().find(|&&d| d >= names.len()) {
                return Err(BuildError::InvalidConfiguration(format!(
                    "node '{}' depends on unknown node index {}",
                    names[node], bad
                )));
            }
        }
        Ok(Self {
            names,
            dependencies,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Group nodes into layers; every node's dependencies sit in earlier layers
    pub fn layers(&self) -> BuildResult<Vec<Vec<usize>>> {
        let mut layers = Vec::new();
        let mut done = vec![false; self.names.len()];
        let mut remaining = self.names.len();

        while remaining > 0 {
            // Find all nodes whose dependencies are satisfied
            let layer: Vec<usize> = (0..self.names.len())
                .filter(|&node| !done[node])
                .filter(|&node| self.dependencies[node].iter().all(|&d| done[d]))
                .collect();

            if layer.is_empty() {
                return Err(BuildError::CyclicGraph(self.find_cycle()));
            }

            for &node in &layer {
                done[node] = true;
            }
            remaining -= layer.len();
            layers.push(layer);
        }

        Ok(layers)
    }

    /// Describe a cycle for error reporting
    fn find_cycle(&self) -> String {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for node in 0..self.names.len() {
            if let Some(cycle) = self.dfs_find_cycle(node, &mut visited, &mut on_stack, &mut path) {
                return cycle;
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        node: usize,
        visited: &mut HashSet<usize>,
        on_stack: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<String> {
        if on_stack.contains(&node) {
            path.push(node);
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let cycle = path[start..]
                .iter()
                .map(|&n| self.names[n].as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Some(cycle);
        }

        if !visited.insert(node) {
            return None;
        }

        on_stack.insert(node);
        path.push(node);

        for &dep in &self.dependencies[node] {
            if let Some(cycle) = self.dfs_find_cycle(dep, visited, on_stack, path) {
                return Some(cycle);
            }
        }

        on_stack.remove(&node);
        path.pop();
        None
    }
}
