//! Dependency graph construction for work packages.
//!
//! The builder takes the work package records of a feature and constructs
//! a directed graph over their declared dependencies, validating that
//! every dependency exists and that the graph is acyclic.

use crate::errors::GraphError;
use crate::tasks::WorkPackage;
use std::collections::HashMap;

/// Index into the work package list.
pub type WpIndex = usize;

/// A validated, acyclic dependency graph of work packages.
#[derive(Debug)]
pub struct WpGraph {
    /// Work packages indexed by their position
    wps: Vec<WorkPackage>,
    /// Map from work package id to index
    index_map: HashMap<String, WpIndex>,
    /// Forward edges: index -> work packages that depend on it
    forward_edges: Vec<Vec<WpIndex>>,
    /// Reverse edges: index -> work packages it depends on
    reverse_edges: Vec<Vec<WpIndex>>,
}

impl WpGraph {
    /// Get the number of work packages in the graph.
    pub fn len(&self) -> usize {
        self.wps.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.wps.is_empty()
    }

    /// Get a work package by its index.
    pub fn get_by_index(&self, index: WpIndex) -> Option<&WorkPackage> {
        self.wps.get(index)
    }

    /// Get a work package by its id.
    pub fn get(&self, wp_id: &str) -> Option<&WorkPackage> {
        self.index_map.get(wp_id).and_then(|&i| self.wps.get(i))
    }

    /// Get the index for a work package id.
    pub fn index_of(&self, wp_id: &str) -> Option<WpIndex> {
        self.index_map.get(wp_id).copied()
    }

    /// Get all work packages.
    pub fn wps(&self) -> &[WorkPackage] {
        &self.wps
    }

    /// Work packages that depend on the given one (forward edges).
    pub fn dependents(&self, index: WpIndex) -> &[WpIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Work packages the given one depends on (reverse edges).
    pub fn dependencies(&self, index: WpIndex) -> &[WpIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Work packages with no dependencies (entry points).
    pub fn roots(&self) -> Vec<WpIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Builder for constructing work package graphs.
pub struct GraphBuilder {
    wps: Vec<WorkPackage>,
}

impl GraphBuilder {
    /// Create a new builder with the given work packages.
    pub fn new(wps: Vec<WorkPackage>) -> Self {
        Self { wps }
    }

    /// Build the graph.
    ///
    /// Validates the structure:
    /// - Work package ids must be unique
    /// - All dependencies must reference existing work packages
    /// - No cycles are allowed
    pub fn build(self) -> Result<WpGraph, GraphError> {
        if self.wps.is_empty() {
            return Ok(WpGraph {
                wps: Vec::new(),
                index_map: HashMap::new(),
                forward_edges: Vec::new(),
                reverse_edges: Vec::new(),
            });
        }

        let mut index_map = HashMap::new();
        for (i, wp) in self.wps.iter().enumerate() {
            if index_map.contains_key(&wp.id) {
                return Err(GraphError::DuplicateId(wp.id.clone()));
            }
            index_map.insert(wp.id.clone(), i);
        }

        let mut forward_edges: Vec<Vec<WpIndex>> = vec![Vec::new(); self.wps.len()];
        let mut reverse_edges: Vec<Vec<WpIndex>> = vec![Vec::new(); self.wps.len()];

        for (to_idx, wp) in self.wps.iter().enumerate() {
            for dep in &wp.dependencies {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            wp_id: wp.id.clone(),
                            dependency: dep.clone(),
                        })?;

                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = WpGraph {
            wps: self.wps,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;

        Ok(graph)
    }

    /// Validate that the graph has no cycles using Kahn's algorithm.
    ///
    /// Iterative by construction: no recursion, so arbitrarily deep
    /// dependency chains cannot overflow the stack.
    fn validate_no_cycles(graph: &WpGraph) -> Result<(), GraphError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<WpIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            // Nodes with remaining in-degree are on or behind a cycle.
            let wps: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| graph.get_by_index(i).map(|wp| wp.id.clone()))
                .collect();

            return Err(GraphError::CycleDetected { wps });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Lane;

    fn wp(id: &str, deps: Vec<&str>) -> WorkPackage {
        WorkPackage {
            id: id.to_string(),
            title: format!("Work package {id}"),
            lane: Some(Lane::Planned),
            dependencies: deps.into_iter().map(String::from).collect(),
            history: vec![],
        }
    }

    #[test]
    fn test_build_simple_graph() {
        let wps = vec![
            wp("WP01", vec![]),
            wp("WP02", vec!["WP01"]),
            wp("WP03", vec!["WP01"]),
            wp("WP04", vec!["WP02", "WP03"]),
        ];

        let graph = GraphBuilder::new(wps).build().unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots(), vec![0]);
        assert_eq!(graph.dependencies(3), &[1, 2]);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let wps = vec![
            wp("WP01", vec![]),
            wp("WP02", vec!["WP01"]),
            wp("WP03", vec!["WP01"]),
        ];

        let graph = GraphBuilder::new(wps).build().unwrap();

        assert!(graph.dependencies(0).is_empty());
        assert_eq!(graph.dependencies(1), &[0]);
        assert_eq!(graph.dependencies(2), &[0]);
        let dependents = graph.dependents(0);
        assert!(dependents.contains(&1));
        assert!(dependents.contains(&2));
    }

    #[test]
    fn test_cycle_detection() {
        let wps = vec![
            wp("WP01", vec!["WP03"]),
            wp("WP02", vec!["WP01"]),
            wp("WP03", vec!["WP02"]),
        ];

        let result = GraphBuilder::new(wps).build();
        match result {
            Err(GraphError::CycleDetected { wps }) => {
                assert_eq!(wps.len(), 3);
                assert!(wps.contains(&"WP01".to_string()));
            }
            other => panic!("Expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let wps = vec![wp("WP01", vec!["WP01"])];
        let result = GraphBuilder::new(wps).build();
        assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        // Iterative detection must handle chains far past any stack limit.
        let mut wps = vec![wp("WP0000", vec![])];
        for i in 1..5000 {
            let prev = format!("WP{:04}", i - 1);
            wps.push(wp(&format!("WP{i:04}"), vec![prev.as_str()]));
        }
        let graph = GraphBuilder::new(wps).build().unwrap();
        assert_eq!(graph.len(), 5000);
    }

    #[test]
    fn test_missing_dependency() {
        let wps = vec![wp("WP01", vec!["nonexistent"])];

        let result = GraphBuilder::new(wps).build();
        match result {
            Err(GraphError::UnknownDependency { wp_id, dependency }) => {
                assert_eq!(wp_id, "WP01");
                assert_eq!(dependency, "nonexistent");
            }
            other => panic!("Expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id() {
        let wps = vec![wp("WP01", vec![]), wp("WP01", vec![])];

        let result = GraphBuilder::new(wps).build();
        assert!(matches!(result, Err(GraphError::DuplicateId(id)) if id == "WP01"));
    }

    #[test]
    fn test_empty_graph() {
        let graph = GraphBuilder::new(vec![]).build().unwrap();
        assert!(graph.is_empty());
    }
}
