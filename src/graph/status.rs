//! Dependency status reporting.
//!
//! Derived, recomputed on demand from the task store's current lanes.
//! Drives both the workspace branching policy and the operator-facing
//! recommendation text.

use crate::tasks::{Lane, TaskStore};
use std::collections::BTreeMap;

/// Lane of a dependency as visible to readiness checks. A missing record
/// or a record without a usable lane field reads as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    Known(Lane),
    Unknown,
}

impl LaneState {
    pub fn is_done(&self) -> bool {
        matches!(self, LaneState::Known(Lane::Done))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneState::Known(lane) => lane.as_str(),
            LaneState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LaneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency readiness of one work package, derived from current lanes.
#[derive(Debug, Clone)]
pub struct DependencyStatus {
    pub wp_id: String,
    pub dependencies: Vec<String>,
    pub lanes: BTreeMap<String, LaneState>,
    /// Vacuously true when there are no dependencies.
    pub all_done: bool,
    /// More than one dependency.
    pub is_multi_parent: bool,
    /// Multi-parent and every dependency done: merging them into the
    /// target first avoids building a merge base at all.
    pub should_suggest_merge_first: bool,
}

impl DependencyStatus {
    /// Dependency ids whose lane is not `done`, in declaration order.
    pub fn blocking(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|dep| {
                !self
                    .lanes
                    .get(*dep)
                    .copied()
                    .unwrap_or(LaneState::Unknown)
                    .is_done()
            })
            .cloned()
            .collect()
    }

    /// Operator guidance for implementing this work package.
    pub fn recommendation(&self, target_branch: &str) -> String {
        if self.dependencies.is_empty() {
            return format!("No dependencies - implement directly from '{target_branch}'.");
        }

        if !self.is_multi_parent {
            let dep = &self.dependencies[0];
            let lane = self.lanes.get(dep).copied().unwrap_or(LaneState::Unknown);
            if lane.is_done() {
                return format!(
                    "Dependency {dep} is done - branch from '{target_branch}' (no --base needed; --base {dep} also works)."
                );
            }
            return format!(
                "Dependency {dep} is {lane}. Implement {dep} first, then retry with --base {dep}."
            );
        }

        if self.all_done {
            return format!(
                "All dependencies are done. Merge them into '{target_branch}' first so the workspace can branch from '{target_branch}' directly."
            );
        }

        let blocking = self.blocking();
        format!(
            "Waiting on incomplete dependencies: {}. Implement them first; a merge base will combine their in-progress branches.",
            blocking.join(", ")
        )
    }
}

/// Compute dependency status for a work package from current task lanes.
///
/// Pure read over the task store; missing records degrade to `Unknown`
/// rather than failing.
pub fn check_dependency_status(
    store: &dyn TaskStore,
    feature_slug: &str,
    wp_id: &str,
    dependencies: &[String],
) -> DependencyStatus {
    let mut lanes = BTreeMap::new();
    for dep in dependencies {
        let state = match store.wp(feature_slug, dep) {
            Ok(record) => record
                .lane
                .map(LaneState::Known)
                .unwrap_or(LaneState::Unknown),
            Err(_) => LaneState::Unknown,
        };
        lanes.insert(dep.clone(), state);
    }

    let all_done = dependencies
        .iter()
        .all(|dep| lanes.get(dep).is_some_and(|l| l.is_done()));
    let is_multi_parent = dependencies.len() > 1;

    DependencyStatus {
        wp_id: wp_id.to_string(),
        dependencies: dependencies.to_vec(),
        lanes,
        all_done,
        is_multi_parent,
        should_suggest_merge_first: is_multi_parent && all_done,
    }
}
