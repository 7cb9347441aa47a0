//! Readiness computation over a run's current state.

use crate::graph::WpGraph;
use crate::orchestrator::state::{OrchestrationRun, WpStatus};

/// Work packages eligible for scheduling right now.
///
/// A work package is ready when its execution status is `Planned` or
/// `Rework` and every dependency's execution status is `Done`. A work
/// package with no dependencies is always ready once schedulable. Pure
/// function over the run state; the result is sorted for deterministic
/// scheduling.
pub fn ready_wps(graph: &WpGraph, run: &OrchestrationRun) -> Vec<String> {
    let mut ready: Vec<String> = graph
        .wps()
        .iter()
        .filter(|wp| {
            let Some(exec) = run.work_packages.get(&wp.id) else {
                return false;
            };
            if !exec.status.is_schedulable() {
                return false;
            }
            wp.dependencies.iter().all(|dep| {
                run.work_packages
                    .get(dep)
                    .is_some_and(|d| d.status == WpStatus::Done)
            })
        })
        .map(|wp| wp.id.clone())
        .collect();
    ready.sort();
    ready
}
