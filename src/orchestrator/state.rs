//! Orchestration run state.
//!
//! One [`OrchestrationRun`] per orchestration session, holding a
//! [`WpExecution`] per work package. The execution status is the engine's
//! internal view and is distinct from the task-store lane; a resumed run
//! reconciles the two.

use crate::tasks::WorkPackage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Engine-internal lifecycle state of one work package execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpStatus {
    /// Waiting to be scheduled.
    Planned,
    /// Workspace created, implementation agent running.
    Doing,
    /// Implementation complete, awaiting review.
    ForReview,
    /// Review agent running.
    Review,
    /// Rejected in review; eligible for scheduling exactly like Planned.
    Rework,
    /// Approved. Terminal.
    Done,
    /// Unrecoverable for this run. Terminal.
    Failed,
}

impl WpStatus {
    /// Terminal states are never rescheduled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WpStatus::Done | WpStatus::Failed)
    }

    /// States the scheduler may pick up.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, WpStatus::Planned | WpStatus::Rework)
    }

    /// States that were mid-processing when a run stopped.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, WpStatus::Doing | WpStatus::ForReview | WpStatus::Review)
    }
}

impl std::fmt::Display for WpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WpStatus::Planned => "planned",
            WpStatus::Doing => "doing",
            WpStatus::ForReview => "for_review",
            WpStatus::Review => "review",
            WpStatus::Rework => "rework",
            WpStatus::Done => "done",
            WpStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Execution record of one work package within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WpExecution {
    pub wp_id: String,
    pub status: WpStatus,
    #[serde(default)]
    pub implementation_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WpExecution {
    pub fn new(wp_id: impl Into<String>) -> Self {
        Self {
            wp_id: wp_id.into(),
            status: WpStatus::Planned,
            implementation_retries: 0,
            review_feedback: None,
            last_error: None,
        }
    }
}

/// Durable state of one orchestration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRun {
    pub run_id: String,
    pub feature_slug: String,
    pub started_at: DateTime<Utc>,
    pub work_packages: BTreeMap<String, WpExecution>,
}

impl OrchestrationRun {
    /// New run seeded from the feature's current task lanes: work already
    /// in the `done` lane starts as Done, everything else as Planned.
    pub fn new(feature_slug: impl Into<String>, wps: &[WorkPackage]) -> Self {
        let mut run = Self::empty(format!("run-{}", Uuid::new_v4()), feature_slug);
        for wp in wps {
            let mut exec = WpExecution::new(&wp.id);
            if wp.is_done() {
                exec.status = WpStatus::Done;
            }
            run.work_packages.insert(wp.id.clone(), exec);
        }
        run
    }

    /// Bare run with no work packages; callers fill `work_packages`.
    pub fn empty(run_id: impl Into<String>, feature_slug: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            feature_slug: feature_slug.into(),
            started_at: Utc::now(),
            work_packages: BTreeMap::new(),
        }
    }

    /// Ensure every listed work package has an execution record (new WPs
    /// may appear between a crash and a resume).
    pub fn reconcile(&mut self, wps: &[WorkPackage]) {
        for wp in wps {
            self.work_packages
                .entry(wp.id.clone())
                .or_insert_with(|| {
                    let mut exec = WpExecution::new(&wp.id);
                    if wp.is_done() {
                        exec.status = WpStatus::Done;
                    }
                    exec
                });
        }
    }

    /// Reset in-flight work packages to Planned for a resumed run.
    ///
    /// Re-invocation of an interrupted implementation or review is
    /// acceptable: the engine guarantees bounded retries, not
    /// exactly-once. Returns the ids that were reset.
    pub fn reset_in_flight(&mut self) -> Vec<String> {
        let mut reset = Vec::new();
        for exec in self.work_packages.values_mut() {
            if exec.status.is_in_flight() {
                exec.status = WpStatus::Planned;
                reset.push(exec.wp_id.clone());
            }
        }
        reset
    }

    /// True once every work package is terminal.
    pub fn is_complete(&self) -> bool {
        self.work_packages.values().all(|e| e.status.is_terminal())
    }

    pub fn done_count(&self) -> usize {
        self.work_packages
            .values()
            .filter(|e| e.status == WpStatus::Done)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.work_packages
            .values()
            .filter(|e| e.status == WpStatus::Failed)
            .count()
    }
}
