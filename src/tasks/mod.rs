//! Work package records and the task store contract.
//!
//! The orchestration engine never parses task files itself: it consumes
//! the structured contract below. [`store::FileTaskStore`] is the
//! file-backed implementation (markdown with YAML front matter).

pub mod store;

pub use store::FileTaskStore;

use crate::errors::TaskError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task-store-visible lifecycle label for a work package.
///
/// Distinct from the engine's internal `WpStatus`: the lane is what other
/// processes and humans see in the task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Planned,
    Doing,
    ForReview,
    Done,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Planned => "planned",
            Lane::Doing => "doing",
            Lane::ForReview => "for_review",
            Lane::Done => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Lane::Done)
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Lane::Planned),
            "doing" => Ok(Lane::Doing),
            "for_review" => Ok(Lane::ForReview),
            "done" => Ok(Lane::Done),
            other => Err(format!("unknown lane: {other}")),
        }
    }
}

/// One entry in a work package's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub lane: Lane,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HistoryEntry {
    pub fn now(lane: Lane, agent: impl Into<String>, note: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            lane,
            agent: agent.into(),
            note,
        }
    }
}

/// A work package record as read from the task store.
///
/// `lane` is `None` when the record carries no lane field: dependency
/// status reports that as "unknown" rather than guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPackage {
    #[serde(rename = "work_package_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<Lane>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

impl WorkPackage {
    pub fn is_done(&self) -> bool {
        self.lane.is_some_and(|l| l.is_done())
    }
}

/// Read/write access to work package records for a feature.
///
/// The engine requests lane transitions and history appends through this
/// trait; it never mutates records directly.
pub trait TaskStore: Send + Sync {
    /// All work package records for a feature, in stable (id) order.
    fn wps_for_feature(&self, feature_slug: &str) -> Result<Vec<WorkPackage>, TaskError>;

    /// A single work package record.
    fn wp(&self, feature_slug: &str, wp_id: &str) -> Result<WorkPackage, TaskError>;

    /// Move a work package to a lane.
    fn set_lane(&self, feature_slug: &str, wp_id: &str, lane: Lane) -> Result<(), TaskError>;

    /// Append a history entry to a work package record.
    fn append_history(
        &self,
        feature_slug: &str,
        wp_id: &str,
        entry: HistoryEntry,
    ) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_round_trip() {
        for lane in [Lane::Planned, Lane::Doing, Lane::ForReview, Lane::Done] {
            let parsed: Lane = lane.as_str().parse().unwrap();
            assert_eq!(parsed, lane);
        }
    }

    #[test]
    fn test_lane_unknown_string_rejected() {
        assert!("review".parse::<Lane>().is_err());
    }

    #[test]
    fn test_work_package_is_done() {
        let mut wp = WorkPackage {
            id: "WP01".to_string(),
            title: "Event Infrastructure".to_string(),
            lane: Some(Lane::Done),
            dependencies: vec![],
            history: vec![],
        };
        assert!(wp.is_done());
        wp.lane = Some(Lane::Doing);
        assert!(!wp.is_done());
        wp.lane = None;
        assert!(!wp.is_done());
    }
}
