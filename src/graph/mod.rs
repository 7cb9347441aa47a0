//! Dependency graph, readiness computation, and dependency status.

pub mod builder;
pub mod ready;
pub mod status;

pub use builder::{GraphBuilder, WpGraph};
pub use ready::ready_wps;
pub use status::{DependencyStatus, LaneState, check_dependency_status};
