//! Typed error hierarchy for the Foreman orchestrator.
//!
//! Errors are grouped by subsystem:
//! - `GraphError`: dependency graph construction and validation
//! - `LockError`: cross-process resource locks
//! - `GitError`: version-control subprocess failures
//! - `WorkspaceError`: workspace lifecycle and merge-base construction
//! - `TaskError`: task store access
//! - `AgentError`: external agent invocation
//! - `StoreError`: orchestration run persistence
//! - `OrchestratorError`: run-level wrapper for the above
//!
//! Recoverable-per-WP conditions (a missing dependency workspace, a merge
//! conflict, a lock timeout) are distinct variants so callers can record
//! them against a single work package instead of aborting the run.
//! `GraphError::CycleDetected` is the one run-fatal case: readiness cannot
//! be computed over a cyclic graph.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from dependency graph construction.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cycle detected in work package dependencies. Involved work packages: {wps:?}")]
    CycleDetected { wps: Vec<String> },

    #[error(
        "Unknown dependency '{dependency}' in work package '{wp_id}': no work package with that id exists"
    )]
    UnknownDependency { wp_id: String, dependency: String },

    #[error("Duplicate work package id: {0}")]
    DuplicateId(String),
}

/// Errors from the resource lock manager.
#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "Resource {resource_id} is locked. Another process is using this resource. Retry in a moment or increase timeout (current: {timeout_secs}s)."
    )]
    Timeout {
        resource_id: String,
        timeout_secs: u64,
    },

    #[error("Lock timeout must be positive")]
    InvalidTimeout,

    #[error("Failed to access lock file at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the version-control subprocess interface.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} failed with exit code {code}: {stderr}")]
    CommandFailed {
        args: String,
        code: i32,
        stderr: String,
    },

    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),
}

/// Errors from workspace creation and the merge coordinator.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(
        "Dependency {dependency} of {wp_id} has no workspace branch '{branch}'. Implement the dependency first: foreman implement {dependency}"
    )]
    DependencyWorkspaceMissing {
        wp_id: String,
        dependency: String,
        branch: String,
    },

    #[error(
        "Dependencies of {wp_id} are not ready: {blocking:?}. Implement them first (foreman implement <id>) or merge completed work packages into the target branch."
    )]
    DependencyNotReady {
        wp_id: String,
        blocking: Vec<String>,
    },

    #[error(
        "Path {path} exists but is not a worktree of this repository. Remove it manually (rm -rf {path}) and retry."
    )]
    InvalidExistingWorkspace { path: PathBuf },

    #[error("Merge conflict while building merge base for {wp_id} in: {files:?}")]
    MergeConflict { wp_id: String, files: Vec<String> },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Errors from the task store.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Work package {wp_id} not found in feature {feature}")]
    WpNotFound { feature: String, wp_id: String },

    #[error("Failed to read task file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write task file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task file {path} has no front matter block")]
    MissingFrontMatter { path: PathBuf },

    #[error("Invalid front matter in {path}: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors from external agent invocation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to communicate with agent process '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the orchestration run store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run {0} not found")]
    RunNotFound(String),

    #[error("Failed to read run file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write run file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse run file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-level errors from the execution state machine.
///
/// Per-WP failures are recorded in `WpExecution.last_error` and do not
/// surface here; these variants abort the whole run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
