//! Workspace lifecycle: one isolated branch/worktree per work package.
//!
//! The manager creates, reuses, and inspects per-WP worktrees under the
//! configured worktrees directory. Branch base selection follows the
//! dependency lanes (see [`WorkspaceManager::ensure_workspace`]); the
//! worktree-metadata mutation itself is serialized across processes by
//! the feature-level resource lock. The engine never deletes a workspace
//! implicitly: removal is always an explicit operator action.

pub mod merge_base;

pub use merge_base::{MergeBaseResult, MergeConflictFile, MergeCoordinator};

use crate::errors::WorkspaceError;
use crate::graph::{DependencyStatus, LaneState};
use crate::lock::ResourceLock;
use crate::vcs::{Git, check_wp_staleness};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An isolated branch/worktree for one work package.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// `{feature_slug}-{wp_id}`
    pub name: String,
    pub path: PathBuf,
    pub base_branch: String,
    pub current_branch: String,
    pub is_stale: bool,
}

/// Where a workspace's branch should start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchBase {
    /// Branch directly from the target branch.
    Target,
    /// Branch from a single dependency's workspace branch.
    Dependency(String),
    /// Branch from a merge-base branch combining several dependencies.
    MergeBase(String),
}

/// Creates and reuses per-WP workspaces.
pub struct WorkspaceManager {
    git: Git,
    lock_dir: PathBuf,
    worktrees_dir: PathBuf,
    lock_timeout: Duration,
    stale_threshold_minutes: i64,
}

impl WorkspaceManager {
    pub fn new(
        git: Git,
        lock_dir: PathBuf,
        worktrees_dir: PathBuf,
        lock_timeout: Duration,
        stale_threshold_minutes: i64,
    ) -> Self {
        Self {
            git,
            lock_dir,
            worktrees_dir,
            lock_timeout,
            stale_threshold_minutes,
        }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Workspace (and branch) name for a work package.
    pub fn workspace_name(feature_slug: &str, wp_id: &str) -> String {
        format!("{feature_slug}-{wp_id}")
    }

    /// Filesystem path of a work package's workspace.
    pub fn workspace_path(&self, feature_slug: &str, wp_id: &str) -> PathBuf {
        self.worktrees_dir
            .join(Self::workspace_name(feature_slug, wp_id))
    }

    /// Decide the branch base for a work package, in policy order:
    ///
    /// 1. Zero dependencies → the target branch.
    /// 2. One dependency: done → target branch (review-complete work will
    ///    be merged explicitly later, so branching from target is safe);
    ///    otherwise the dependency's own workspace branch, which must
    ///    exist.
    /// 3. Two or more: all done → target branch (avoids a needless merge
    ///    base); otherwise a merge base over the dependencies' existing
    ///    branches. A non-done dependency without a branch blocks with
    ///    `DependencyNotReady`.
    pub async fn resolve_base(
        &self,
        feature_slug: &str,
        wp_id: &str,
        status: &DependencyStatus,
    ) -> Result<BranchBase, WorkspaceError> {
        if status.dependencies.is_empty() {
            return Ok(BranchBase::Target);
        }

        if !status.is_multi_parent {
            let dep = &status.dependencies[0];
            let lane = status
                .lanes
                .get(dep)
                .copied()
                .unwrap_or(LaneState::Unknown);
            if lane.is_done() {
                return Ok(BranchBase::Target);
            }
            let branch = Self::workspace_name(feature_slug, dep);
            if !self.git.branch_exists(&branch).await.map_err(WorkspaceError::Git)? {
                return Err(WorkspaceError::DependencyWorkspaceMissing {
                    wp_id: wp_id.to_string(),
                    dependency: dep.clone(),
                    branch,
                });
            }
            return Ok(BranchBase::Dependency(branch));
        }

        if status.all_done {
            return Ok(BranchBase::Target);
        }

        // Every non-done dependency must have its workspace branch; done
        // dependencies without one contribute through the target branch.
        let mut blocking = Vec::new();
        for dep in &status.dependencies {
            let lane = status
                .lanes
                .get(dep)
                .copied()
                .unwrap_or(LaneState::Unknown);
            let branch = Self::workspace_name(feature_slug, dep);
            let exists = self.git.branch_exists(&branch).await.map_err(WorkspaceError::Git)?;
            if !lane.is_done() && !exists {
                blocking.push(dep.clone());
            }
        }
        if !blocking.is_empty() {
            return Err(WorkspaceError::DependencyNotReady {
                wp_id: wp_id.to_string(),
                blocking,
            });
        }

        Ok(BranchBase::MergeBase(format!(
            "{}-merge-base",
            Self::workspace_name(feature_slug, wp_id)
        )))
    }

    /// Create the workspace for a work package, or reuse a valid existing
    /// one.
    ///
    /// An existing directory at the workspace path is reused only if it is
    /// a worktree of this repository; anything else fails with
    /// `InvalidExistingWorkspace` and is never deleted by the engine.
    /// Worktree creation holds the feature-level lock.
    pub async fn ensure_workspace(
        &self,
        feature_slug: &str,
        wp_id: &str,
        status: &DependencyStatus,
        target_branch: &str,
    ) -> Result<Workspace, WorkspaceError> {
        let base = self.resolve_base(feature_slug, wp_id, status).await?;

        let base_branch = match &base {
            BranchBase::Target => target_branch.to_string(),
            BranchBase::Dependency(branch) => branch.clone(),
            BranchBase::MergeBase(branch) => {
                // Only build the merge base when the workspace does not
                // already exist; a rebuild would not change it anyway.
                if !self.workspace_path(feature_slug, wp_id).exists() {
                    let coordinator =
                        MergeCoordinator::new(self.git.clone(), self.worktrees_dir.clone());
                    let dep_branches: Vec<(String, String)> = status
                        .dependencies
                        .iter()
                        .map(|dep| (dep.clone(), Self::workspace_name(feature_slug, dep)))
                        .collect();
                    let result = coordinator
                        .create_multi_parent_base(feature_slug, wp_id, &dep_branches, target_branch)
                        .await
                        .map_err(WorkspaceError::Git)?;
                    for warning in &result.warnings {
                        tracing::warn!(wp_id = %wp_id, "{warning}");
                    }
                    if !result.success {
                        return Err(WorkspaceError::MergeConflict {
                            wp_id: wp_id.to_string(),
                            files: result.conflicts.iter().map(|c| c.path.clone()).collect(),
                        });
                    }
                }
                branch.clone()
            }
        };

        self.create_or_reuse(feature_slug, wp_id, &base_branch).await
    }

    /// Create (or reuse) the workspace from an explicitly chosen base
    /// branch, bypassing the dependency policy. Used by `--base`.
    pub async fn ensure_workspace_from_branch(
        &self,
        feature_slug: &str,
        wp_id: &str,
        dependency: &str,
        base_branch: &str,
    ) -> Result<Workspace, WorkspaceError> {
        if !self
            .git
            .branch_exists(base_branch)
            .await
            .map_err(WorkspaceError::Git)?
        {
            return Err(WorkspaceError::DependencyWorkspaceMissing {
                wp_id: wp_id.to_string(),
                dependency: dependency.to_string(),
                branch: base_branch.to_string(),
            });
        }
        self.create_or_reuse(feature_slug, wp_id, base_branch).await
    }

    async fn create_or_reuse(
        &self,
        feature_slug: &str,
        wp_id: &str,
        base_branch: &str,
    ) -> Result<Workspace, WorkspaceError> {
        let name = Self::workspace_name(feature_slug, wp_id);
        let path = self.workspace_path(feature_slug, wp_id);

        if path.exists() {
            if !self.git.is_worktree_of(&path).await.map_err(WorkspaceError::Git)? {
                return Err(WorkspaceError::InvalidExistingWorkspace { path });
            }
            tracing::debug!(workspace = %name, "reusing existing workspace");
            return self.describe(feature_slug, wp_id, &path, base_branch).await;
        }

        {
            let lock = ResourceLock::for_feature(&self.lock_dir, feature_slug, self.lock_timeout)
                .map_err(WorkspaceError::Lock)?;
            let _guard = lock.acquire().map_err(WorkspaceError::Lock)?;

            if self.git.branch_exists(&name).await.map_err(WorkspaceError::Git)? {
                // Branch survives an explicitly-removed worktree; reattach.
                self.git
                    .worktree_add_existing(&path, &name)
                    .await
                    .map_err(WorkspaceError::Git)?;
            } else {
                self.git
                    .worktree_add(&path, &name, base_branch)
                    .await
                    .map_err(WorkspaceError::Git)?;
            }
        }

        tracing::info!(workspace = %name, base = %base_branch, "created workspace");

        Ok(Workspace {
            name: name.clone(),
            path,
            base_branch: base_branch.to_string(),
            current_branch: name,
            is_stale: false,
        })
    }

    /// Staleness check for one work package's workspace.
    pub fn staleness(&self, feature_slug: &str, wp_id: &str) -> crate::vcs::StaleCheckResult {
        check_wp_staleness(
            wp_id,
            &self.workspace_path(feature_slug, wp_id),
            self.stale_threshold_minutes,
        )
    }

    async fn describe(
        &self,
        feature_slug: &str,
        wp_id: &str,
        path: &Path,
        base_branch: &str,
    ) -> Result<Workspace, WorkspaceError> {
        let name = Self::workspace_name(feature_slug, wp_id);
        let list = self.git.worktree_list().await.map_err(WorkspaceError::Git)?;
        let current_branch = list
            .iter()
            .find(|w| w.path == *path)
            .and_then(|w| w.branch.clone())
            .unwrap_or_else(|| name.clone());

        let stale = check_wp_staleness(wp_id, path, self.stale_threshold_minutes);

        Ok(Workspace {
            name,
            path: path.to_path_buf(),
            base_branch: base_branch.to_string(),
            current_branch,
            is_stale: stale.is_stale,
        })
    }
}
