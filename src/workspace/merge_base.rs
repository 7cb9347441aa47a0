//! Merge coordinator for multi-parent dependencies.
//!
//! When a work package depends on several in-progress branches, its
//! workspace needs a base that contains all of them. The coordinator
//! builds a deterministic `{feature_slug}-{wp_id}-merge-base` branch by
//! merging the dependency branches sequentially inside a scratch
//! worktree, so the operator's checkout is never touched. A content
//! conflict aborts the whole operation: the scratch worktree and the
//! partial branch are removed, and the per-file conflict report names
//! the dependency that collided. Dependency branches with no commits
//! beyond the target produce non-fatal warnings.

use crate::errors::GitError;
use crate::vcs::{Git, MergeOutcome};
use std::path::PathBuf;

/// One conflicted path, attributed to the dependency whose merge failed.
#[derive(Debug, Clone)]
pub struct MergeConflictFile {
    pub path: String,
    pub dependency: String,
}

/// Outcome of building a merge-base branch. Recomputed on every rebuild;
/// the branch itself is durable once created.
#[derive(Debug, Clone)]
pub struct MergeBaseResult {
    pub branch_name: String,
    pub commit_sha: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub conflicts: Vec<MergeConflictFile>,
}

/// Builds merge-base branches for multi-parent work packages.
pub struct MergeCoordinator {
    git: Git,
    worktrees_dir: PathBuf,
}

impl MergeCoordinator {
    pub fn new(git: Git, worktrees_dir: PathBuf) -> Self {
        Self { git, worktrees_dir }
    }

    /// Merge-base branch name for a work package.
    pub fn branch_name(feature_slug: &str, wp_id: &str) -> String {
        format!("{feature_slug}-{wp_id}-merge-base")
    }

    /// Build (or rebuild) the merge-base branch for `wp_id` from the
    /// given `(dependency_id, branch)` pairs.
    ///
    /// Dependencies whose branch does not exist are skipped: their work
    /// is expected to reach the target branch through an explicit merge.
    /// Returns `Ok` with `success = false` on a content conflict; `Err`
    /// only for infrastructure failures.
    pub async fn create_multi_parent_base(
        &self,
        feature_slug: &str,
        wp_id: &str,
        dependency_branches: &[(String, String)],
        target_branch: &str,
    ) -> Result<MergeBaseResult, GitError> {
        let branch_name = Self::branch_name(feature_slug, wp_id);

        let mut warnings = Vec::new();
        let mut to_merge = Vec::new();
        for (dep, branch) in dependency_branches {
            if !self.git.branch_exists(branch).await? {
                tracing::debug!(branch = %branch, "dependency branch absent, skipping");
                continue;
            }
            if self.git.commits_ahead(target_branch, branch).await? == 0 {
                warnings.push(format!(
                    "Dependency branch '{branch}' has no commits beyond {target_branch} - may indicate incomplete work or uncommitted changes; the merge-base will not include any work from this branch"
                ));
            }
            to_merge.push((dep.clone(), branch.clone()));
        }

        // Rebuild from scratch each time: the previous merge base may
        // predate new commits on the dependency branches.
        if self.git.branch_exists(&branch_name).await? {
            self.git.delete_branch(&branch_name).await?;
        }

        let scratch = self.worktrees_dir.join(format!(".merge-{wp_id}"));
        if scratch.exists() {
            self.git.worktree_remove(&scratch, true).await?;
        }
        self.git
            .worktree_add(&scratch, &branch_name, target_branch)
            .await?;

        for (dep, branch) in &to_merge {
            let message = format!("Merge {branch} into {branch_name}");
            match self.git.merge(&scratch, branch, &message).await? {
                MergeOutcome::Clean => {}
                MergeOutcome::Conflict { files } => {
                    let conflicts: Vec<MergeConflictFile> = files
                        .into_iter()
                        .map(|path| MergeConflictFile {
                            path,
                            dependency: dep.clone(),
                        })
                        .collect();

                    // No partial state: drop the scratch worktree and the
                    // half-built branch before reporting.
                    self.git.worktree_remove(&scratch, true).await?;
                    self.git.delete_branch(&branch_name).await?;

                    tracing::warn!(
                        wp_id = %wp_id,
                        branch = %branch,
                        files = conflicts.len(),
                        "merge-base construction aborted on conflict"
                    );

                    return Ok(MergeBaseResult {
                        branch_name,
                        commit_sha: None,
                        success: false,
                        error: Some(format!(
                            "Merge conflict while merging '{branch}' into the merge base"
                        )),
                        warnings,
                        conflicts,
                    });
                }
            }
        }

        let commit_sha = self.git.rev_parse(&branch_name).await?;
        self.git.worktree_remove(&scratch, true).await?;

        tracing::info!(branch = %branch_name, sha = %commit_sha, "merge base created");

        Ok(MergeBaseResult {
            branch_name,
            commit_sha: Some(commit_sha),
            success: true,
            error: None,
            warnings,
            conflicts: Vec::new(),
        })
    }
}
