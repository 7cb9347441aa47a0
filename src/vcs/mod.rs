//! Version-control subprocess interface.
//!
//! All repository mutations (worktrees, branches, merges) go through the
//! `git` binary as an external process; every failure surfaces as a typed
//! [`GitError`] carrying the subcommand, exit code, and stderr: never
//! silently swallowed. Read-only inspection that needs commit metadata
//! (staleness checks) lives in [`stale`] on top of `git2`.

pub mod stale;

pub use stale::{StaleCheckResult, check_wp_staleness};

use crate::errors::GitError;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Outcome of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean,
    /// Content conflict; the merge has been aborted and the working tree
    /// restored. Paths are relative to the repository root.
    Conflict { files: Vec<String> },
}

/// One entry from `git worktree list`.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub head: Option<String>,
    pub branch: Option<String>,
}

/// Handle to a git repository, addressed by its toplevel directory.
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    /// Open the repository containing `dir`.
    pub async fn open(dir: &Path) -> Result<Self, GitError> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Err(GitError::NotARepository(dir.to_path_buf()));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self {
            repo_root: PathBuf::from(root),
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run git in `dir`, returning trimmed stdout. Non-zero exit is an error.
    async fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let root = self.repo_root.clone();
        self.run_in(&root, args).await
    }

    /// Run git in `dir` and report only whether it exited zero.
    async fn status_in(&self, dir: &Path, args: &[&str]) -> Result<bool, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(GitError::Spawn)?;
        Ok(output.status.success())
    }

    pub async fn current_branch(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    pub async fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        self.run(&["rev-parse", rev]).await
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let root = self.repo_root.clone();
        self.status_in(
            &root,
            &[
                "rev-parse",
                "--verify",
                "--quiet",
                &format!("refs/heads/{name}"),
            ],
        )
        .await
    }

    pub async fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["branch", "-D", name]).await.map(|_| ())
    }

    /// `git worktree add -b <branch> <path> <base>`: new branch from base.
    pub async fn worktree_add(
        &self,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError> {
        self.ensure_worktree_parent(path).await?;
        let path_str = path.to_string_lossy().to_string();
        self.run(&["worktree", "add", "-b", branch, &path_str, base])
            .await
            .map(|_| ())
    }

    /// `git worktree add <path> <branch>`: reattach an existing branch.
    pub async fn worktree_add_existing(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        self.ensure_worktree_parent(path).await?;
        let path_str = path.to_string_lossy().to_string();
        self.run(&["worktree", "add", &path_str, branch])
            .await
            .map(|_| ())
    }

    async fn ensure_worktree_parent(&self, path: &Path) -> Result<(), GitError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GitError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    pub async fn worktree_remove(&self, path: &Path, force: bool) -> Result<(), GitError> {
        let path_str = path.to_string_lossy().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.run(&args).await.map(|_| ())
    }

    /// Parse `git worktree list --porcelain`.
    pub async fn worktree_list(&self) -> Result<Vec<WorktreeInfo>, GitError> {
        let output = self.run(&["worktree", "list", "--porcelain"]).await?;

        let mut worktrees = Vec::new();
        let mut current: Option<WorktreeInfo> = None;

        for line in output.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let Some(info) = current.take() {
                    worktrees.push(info);
                }
                current = Some(WorktreeInfo {
                    path: PathBuf::from(path),
                    head: None,
                    branch: None,
                });
            } else if let Some(head) = line.strip_prefix("HEAD ") {
                if let Some(info) = current.as_mut() {
                    info.head = Some(head.to_string());
                }
            } else if let Some(branch) = line.strip_prefix("branch ") {
                if let Some(info) = current.as_mut() {
                    info.branch = Some(
                        branch
                            .strip_prefix("refs/heads/")
                            .unwrap_or(branch)
                            .to_string(),
                    );
                }
            }
        }
        if let Some(info) = current {
            worktrees.push(info);
        }

        Ok(worktrees)
    }

    /// Merge `branch` into the checkout at `dir` with `--no-ff`.
    ///
    /// On a content conflict the conflicted paths are collected, the merge
    /// is aborted, and `MergeOutcome::Conflict` is returned: the checkout
    /// is left clean either way.
    pub async fn merge(
        &self,
        dir: &Path,
        branch: &str,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let output = Command::new("git")
            .args(["merge", "--no-ff", "-m", message, branch])
            .current_dir(dir)
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if output.status.success() {
            return Ok(MergeOutcome::Clean);
        }

        let conflicted = self
            .run_in(dir, &["diff", "--name-only", "--diff-filter=U"])
            .await
            .unwrap_or_default();
        let files: Vec<String> = conflicted
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let abort_ok = self.status_in(dir, &["merge", "--abort"]).await?;
        if !abort_ok {
            tracing::warn!(dir = %dir.display(), "git merge --abort failed after conflict");
        }

        if files.is_empty() {
            // Not a content conflict: surface the real failure.
            return Err(GitError::CommandFailed {
                args: format!("merge --no-ff {branch}"),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(MergeOutcome::Conflict { files })
    }

    /// `git merge-base --is-ancestor <ancestor> <descendant>`.
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let root = self.repo_root.clone();
        self.status_in(&root, &["merge-base", "--is-ancestor", ancestor, descendant])
            .await
    }

    /// Number of commits on `branch` not reachable from `base`
    /// (`git rev-list --count base..branch`).
    pub async fn commits_ahead(&self, base: &str, branch: &str) -> Result<u32, GitError> {
        let out = self
            .run(&["rev-list", "--count", &format!("{base}..{branch}")])
            .await?;
        out.parse().map_err(|_| GitError::CommandFailed {
            args: format!("rev-list --count {base}..{branch}"),
            code: 0,
            stderr: format!("unparseable count: {out}"),
        })
    }

    /// Whether `path` is a worktree (or the main checkout) of this
    /// repository, by comparing git common directories.
    pub async fn is_worktree_of(&self, path: &Path) -> Result<bool, GitError> {
        let output = Command::new("git")
            .args(["rev-parse", "--git-common-dir"])
            .current_dir(path)
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Ok(false);
        }

        let common = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let common_path = if Path::new(&common).is_absolute() {
            PathBuf::from(&common)
        } else {
            path.join(&common)
        };

        let ours = self.repo_root.join(".git");
        let ours = ours.canonicalize().unwrap_or(ours);
        let theirs = common_path.canonicalize().unwrap_or(common_path);
        Ok(ours == theirs)
    }

    /// Resolve the repository's primary branch: `origin/HEAD` when set,
    /// else the first of main/master/develop that exists, else whatever
    /// HEAD points at.
    pub async fn default_branch(&self) -> Result<String, GitError> {
        let root = self.repo_root.clone();
        if self
            .status_in(
                &root,
                &["symbolic-ref", "--quiet", "refs/remotes/origin/HEAD"],
            )
            .await?
        {
            let full = self
                .run(&["symbolic-ref", "--quiet", "refs/remotes/origin/HEAD"])
                .await?;
            if let Some(name) = full.strip_prefix("refs/remotes/origin/") {
                return Ok(name.to_string());
            }
        }

        for candidate in ["main", "master", "develop"] {
            if self.branch_exists(candidate).await? {
                return Ok(candidate.to_string());
            }
        }

        self.current_branch().await
    }
}
