//! Workspace staleness detection.
//!
//! A workspace is stale when it has commits of its own beyond the
//! repository's default branch and the newest of them is older than a
//! threshold: a signal that work stopped mid-flight. A fresh worktree
//! with no commits of its own is never stale. All failure modes
//! (missing path, detached HEAD, no merge base) degrade to "not stale";
//! staleness is advisory, never blocking.

use chrono::{DateTime, TimeZone, Utc};
use git2::{BranchType, Repository};
use std::path::Path;

/// Result of a staleness check for one work package workspace.
#[derive(Debug, Clone)]
pub struct StaleCheckResult {
    pub wp_id: String,
    pub is_stale: bool,
    pub last_commit_time: Option<DateTime<Utc>>,
    pub minutes_since_commit: Option<i64>,
    pub worktree_exists: bool,
}

impl StaleCheckResult {
    fn absent(wp_id: &str) -> Self {
        Self {
            wp_id: wp_id.to_string(),
            is_stale: false,
            last_commit_time: None,
            minutes_since_commit: None,
            worktree_exists: false,
        }
    }

    fn fresh(wp_id: &str) -> Self {
        Self {
            wp_id: wp_id.to_string(),
            is_stale: false,
            last_commit_time: None,
            minutes_since_commit: None,
            worktree_exists: true,
        }
    }
}

/// Resolve the repository's default branch without touching the network:
/// `origin/HEAD` when set, else the first of main/master/develop that
/// exists locally, else whatever HEAD points at.
pub fn default_branch(repo: &Repository) -> Option<String> {
    if let Ok(reference) = repo.find_reference("refs/remotes/origin/HEAD")
        && let Some(target) = reference.symbolic_target()
        && let Some(name) = target.strip_prefix("refs/remotes/origin/")
    {
        return Some(name.to_string());
    }

    for candidate in ["main", "master", "develop"] {
        if repo.find_branch(candidate, BranchType::Local).is_ok() {
            return Some(candidate.to_string());
        }
    }

    repo.head().ok().and_then(|h| h.shorthand().map(String::from))
}

/// Time of the newest commit on HEAD that is not reachable from the
/// default branch, plus whether any such commit exists.
///
/// Returns `(None, false)` when the branch has no commits of its own
/// (merge base equals HEAD) or when the repository state prevents the
/// comparison.
pub fn last_meaningful_commit_time(repo: &Repository) -> (Option<DateTime<Utc>>, bool) {
    let Some(head) = repo.head().ok().and_then(|h| h.peel_to_commit().ok()) else {
        return (None, false);
    };

    let Some(default) = default_branch(repo) else {
        return (None, false);
    };

    let Some(default_oid) = repo
        .find_branch(&default, BranchType::Local)
        .ok()
        .and_then(|b| b.get().target())
    else {
        return (None, false);
    };

    if default_oid == head.id() {
        return (None, false);
    }

    let Ok(base) = repo.merge_base(head.id(), default_oid) else {
        return (None, false);
    };
    if base == head.id() {
        // HEAD is reachable from the default branch: no own commits.
        return (None, false);
    }

    let time = Utc.timestamp_opt(head.time().seconds(), 0).single();
    (time, time.is_some())
}

/// Check whether a work package's workspace looks abandoned.
pub fn check_wp_staleness(
    wp_id: &str,
    worktree_path: &Path,
    threshold_minutes: i64,
) -> StaleCheckResult {
    if !worktree_path.exists() {
        return StaleCheckResult::absent(wp_id);
    }

    let Ok(repo) = Repository::open(worktree_path) else {
        return StaleCheckResult::fresh(wp_id);
    };

    let (last_commit_time, has_own_commits) = last_meaningful_commit_time(&repo);
    if !has_own_commits {
        return StaleCheckResult::fresh(wp_id);
    }

    let last = last_commit_time.expect("has_own_commits implies a commit time");
    let minutes = (Utc::now() - last).num_minutes();

    StaleCheckResult {
        wp_id: wp_id.to_string(),
        is_stale: minutes > threshold_minutes,
        last_commit_time: Some(last),
        minutes_since_commit: Some(minutes),
        worktree_exists: true,
    }
}
