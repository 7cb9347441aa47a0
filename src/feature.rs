//! Feature-slug detection.
//!
//! A feature slug looks like `025-cli-event-log-integration`. When the
//! operator does not pass `--feature`, the slug is detected from the
//! current git branch (`{slug}` or `{slug}-WP07`), falling back to the
//! most recently modified feature directory under the specs dir.

use anyhow::{Result, anyhow};
use git2::Repository;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3}-[A-Za-z0-9][A-Za-z0-9-]*?)(?:-WP\d+)?$").expect("valid regex")
});

/// Extract a feature slug from a branch name, stripping any `-WPxx`
/// workspace suffix. Returns `None` for branches that are not
/// feature-shaped (e.g. `main`).
pub fn slug_from_branch(branch: &str) -> Option<String> {
    BRANCH_RE
        .captures(branch)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Detect the active feature slug for a project.
pub fn detect_feature_slug(project_dir: &Path, specs_dir: &Path) -> Result<String> {
    if let Some(slug) = slug_from_current_branch(project_dir) {
        if specs_dir.join(&slug).is_dir() {
            return Ok(slug);
        }
    }

    if let Some(slug) = latest_feature_dir(specs_dir) {
        return Ok(slug);
    }

    Err(anyhow!(
        "Could not detect feature context. Provide --feature explicitly or check out a feature branch."
    ))
}

fn slug_from_current_branch(project_dir: &Path) -> Option<String> {
    let repo = Repository::discover(project_dir).ok()?;
    let head = repo.head().ok()?;
    let branch = head.shorthand()?;
    slug_from_branch(branch)
}

/// Most recently modified directory under the specs dir that has a
/// `tasks/` subdirectory.
fn latest_feature_dir(specs_dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(specs_dir).ok()?;

    let mut features: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if !path.is_dir() || !path.join("tasks").is_dir() {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, path))
        })
        .collect();

    features.sort_by(|a, b| b.0.cmp(&a.0));
    features
        .first()
        .and_then(|(_, path)| path.file_name().map(|n| n.to_string_lossy().into_owned()))
}
