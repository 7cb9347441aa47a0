//! `foreman implement <WP>`: dependency check plus workspace creation.

use anyhow::{Context, Result, bail};
use console::style;

use foreman::config::Config;
use foreman::errors::WorkspaceError;
use foreman::feature::detect_feature_slug;
use foreman::graph::check_dependency_status;
use foreman::tasks::{FileTaskStore, TaskStore};
use foreman::vcs::Git;
use foreman::workspace::WorkspaceManager;

pub async fn cmd_implement(
    config: &Config,
    wp_id: &str,
    feature: Option<&str>,
    base: Option<&str>,
) -> Result<()> {
    config.ensure_directories()?;

    let feature_slug = match feature {
        Some(slug) => slug.to_string(),
        None => detect_feature_slug(&config.project_dir, &config.specs_dir)?,
    };

    let store = FileTaskStore::new(config.specs_dir.clone());
    let wp = store
        .wp(&feature_slug, wp_id)
        .with_context(|| format!("Work package {wp_id} not found in feature {feature_slug}"))?;

    let git = Git::open(&config.project_dir).await?;
    let target_branch = match &config.target_branch {
        Some(branch) => branch.clone(),
        None => git.default_branch().await?,
    };

    // An explicit --base must name a declared dependency.
    if let Some(base) = base {
        if !wp.dependencies.iter().any(|d| d == base) {
            bail!(
                "--base {base} is not a dependency of {wp_id} (dependencies: {:?})",
                wp.dependencies
            );
        }
    }

    let status = check_dependency_status(&store, &feature_slug, wp_id, &wp.dependencies);
    println!(
        "{} {}",
        style("Dependencies:").bold(),
        if status.dependencies.is_empty() {
            "none".to_string()
        } else {
            status
                .dependencies
                .iter()
                .map(|d| {
                    format!(
                        "{d} ({})",
                        status
                            .lanes
                            .get(d)
                            .map(|l| l.as_str())
                            .unwrap_or("unknown")
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("  {}", style(status.recommendation(&target_branch)).dim());

    let manager = WorkspaceManager::new(
        git,
        config.lock_dir.clone(),
        config.worktrees_dir.clone(),
        config.lock_timeout,
        config.stale_threshold_minutes,
    );

    // An explicit --base on a not-yet-done dependency pins the workspace
    // to that dependency's branch; otherwise the branching policy decides.
    let base_not_done = base.filter(|b| {
        !status
            .lanes
            .get(*b)
            .is_some_and(foreman::graph::LaneState::is_done)
    });
    let ensured = match base_not_done {
        Some(dep) => {
            let branch = WorkspaceManager::workspace_name(&feature_slug, dep);
            manager
                .ensure_workspace_from_branch(&feature_slug, wp_id, dep, &branch)
                .await
        }
        None => {
            manager
                .ensure_workspace(&feature_slug, wp_id, &status, &target_branch)
                .await
        }
    };

    let workspace = match ensured {
        Ok(ws) => ws,
        Err(WorkspaceError::MergeConflict { wp_id, files }) => {
            eprintln!(
                "{} Merge conflict while building the merge base for {wp_id}:",
                style("✗").red().bold()
            );
            for file in &files {
                eprintln!("    {file}");
            }
            bail!("Resolve the conflicting work packages before implementing {wp_id}");
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} Workspace ready: {} (branch {}, based on {})",
        style("✓").green().bold(),
        workspace.path.display(),
        workspace.current_branch,
        workspace.base_branch,
    );
    if workspace.is_stale {
        println!(
            "  {}",
            style("Warning: the newest commit in this workspace is old: work may have stalled.")
                .yellow()
        );
    }
    println!(
        "  Next: implement {wp_id} in that directory, then run {} to orchestrate reviews.",
        style("foreman run").bold()
    );

    Ok(())
}
