//! Read-only reporting: `foreman status`, `foreman workspaces`,
//! `foreman runs`.

use anyhow::Result;
use console::style;

use foreman::config::Config;
use foreman::feature::detect_feature_slug;
use foreman::graph::check_dependency_status;
use foreman::orchestrator::RunStore;
use foreman::tasks::{FileTaskStore, Lane, TaskStore};
use foreman::vcs::Git;
use foreman::workspace::WorkspaceManager;

pub async fn cmd_status(config: &Config, feature: Option<&str>) -> Result<()> {
    let feature_slug = match feature {
        Some(slug) => slug.to_string(),
        None => detect_feature_slug(&config.project_dir, &config.specs_dir)?,
    };

    let store = FileTaskStore::new(config.specs_dir.clone());
    let wps = store.wps_for_feature(&feature_slug)?;
    if wps.is_empty() {
        println!("No work packages found for feature {feature_slug}");
        return Ok(());
    }

    let git = Git::open(&config.project_dir).await?;
    let target_branch = match &config.target_branch {
        Some(branch) => branch.clone(),
        None => git.default_branch().await?,
    };
    let manager = WorkspaceManager::new(
        git,
        config.lock_dir.clone(),
        config.worktrees_dir.clone(),
        config.lock_timeout,
        config.stale_threshold_minutes,
    );

    println!(
        "Feature {} (target branch: {})",
        style(&feature_slug).bold(),
        target_branch
    );
    for wp in &wps {
        let lane = wp
            .lane
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let lane_styled = match wp.lane {
            Some(Lane::Done) => style(lane).green(),
            Some(Lane::Doing) | Some(Lane::ForReview) => style(lane).yellow(),
            _ => style(lane).dim(),
        };
        println!("  {} [{}] {}", style(&wp.id).bold(), lane_styled, wp.title);

        if !wp.dependencies.is_empty() {
            let status = check_dependency_status(&store, &feature_slug, &wp.id, &wp.dependencies);
            if !status.all_done {
                println!("      {}", style(status.recommendation(&target_branch)).dim());
            }
        }

        let stale = manager.staleness(&feature_slug, &wp.id);
        if stale.worktree_exists {
            if stale.is_stale {
                println!(
                    "      {}",
                    style(format!(
                        "workspace stale: last commit {} minutes ago",
                        stale.minutes_since_commit.unwrap_or_default()
                    ))
                    .yellow()
                );
            } else {
                println!("      {}", style("workspace active").dim());
            }
        }
    }

    Ok(())
}

pub async fn cmd_workspaces(config: &Config) -> Result<()> {
    let git = Git::open(&config.project_dir).await?;
    let worktrees = git.worktree_list().await?;

    let managed: Vec<_> = worktrees
        .iter()
        .filter(|w| w.path.starts_with(&config.worktrees_dir))
        .collect();

    if managed.is_empty() {
        println!("No active workspaces under {}", config.worktrees_dir.display());
        return Ok(());
    }

    println!("{}", style("Active workspaces:").bold());
    for worktree in managed {
        println!(
            "  {}: {}",
            worktree.branch.as_deref().unwrap_or("(detached)"),
            worktree.path.display()
        );
    }
    Ok(())
}

pub fn cmd_runs(config: &Config) -> Result<()> {
    let store = RunStore::new(config.runs_dir.clone());
    let runs = store.list()?;
    if runs.is_empty() {
        println!("No recorded runs under {}", config.runs_dir.display());
        return Ok(());
    }

    println!("{}", style("Runs (newest first):").bold());
    for run_id in runs {
        match store.load(&run_id) {
            Ok(run) => {
                println!(
                    "  {}: {} ({} done, {} failed, {})",
                    style(&run_id).bold(),
                    run.feature_slug,
                    run.done_count(),
                    run.failed_count(),
                    if run.is_complete() { "complete" } else { "resumable" },
                );
            }
            Err(e) => println!("  {run_id}: unreadable: {e}"),
        }
    }
    Ok(())
}
