//! Feature orchestration: `foreman run` and `foreman resume`.

use anyhow::{Result, bail};
use console::style;
use std::sync::Arc;

use foreman::agent::{AgentKind, AgentRunner, CliAgent};
use foreman::config::Config;
use foreman::feature::detect_feature_slug;
use foreman::orchestrator::{OrchestrationRun, Orchestrator, WpStatus};
use foreman::tasks::{FileTaskStore, TaskStore};
use foreman::ui::RunUi;

fn build_agent(config: &Config, kind_override: Option<AgentKind>) -> Arc<CliAgent> {
    let kind = kind_override.unwrap_or(config.agent_kind);
    let mut agent = CliAgent::new(kind);
    if let Some(command) = &config.agent_command {
        agent = agent.with_command(command.clone());
    }
    Arc::new(agent)
}

pub async fn cmd_run(
    config: &Config,
    feature: Option<&str>,
    agent_kind: Option<AgentKind>,
) -> Result<()> {
    config.ensure_directories()?;

    let feature_slug = match feature {
        Some(slug) => slug.to_string(),
        None => detect_feature_slug(&config.project_dir, &config.specs_dir)?,
    };

    let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
    let wp_count = tasks.wps_for_feature(&feature_slug)?.len();
    if wp_count == 0 {
        bail!(
            "No work packages found for feature {feature_slug} under {}",
            config.specs_dir.display()
        );
    }

    let agent = build_agent(config, agent_kind);
    println!(
        "Orchestrating {} ({} work packages) with agent {}",
        style(&feature_slug).bold(),
        wp_count,
        agent.describe()
    );

    let ui = Arc::new(RunUi::new(wp_count as u64, config.verbose));
    let orchestrator = Orchestrator::new(config.clone(), tasks, agent)
        .await?
        .with_ui(ui);

    let run = orchestrator.run_feature(&feature_slug).await?;
    print_summary(&run);

    if run.failed_count() > 0 {
        bail!("{} work package(s) failed", run.failed_count());
    }
    Ok(())
}

pub async fn cmd_resume(
    config: &Config,
    run_id: &str,
    agent_kind: Option<AgentKind>,
) -> Result<()> {
    config.ensure_directories()?;

    let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
    let agent = build_agent(config, agent_kind);

    let orchestrator = Orchestrator::new(config.clone(), tasks, agent).await?;
    println!("Resuming run {}", style(run_id).bold());

    let run = orchestrator.resume(run_id).await?;
    print_summary(&run);

    if run.failed_count() > 0 {
        bail!("{} work package(s) failed", run.failed_count());
    }
    Ok(())
}

fn print_summary(run: &OrchestrationRun) {
    println!();
    println!(
        "Run {}: {}",
        style(&run.run_id).bold(),
        if run.is_complete() {
            "complete".to_string()
        } else {
            "stopped (unresolved dependencies remain)".to_string()
        }
    );
    for (wp_id, exec) in &run.work_packages {
        let status = match exec.status {
            WpStatus::Done => style(exec.status.to_string()).green(),
            WpStatus::Failed => style(exec.status.to_string()).red(),
            _ => style(exec.status.to_string()).yellow(),
        };
        print!("  {wp_id}: {status}");
        if exec.implementation_retries > 0 {
            print!(" ({} review cycles)", exec.implementation_retries);
        }
        if let Some(error) = &exec.last_error {
            print!(": {error}");
        }
        println!();
    }
}
