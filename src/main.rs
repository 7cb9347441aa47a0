use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use foreman::agent::AgentKind;
use foreman::config::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(version, about = "Work-package orchestrator over isolated git worktrees")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Feature slug (e.g. 025-cli-event-log). Detected from the current
    /// branch or the specs directory when omitted.
    #[arg(long, global = true)]
    pub feature: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check dependencies and create the workspace for a work package
    Implement {
        /// Work package id (e.g. WP03)
        wp_id: String,

        /// Base the workspace on this dependency's branch instead of the
        /// policy-selected base
        #[arg(long)]
        base: Option<String>,
    },
    /// Orchestrate every ready work package of a feature through
    /// implement and review cycles
    Run {
        /// Agent to invoke (overrides configuration)
        #[arg(long, value_enum)]
        agent: Option<AgentKind>,
    },
    /// Resume a previous orchestration run by id
    Resume {
        run_id: String,

        /// Agent to invoke (overrides configuration)
        #[arg(long, value_enum)]
        agent: Option<AgentKind>,
    },
    /// Show lanes, dependency readiness, and workspace staleness
    Status,
    /// List active workspaces
    Workspaces,
    /// List recorded orchestration runs
    Runs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("foreman=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let project_dir = cli
        .project_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = Config::load(project_dir, cli.verbose)?;

    match &cli.command {
        Commands::Implement { wp_id, base } => {
            cmd::cmd_implement(&config, wp_id, cli.feature.as_deref(), base.as_deref()).await?;
        }
        Commands::Run { agent } => {
            cmd::cmd_run(&config, cli.feature.as_deref(), *agent).await?;
        }
        Commands::Resume { run_id, agent } => {
            cmd::cmd_resume(&config, run_id, *agent).await?;
        }
        Commands::Status => {
            cmd::cmd_status(&config, cli.feature.as_deref()).await?;
        }
        Commands::Workspaces => {
            cmd::cmd_workspaces(&config).await?;
        }
        Commands::Runs => {
            cmd::cmd_runs(&config)?;
        }
    }

    Ok(())
}
