//! Runtime configuration for Foreman.
//!
//! Everything the components need (lock directory, runs directory,
//! worktrees directory, agent selection, retry bounds) is carried
//! explicitly in this struct and passed into constructors; there is no
//! process-wide mutable state. Values are layered: `.foreman/foreman.toml`
//! → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! target_branch = "main"
//! specs_dir = "specs"
//!
//! [orchestrator]
//! max_review_cycles = 5
//! lock_timeout_secs = 300
//! stale_threshold_minutes = 10
//!
//! [agent]
//! kind = "claude"
//! command = "claude"
//! ```

use crate::agent::AgentKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on review/rework cycles per work package.
pub const DEFAULT_MAX_REVIEW_CYCLES: u32 = 5;

/// Default staleness threshold for workspace commits.
pub const DEFAULT_STALE_THRESHOLD_MINUTES: i64 = 10;

/// `.foreman/foreman.toml` on disk. All sections and fields optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForemanToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub agent: AgentSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    pub target_branch: Option<String>,
    pub specs_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorSection {
    pub max_review_cycles: Option<u32>,
    pub lock_timeout_secs: Option<u64>,
    pub stale_threshold_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSection {
    pub kind: Option<AgentKind>,
    pub command: Option<String>,
}

impl ForemanToml {
    /// Load from `{project_dir}/.foreman/foreman.toml`; absent file is an
    /// empty config.
    pub fn load(project_dir: &std::path::Path) -> Result<Self> {
        let path = project_dir.join(".foreman").join("foreman.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub specs_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    /// Branch the feature's work merges into; `None` means detect the
    /// repository's default branch.
    pub target_branch: Option<String>,
    pub max_review_cycles: u32,
    pub lock_timeout: Duration,
    pub stale_threshold_minutes: i64,
    pub agent_kind: AgentKind,
    /// Override for the agent executable (`FOREMAN_AGENT_CMD` or config).
    pub agent_command: Option<String>,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration for a project directory.
    pub fn load(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let file = ForemanToml::load(&project_dir)?;

        let foreman_dir = project_dir.join(".foreman");
        let specs_dir = project_dir.join(file.project.specs_dir.as_deref().unwrap_or("specs"));

        let agent_command = std::env::var("FOREMAN_AGENT_CMD")
            .ok()
            .or(file.agent.command);

        Ok(Self {
            specs_dir,
            lock_dir: foreman_dir.join("locks"),
            runs_dir: foreman_dir.join("runs"),
            worktrees_dir: project_dir.join(".worktrees"),
            target_branch: file.project.target_branch,
            max_review_cycles: file
                .orchestrator
                .max_review_cycles
                .unwrap_or(DEFAULT_MAX_REVIEW_CYCLES),
            lock_timeout: Duration::from_secs(
                file.orchestrator
                    .lock_timeout_secs
                    .unwrap_or(crate::lock::DEFAULT_LOCK_TIMEOUT.as_secs()),
            ),
            stale_threshold_minutes: file
                .orchestrator
                .stale_threshold_minutes
                .unwrap_or(DEFAULT_STALE_THRESHOLD_MINUTES),
            agent_kind: file.agent.kind.unwrap_or_default(),
            agent_command,
            verbose,
            project_dir,
        })
    }

    /// Create the directories the orchestrator writes to.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.lock_dir).context("Failed to create lock directory")?;
        std::fs::create_dir_all(&self.runs_dir).context("Failed to create runs directory")?;
        std::fs::create_dir_all(&self.worktrees_dir)
            .context("Failed to create worktrees directory")?;
        Ok(())
    }
}
