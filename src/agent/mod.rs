//! External agent invocation.
//!
//! The engine treats AI agents as opaque executables: hand over a prompt
//! and a working directory, get back exit code and captured output. Which
//! executable runs is a closed configuration choice ([`AgentKind`]), not
//! runtime type inspection. [`AgentRunner`] is the seam: production uses
//! [`CliAgent`]; tests substitute scripted doubles.

use crate::errors::AgentError;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Supported agent executables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
    Gemini,
    Opencode,
}

impl AgentKind {
    /// Default executable name for this agent kind.
    pub fn default_command(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Gemini => "gemini",
            AgentKind::Opencode => "opencode",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.default_command())
    }
}

/// One agent invocation: a prompt executed in a working directory.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
}

/// Captured result of a finished agent process.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between the engine and agent executables.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Human-readable identifier for logs and run output.
    fn describe(&self) -> String;

    /// Invoke the agent and wait for it to finish. Fully synchronous from
    /// the engine's perspective; cancellation is process termination.
    async fn invoke(&self, request: &AgentRequest) -> Result<InvocationResult, AgentError>;
}

/// Agent runner that shells out to an agent CLI.
pub struct CliAgent {
    kind: AgentKind,
    command: String,
}

impl CliAgent {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            command: kind.default_command().to_string(),
        }
    }

    /// Override the executable (e.g. an absolute path or wrapper script).
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Non-interactive flags per agent kind. The prompt travels on stdin
    /// for every kind except gemini, which takes it as an argument.
    fn args(&self, prompt: &str) -> Vec<String> {
        match self.kind {
            AgentKind::Claude => vec![
                "-p".into(),
                "--output-format".into(),
                "json".into(),
                "--dangerously-skip-permissions".into(),
            ],
            AgentKind::Codex => {
                vec!["exec".into(), "-".into(), "--json".into(), "--full-auto".into()]
            }
            AgentKind::Gemini => vec![
                "--yolo".into(),
                "-o".into(),
                "json".into(),
                prompt.to_string(),
            ],
            AgentKind::Opencode => vec!["run".into(), "--format".into(), "json".into()],
        }
    }

    fn prompt_via_stdin(&self) -> bool {
        !matches!(self.kind, AgentKind::Gemini)
    }
}

#[async_trait]
impl AgentRunner for CliAgent {
    fn describe(&self) -> String {
        format!("{} ({})", self.kind, self.command)
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<InvocationResult, AgentError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.command);
        cmd.args(self.args(&request.prompt))
            .current_dir(&request.working_dir)
            .stdin(if self.prompt_via_stdin() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(
            agent = %self.command,
            dir = %request.working_dir.display(),
            "spawning agent"
        );

        let mut child = cmd.spawn().map_err(|e| AgentError::Spawn {
            command: self.command.clone(),
            source: e,
        })?;

        if self.prompt_via_stdin()
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(|e| AgentError::Io {
                    command: self.command.clone(),
                    source: e,
                })?;
            stdin.shutdown().await.map_err(|e| AgentError::Io {
                command: self.command.clone(),
                source: e,
            })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AgentError::Io {
                command: self.command.clone(),
                source: e,
            })?;

        let result = InvocationResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        };

        tracing::debug!(
            agent = %self.command,
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "agent finished"
        );

        Ok(result)
    }
}
