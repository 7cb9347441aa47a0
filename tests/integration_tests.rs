//! Integration tests for Foreman
//!
//! End-to-end coverage: the CLI binary against real git repositories, and
//! the orchestration engine driven by scripted agents.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use async_trait::async_trait;
use predicates::prelude::*;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use foreman::agent::{AgentKind, AgentRequest, AgentRunner, InvocationResult};
use foreman::config::Config;
use foreman::errors::AgentError;
use foreman::orchestrator::{Orchestrator, WpStatus};
use foreman::tasks::{FileTaskStore, Lane, TaskStore};

/// Helper to create a foreman Command
fn foreman_cmd() -> Command {
    cargo_bin_cmd!("foreman")
}

/// Create a git repository with an initial commit on `main`.
fn init_repo(dir: &Path) {
    let run = |args: &[&str]| {
        let out = std::process::Command::new(args[0])
            .args(&args[1..])
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(out.status.success(), "command failed: {args:?}");
    };
    run(&["git", "init", "-b", "main"]);
    run(&["git", "config", "user.email", "test@example.com"]);
    run(&["git", "config", "user.name", "Test User"]);
    std::fs::write(dir.join("README.md"), "# Test Repo\n").unwrap();
    run(&["git", "add", "."]);
    run(&["git", "commit", "-m", "Initial commit"]);
}

/// Write a work package record under `specs/{feature}/tasks/`.
fn write_wp(root: &Path, feature: &str, id: &str, lane: &str, deps: &[&str]) {
    let tasks = root.join("specs").join(feature).join("tasks");
    std::fs::create_dir_all(&tasks).unwrap();
    let deps_yaml = if deps.is_empty() {
        "[]".to_string()
    } else {
        format!("[{}]", deps.join(", "))
    };
    let content = format!(
        "---\nwork_package_id: {id}\ntitle: Component {id}\nlane: {lane}\ndependencies: {deps_yaml}\n---\n# {id}\n"
    );
    std::fs::write(tasks.join(format!("{id}-component.md")), content).unwrap();
}

fn test_config(root: &Path, max_review_cycles: u32) -> Config {
    Config {
        project_dir: root.to_path_buf(),
        specs_dir: root.join("specs"),
        lock_dir: root.join(".foreman").join("locks"),
        runs_dir: root.join(".foreman").join("runs"),
        worktrees_dir: root.join(".worktrees"),
        target_branch: Some("main".to_string()),
        max_review_cycles,
        lock_timeout: Duration::from_secs(5),
        stale_threshold_minutes: 10,
        agent_kind: AgentKind::Claude,
        agent_command: None,
        verbose: false,
    }
}

/// Agent double: implementations always succeed; review verdicts are
/// popped from a script, defaulting to approval once the script runs dry.
struct ScriptedAgent {
    reviews: Mutex<VecDeque<(i32, String)>>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    fn approving() -> Arc<Self> {
        Self::with_reviews(vec![])
    }

    fn with_reviews(reviews: Vec<(i32, &str)>) -> Arc<Self> {
        Arc::new(Self {
            reviews: Mutex::new(
                reviews
                    .into_iter()
                    .map(|(code, out)| (code, out.to_string()))
                    .collect(),
            ),
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<InvocationResult, AgentError> {
        self.invocations
            .lock()
            .unwrap()
            .push(request.prompt.clone());

        let is_review = request.prompt.starts_with("Review the implementation");
        let (exit_code, stdout) = if is_review {
            self.reviews
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((0, "APPROVED - review complete".to_string()))
        } else {
            (0, "implementation done".to_string())
        };

        Ok(InvocationResult {
            exit_code,
            stdout,
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_foreman_help() {
        foreman_cmd().arg("--help").assert().success();
    }

    #[test]
    fn test_foreman_version() {
        foreman_cmd().arg("--version").assert().success();
    }

    #[test]
    fn test_status_lists_lanes() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "done", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        foreman_cmd()
            .current_dir(dir.path())
            .args(["--feature", "025-events", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("WP01"))
            .stdout(predicate::str::contains("WP02"))
            .stdout(predicate::str::contains("done"));
    }

    #[test]
    fn test_status_unknown_feature_without_specs() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());

        foreman_cmd()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--feature"));
    }

    #[test]
    fn test_runs_empty() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());

        foreman_cmd()
            .current_dir(dir.path())
            .arg("runs")
            .assert()
            .success()
            .stdout(predicate::str::contains("No recorded runs"));
    }
}

// =============================================================================
// Implement command
// =============================================================================

mod implement_cli {
    use super::*;

    #[test]
    fn test_implement_creates_workspace_from_main() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);

        foreman_cmd()
            .current_dir(dir.path())
            .args(["--feature", "025-events", "implement", "WP01"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Workspace ready"));

        assert!(
            dir.path()
                .join(".worktrees")
                .join("025-events-WP01")
                .join("README.md")
                .exists()
        );
    }

    #[test]
    fn test_implement_done_dependency_uses_target() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "done", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        foreman_cmd()
            .current_dir(dir.path())
            .args(["--feature", "025-events", "implement", "WP02"])
            .assert()
            .success()
            .stdout(predicate::str::contains("based on main"));
    }

    #[test]
    fn test_implement_missing_dependency_workspace_fails() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "doing", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        foreman_cmd()
            .current_dir(dir.path())
            .args(["--feature", "025-events", "implement", "WP02"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("foreman implement WP01"));
    }

    #[test]
    fn test_implement_base_must_be_a_dependency() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        foreman_cmd()
            .current_dir(dir.path())
            .args([
                "--feature",
                "025-events",
                "implement",
                "WP02",
                "--base",
                "WP99",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a dependency"));
    }

    #[test]
    fn test_implement_twice_reuses_workspace() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);

        for _ in 0..2 {
            foreman_cmd()
                .current_dir(dir.path())
                .args(["--feature", "025-events", "implement", "WP01"])
                .assert()
                .success();
        }

        foreman_cmd()
            .current_dir(dir.path())
            .arg("workspaces")
            .assert()
            .success()
            .stdout(predicate::str::contains("025-events-WP01"));
    }
}

// =============================================================================
// Orchestration engine
// =============================================================================

mod orchestration {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_dependent_wps_in_order() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let agent = ScriptedAgent::approving();

        let orchestrator = Orchestrator::new(config.clone(), tasks.clone(), agent.clone())
            .await
            .unwrap();
        let run = orchestrator.run_feature("025-events").await.unwrap();

        assert!(run.is_complete());
        assert_eq!(run.done_count(), 2);
        assert_eq!(run.failed_count(), 0);
        // Two invocations (implement + review) per work package.
        assert_eq!(agent.invocation_count(), 4);

        // Lanes propagated to the task store.
        for id in ["WP01", "WP02"] {
            let wp = tasks.wp("025-events", id).unwrap();
            assert_eq!(wp.lane, Some(Lane::Done), "{id}");
            assert!(!wp.history.is_empty());
        }

        // Both workspaces exist.
        for id in ["WP01", "WP02"] {
            assert!(
                dir.path()
                    .join(".worktrees")
                    .join(format!("025-events-{id}"))
                    .exists()
            );
        }

        // Run document persisted and loadable.
        let loaded = orchestrator.run_store().load(&run.run_id).unwrap();
        assert_eq!(loaded.work_packages["WP02"].status, WpStatus::Done);
    }

    #[tokio::test]
    async fn test_rejection_enters_rework_then_done() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let agent = ScriptedAgent::with_reviews(vec![(1, "REJECTED - missing error handling")]);

        let orchestrator = Orchestrator::new(config.clone(), tasks.clone(), agent.clone())
            .await
            .unwrap();
        let run = orchestrator.run_feature("025-events").await.unwrap();

        let exec = &run.work_packages["WP01"];
        assert_eq!(exec.status, WpStatus::Done);
        assert_eq!(exec.implementation_retries, 1);

        // The rework cycle left a history trail.
        let wp = tasks.wp("025-events", "WP01").unwrap();
        assert!(
            wp.history
                .iter()
                .any(|h| h.note.as_deref().is_some_and(|n| n.contains("rejected")))
        );

        // implement, review (reject), implement, review (approve)
        assert_eq!(agent.invocation_count(), 4);
    }

    #[tokio::test]
    async fn test_rework_feedback_reaches_next_implementation_prompt() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let agent = ScriptedAgent::with_reviews(vec![(1, "REJECTED - add input validation")]);

        let orchestrator = Orchestrator::new(config.clone(), tasks, agent.clone())
            .await
            .unwrap();
        orchestrator.run_feature("025-events").await.unwrap();

        let prompts = agent.invocations.lock().unwrap();
        let second_impl = prompts
            .iter()
            .filter(|p| !p.starts_with("Review the implementation"))
            .nth(1)
            .expect("second implementation prompt");
        assert!(second_impl.contains("add input validation"));
    }

    #[tokio::test]
    async fn test_max_review_cycles_fails_wp_and_run_continues() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &[]);

        let config = test_config(dir.path(), 2);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        // WP01 is rejected until the cap; WP02's reviews approve by
        // default once the script is exhausted.
        let agent = ScriptedAgent::with_reviews(vec![
            (1, "REJECTED - still wrong"),
            (1, "REJECTED - still wrong"),
        ]);

        let orchestrator = Orchestrator::new(config.clone(), tasks, agent.clone())
            .await
            .unwrap();
        let run = orchestrator.run_feature("025-events").await.unwrap();

        let failed = &run.work_packages["WP01"];
        assert_eq!(failed.status, WpStatus::Failed);
        assert!(
            failed
                .last_error
                .as_deref()
                .unwrap()
                .contains("Exceeded max review cycles (2)")
        );

        // The other work package still completed.
        assert_eq!(run.work_packages["WP02"].status, WpStatus::Done);
        assert!(run.is_complete());
    }

    #[tokio::test]
    async fn test_review_error_fails_wp_not_rejected() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        // Non-zero exit with no marker: an error, never a rejection.
        let agent = ScriptedAgent::with_reviews(vec![(1, "something crashed")]);

        let orchestrator = Orchestrator::new(config.clone(), tasks, agent)
            .await
            .unwrap();
        let run = orchestrator.run_feature("025-events").await.unwrap();

        let exec = &run.work_packages["WP01"];
        assert_eq!(exec.status, WpStatus::Failed);
        assert_eq!(exec.implementation_retries, 0);
        assert!(
            exec.last_error
                .as_deref()
                .unwrap()
                .contains("Review agent error")
        );
    }

    #[tokio::test]
    async fn test_done_lane_skips_execution() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "done", &[]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let agent = ScriptedAgent::approving();

        let orchestrator = Orchestrator::new(config.clone(), tasks, agent.clone())
            .await
            .unwrap();
        let run = orchestrator.run_feature("025-events").await.unwrap();

        assert!(run.is_complete());
        // Only WP02 was processed.
        assert_eq!(agent.invocation_count(), 2);
        assert_eq!(run.work_packages["WP01"].status, WpStatus::Done);
    }

    #[tokio::test]
    async fn test_cycle_detection_aborts_run() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &["WP02"]);
        write_wp(dir.path(), "025-events", "WP02", "planned", &["WP01"]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let agent = ScriptedAgent::approving();

        let orchestrator = Orchestrator::new(config.clone(), tasks, agent.clone())
            .await
            .unwrap();
        let result = orchestrator.run_feature("025-events").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Cycle detected"));
        // Nothing was invoked.
        assert_eq!(agent.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_resets_in_flight_and_finishes() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        write_wp(dir.path(), "025-events", "WP01", "planned", &[]);

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let agent = ScriptedAgent::approving();

        let orchestrator = Orchestrator::new(config.clone(), tasks, agent.clone())
            .await
            .unwrap();

        // Simulate a crash: a persisted run with WP01 mid-implementation.
        let mut run =
            foreman::orchestrator::OrchestrationRun::empty("run-crashed", "025-events");
        let mut exec = foreman::orchestrator::WpExecution::new("WP01");
        exec.status = WpStatus::Doing;
        run.work_packages.insert("WP01".to_string(), exec);
        orchestrator.run_store().save(&run).unwrap();

        let resumed = orchestrator.resume("run-crashed").await.unwrap();

        assert!(resumed.is_complete());
        assert_eq!(resumed.work_packages["WP01"].status, WpStatus::Done);
        assert_eq!(agent.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_resume_unknown_run_fails() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());

        let config = test_config(dir.path(), 5);
        config.ensure_directories().unwrap();
        let tasks = Arc::new(FileTaskStore::new(config.specs_dir.clone()));
        let orchestrator = Orchestrator::new(config.clone(), tasks, ScriptedAgent::approving())
            .await
            .unwrap();

        let result = orchestrator.resume("run-absent").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("run-absent"));
    }
}
