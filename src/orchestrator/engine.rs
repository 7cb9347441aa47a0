//! The execution state machine and retry controller.
//!
//! Drives each ready work package through
//! `Planned/Rework → Doing → ForReview → Review → {Done | Rework}`,
//! bounded by `max_review_cycles`, and persists the run after every
//! transition. Per-WP failures are recorded in the execution's
//! `last_error` and the run continues; only cyclic dependencies,
//! persistence failures, and task-store read failures abort the run.
//!
//! All state transitions for a single work package happen under that
//! package's resource lock, so concurrent processes operating on the
//! same run observe a total order per WP.

use crate::agent::{AgentRequest, AgentRunner};
use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::graph::{GraphBuilder, WpGraph, check_dependency_status, ready_wps};
use crate::lock::ResourceLock;
use crate::orchestrator::state::{OrchestrationRun, WpStatus};
use crate::orchestrator::store::RunStore;
use crate::review::{ReviewDisposition, parse_review_outcome};
use crate::tasks::{HistoryEntry, Lane, TaskStore, WorkPackage};
use crate::ui::RunUi;
use crate::util::truncate;
use crate::vcs::Git;
use crate::workspace::WorkspaceManager;
use std::sync::Arc;

/// Actor recorded in task history entries written by the engine.
const ACTOR: &str = "foreman";

/// Orchestrates a feature's work packages end to end.
pub struct Orchestrator {
    config: Config,
    tasks: Arc<dyn TaskStore>,
    agent: Arc<dyn AgentRunner>,
    workspaces: WorkspaceManager,
    runs: RunStore,
    ui: Option<Arc<RunUi>>,
}

impl Orchestrator {
    /// Build an orchestrator over the repository containing
    /// `config.project_dir`.
    pub async fn new(
        config: Config,
        tasks: Arc<dyn TaskStore>,
        agent: Arc<dyn AgentRunner>,
    ) -> Result<Self, OrchestratorError> {
        let git = Git::open(&config.project_dir)
            .await
            .map_err(|e| OrchestratorError::Other(e.into()))?;

        let workspaces = WorkspaceManager::new(
            git,
            config.lock_dir.clone(),
            config.worktrees_dir.clone(),
            config.lock_timeout,
            config.stale_threshold_minutes,
        );
        let runs = RunStore::new(config.runs_dir.clone());

        Ok(Self {
            config,
            tasks,
            agent,
            workspaces,
            runs,
            ui: None,
        })
    }

    pub fn with_ui(mut self, ui: Arc<RunUi>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn run_store(&self) -> &RunStore {
        &self.runs
    }

    /// Branch the feature's work is destined for: configured, or the
    /// repository default.
    pub async fn target_branch(&self) -> Result<String, OrchestratorError> {
        if let Some(branch) = &self.config.target_branch {
            return Ok(branch.clone());
        }
        self.workspaces
            .git()
            .default_branch()
            .await
            .map_err(|e| OrchestratorError::Other(e.into()))
    }

    /// Start a fresh orchestration run for a feature and drive it until
    /// no work package is ready.
    pub async fn run_feature(
        &self,
        feature_slug: &str,
    ) -> Result<OrchestrationRun, OrchestratorError> {
        let wps = self.tasks.wps_for_feature(feature_slug)?;
        let graph = GraphBuilder::new(wps.clone()).build()?;

        let run = OrchestrationRun::new(feature_slug, &wps);
        self.runs.save(&run)?;
        tracing::info!(run_id = %run.run_id, feature = %feature_slug, wps = wps.len(), "run started");

        self.drive(&graph, run).await
    }

    /// Resume a persisted run. Work packages that were mid-processing are
    /// reset to Planned and re-invoked; terminal and Rework states are
    /// preserved.
    pub async fn resume(&self, run_id: &str) -> Result<OrchestrationRun, OrchestratorError> {
        let mut run = self.runs.load(run_id)?;

        let wps = self.tasks.wps_for_feature(&run.feature_slug)?;
        run.reconcile(&wps);
        let reset = run.reset_in_flight();
        if !reset.is_empty() {
            tracing::info!(run_id = %run_id, reset = ?reset, "reset in-flight work packages");
        }
        self.runs.save(&run)?;

        let graph = GraphBuilder::new(wps).build()?;
        self.drive(&graph, run).await
    }

    async fn drive(
        &self,
        graph: &WpGraph,
        mut run: OrchestrationRun,
    ) -> Result<OrchestrationRun, OrchestratorError> {
        loop {
            let ready = ready_wps(graph, &run);
            let Some(wp_id) = ready.first().cloned() else {
                break;
            };
            self.process_wp(graph, &mut run, &wp_id).await?;
        }

        tracing::info!(
            run_id = %run.run_id,
            done = run.done_count(),
            failed = run.failed_count(),
            complete = run.is_complete(),
            "run finished"
        );
        if let Some(ui) = &self.ui {
            ui.finish(run.done_count(), run.failed_count());
        }

        Ok(run)
    }

    /// Process a single ready work package through one full
    /// implement-review cycle, holding its resource lock throughout.
    async fn process_wp(
        &self,
        graph: &WpGraph,
        run: &mut OrchestrationRun,
        wp_id: &str,
    ) -> Result<(), OrchestratorError> {
        let wp = graph
            .get(wp_id)
            .expect("ready set only contains known work packages")
            .clone();

        if let Some(ui) = &self.ui {
            ui.start_wp(wp_id, &wp.title);
        }

        let lock = match ResourceLock::for_work_package(
            &self.config.lock_dir,
            wp_id,
            self.config.lock_timeout,
        )
        .and_then(|l| l.acquire())
        {
            Ok(guard) => guard,
            Err(e) => {
                // Another process owns this WP (or the lock dir is broken);
                // record and move on rather than stalling the run.
                self.fail_wp(run, wp_id, &e.to_string())?;
                return Ok(());
            }
        };
        let _lock = lock;

        // Planned/Rework -> Doing
        let feedback = run
            .work_packages
            .get(wp_id)
            .and_then(|e| e.review_feedback.clone());
        self.transition(run, wp_id, WpStatus::Doing, Some(Lane::Doing), "implementation started")?;

        // Workspace (merge coordinator inside, for multi-parent deps).
        let target_branch = self.target_branch().await?;
        let status =
            check_dependency_status(self.tasks.as_ref(), &run.feature_slug, wp_id, &wp.dependencies);
        if let Some(ui) = &self.ui {
            ui.step(&format!("{wp_id}: preparing workspace"));
        }
        let workspace = match self
            .workspaces
            .ensure_workspace(&run.feature_slug, wp_id, &status, &target_branch)
            .await
        {
            Ok(ws) => ws,
            Err(e) => {
                self.fail_wp(run, wp_id, &format!("Workspace creation failed: {e}"))?;
                return Ok(());
            }
        };

        // Implementation agent.
        if let Some(ui) = &self.ui {
            ui.step(&format!("{wp_id}: running implementation agent"));
        }
        let prompt = implementation_prompt(&wp, feedback.as_deref());
        let implementation = match self
            .agent
            .invoke(&AgentRequest {
                prompt,
                working_dir: workspace.path.clone(),
            })
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.fail_wp(run, wp_id, &format!("Implementation agent failed: {e}"))?;
                return Ok(());
            }
        };
        if !implementation.success() {
            let detail = truncate(implementation.stderr.trim(), 500);
            self.fail_wp(
                run,
                wp_id,
                &format!(
                    "Implementation agent exited with code {}: {detail}",
                    implementation.exit_code
                ),
            )?;
            return Ok(());
        }

        // Doing -> ForReview
        self.transition(
            run,
            wp_id,
            WpStatus::ForReview,
            Some(Lane::ForReview),
            "implementation complete",
        )?;

        // Review agent.
        if let Some(ui) = &self.ui {
            ui.step(&format!("{wp_id}: running review agent"));
        }
        self.transition(run, wp_id, WpStatus::Review, None, "review started")?;
        let review = match self
            .agent
            .invoke(&AgentRequest {
                prompt: review_prompt(&wp),
                working_dir: workspace.path.clone(),
            })
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.fail_wp(run, wp_id, &format!("Review agent failed: {e}"))?;
                return Ok(());
            }
        };

        let outcome = parse_review_outcome(&review.stdout, review.exit_code);
        match outcome.outcome {
            ReviewDisposition::Approved => {
                self.transition(run, wp_id, WpStatus::Done, Some(Lane::Done), "review approved")?;
                if let Some(ui) = &self.ui {
                    ui.wp_done(wp_id);
                }
            }
            ReviewDisposition::Rejected => {
                self.reject_wp(run, wp_id, outcome.feedback)?;
            }
            ReviewDisposition::Error => {
                self.fail_wp(
                    run,
                    wp_id,
                    &format!("Review agent error (exit code {})", review.exit_code),
                )?;
            }
        }

        Ok(())
    }

    /// Record a rejection: either re-enter Rework with feedback, or fail
    /// the work package once the review-cycle bound is reached.
    fn reject_wp(
        &self,
        run: &mut OrchestrationRun,
        wp_id: &str,
        feedback: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let max = self.config.max_review_cycles;
        let retries = run
            .work_packages
            .get(wp_id)
            .map(|e| e.implementation_retries)
            .unwrap_or(0);
        let next = retries + 1;

        if next >= max {
            self.fail_wp(run, wp_id, &format!("Exceeded max review cycles ({max})"))?;
            return Ok(());
        }

        if let Some(exec) = run.work_packages.get_mut(wp_id) {
            exec.status = WpStatus::Rework;
            exec.implementation_retries = next;
            exec.review_feedback = feedback;
        }
        // The work resumes, so the lane goes back to doing.
        self.tasks.set_lane(&run.feature_slug, wp_id, Lane::Doing)?;
        self.tasks.append_history(
            &run.feature_slug,
            wp_id,
            HistoryEntry::now(
                Lane::Doing,
                ACTOR,
                Some(format!("review rejected (cycle {next})")),
            ),
        )?;
        self.runs.save(run)?;

        tracing::info!(wp_id = %wp_id, cycle = next, "work package sent back for rework");
        if let Some(ui) = &self.ui {
            ui.wp_rework(wp_id, next);
        }
        Ok(())
    }

    /// Terminal failure for one work package; the run continues.
    fn fail_wp(
        &self,
        run: &mut OrchestrationRun,
        wp_id: &str,
        error: &str,
    ) -> Result<(), OrchestratorError> {
        if let Some(exec) = run.work_packages.get_mut(wp_id) {
            exec.status = WpStatus::Failed;
            exec.last_error = Some(error.to_string());
        }
        self.runs.save(run)?;

        tracing::error!(wp_id = %wp_id, error = %error, "work package failed");
        if let Some(ui) = &self.ui {
            ui.wp_failed(wp_id, error);
        }
        Ok(())
    }

    /// Apply one status transition, propagate the lane to the task store
    /// when it changes, and persist the run before anything else runs.
    fn transition(
        &self,
        run: &mut OrchestrationRun,
        wp_id: &str,
        status: WpStatus,
        lane: Option<Lane>,
        note: &str,
    ) -> Result<(), OrchestratorError> {
        if let Some(exec) = run.work_packages.get_mut(wp_id) {
            exec.status = status;
        }
        if let Some(lane) = lane {
            self.tasks.set_lane(&run.feature_slug, wp_id, lane)?;
            self.tasks.append_history(
                &run.feature_slug,
                wp_id,
                HistoryEntry::now(lane, ACTOR, Some(note.to_string())),
            )?;
        }
        self.runs.save(run)?;
        tracing::debug!(wp_id = %wp_id, status = %status, "transition");
        Ok(())
    }
}

/// Prompt for the implementation agent. Rework cycles carry the
/// reviewer's feedback verbatim.
fn implementation_prompt(wp: &WorkPackage, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "You are implementing work package {id}: {title}.\n\
         The task description lives in the feature's tasks directory; read it, implement the work in this workspace, and commit your changes.\n",
        id = wp.id,
        title = wp.title,
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nA previous review rejected this implementation. Address this feedback:\n{feedback}\n"
        ));
    }
    prompt
}

/// Prompt for the review agent. The closing markers are what
/// `parse_review_outcome` looks for.
fn review_prompt(wp: &WorkPackage) -> String {
    format!(
        "Review the implementation of work package {id}: {title} in this workspace.\n\
         Check correctness, tests, and the task's acceptance criteria.\n\
         If everything looks good, output: \"APPROVED - review complete\"\n\
         If there are issues, output: \"REJECTED - <describe the issues>\"\n",
        id = wp.id,
        title = wp.title,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Lane;

    fn wp(id: &str) -> WorkPackage {
        WorkPackage {
            id: id.to_string(),
            title: format!("Component {id}"),
            lane: Some(Lane::Planned),
            dependencies: vec![],
            history: vec![],
        }
    }

    #[test]
    fn test_implementation_prompt_includes_feedback_on_rework() {
        let prompt = implementation_prompt(&wp("WP01"), Some("Missing error handling"));
        assert!(prompt.contains("WP01"));
        assert!(prompt.contains("Missing error handling"));

        let fresh = implementation_prompt(&wp("WP01"), None);
        assert!(!fresh.contains("previous review"));
    }

    #[test]
    fn test_review_prompt_carries_parseable_markers() {
        let prompt = review_prompt(&wp("WP02"));
        assert!(prompt.contains("APPROVED"));
        assert!(prompt.contains("REJECTED"));
        assert!(prompt.contains("WP02"));
    }
}
