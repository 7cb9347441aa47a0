//! Durable, resumable persistence of orchestration runs.
//!
//! One JSON document per run under the runs directory, keyed by run id.
//! Every write goes through temp-file + fsync + rename, so a crash
//! mid-write never corrupts the previous document.

use crate::errors::StoreError;
use crate::orchestrator::state::OrchestrationRun;
use crate::util::atomic_write;
use std::path::{Path, PathBuf};

/// File-backed store of [`OrchestrationRun`] documents.
#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(runs_dir: PathBuf) -> Self {
        Self { runs_dir }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Path of a run's document.
    pub fn path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{run_id}.json"))
    }

    /// Persist a run atomically.
    pub fn save(&self, run: &OrchestrationRun) -> Result<(), StoreError> {
        let path = self.path(&run.run_id);
        let json = serde_json::to_string_pretty(run).map_err(|e| StoreError::Parse {
            path: path.clone(),
            source: e,
        })?;
        atomic_write(&path, &json).map_err(|e| StoreError::Write { path, source: e })
    }

    /// Load a run by id.
    pub fn load(&self, run_id: &str) -> Result<OrchestrationRun, StoreError> {
        let path = self.path(run_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::RunNotFound(run_id.to_string()));
            }
            Err(e) => return Err(StoreError::Read { path, source: e }),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Parse { path, source: e })
    }

    /// Ids of all persisted runs, newest file first.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.runs_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.runs_dir.clone(),
                    source: e,
                });
            }
        };

        let mut runs: Vec<(std::time::SystemTime, String)> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let id = name.strip_suffix(".json")?.to_string();
                // Skip in-progress temp files from atomic writes.
                if id.starts_with('.') {
                    return None;
                }
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, id))
            })
            .collect();

        runs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(runs.into_iter().map(|(_, id)| id).collect())
    }
}
