//! File-backed task store.
//!
//! Work package records live at `{specs_dir}/{feature_slug}/tasks/*.md`:
//! markdown files with a YAML front matter block carrying the structured
//! fields (`work_package_id`, `title`, `lane`, `dependencies`, `history`).
//! Writes rewrite only the front matter and preserve the body verbatim.

use crate::errors::TaskError;
use crate::tasks::{HistoryEntry, Lane, TaskStore, WorkPackage};
use crate::util::atomic_write;
use glob::glob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Front matter as stored on disk. The lane is kept as a free string so
/// a record with an unrecognized lane reads as lane-unknown instead of
/// failing the whole feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WpFrontMatter {
    work_package_id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lane: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<HistoryEntry>,
}

impl WpFrontMatter {
    fn to_work_package(&self) -> WorkPackage {
        WorkPackage {
            id: self.work_package_id.clone(),
            title: self.title.clone(),
            lane: self.lane.as_deref().and_then(|s| s.parse::<Lane>().ok()),
            dependencies: self.dependencies.clone(),
            history: self.history.clone(),
        }
    }
}

/// Task store over a specs directory tree.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    specs_dir: PathBuf,
}

impl FileTaskStore {
    pub fn new(specs_dir: PathBuf) -> Self {
        Self { specs_dir }
    }

    /// Directory holding a feature's task files.
    pub fn tasks_dir(&self, feature_slug: &str) -> PathBuf {
        self.specs_dir.join(feature_slug).join("tasks")
    }

    fn task_files(&self, feature_slug: &str) -> Vec<PathBuf> {
        let pattern = self
            .tasks_dir(feature_slug)
            .join("*.md")
            .to_string_lossy()
            .to_string();

        let mut files: Vec<PathBuf> = glob(&pattern)
            .map(|entries| entries.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    fn read_record(&self, path: &Path) -> Result<Option<(WpFrontMatter, String)>, TaskError> {
        let content = std::fs::read_to_string(path).map_err(|e| TaskError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let Some((yaml, body)) = split_front_matter(&content) else {
            // Not a record (e.g. a README dropped into tasks/).
            tracing::warn!(path = %path.display(), "skipping task file without front matter");
            return Ok(None);
        };

        let front: WpFrontMatter =
            serde_yaml::from_str(yaml).map_err(|e| TaskError::FrontMatter {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(Some((front, body.to_string())))
    }

    fn find_record(
        &self,
        feature_slug: &str,
        wp_id: &str,
    ) -> Result<(PathBuf, WpFrontMatter, String), TaskError> {
        for path in self.task_files(feature_slug) {
            if let Some((front, body)) = self.read_record(&path)? {
                if front.work_package_id == wp_id {
                    return Ok((path, front, body));
                }
            }
        }
        Err(TaskError::WpNotFound {
            feature: feature_slug.to_string(),
            wp_id: wp_id.to_string(),
        })
    }

    fn write_record(
        &self,
        path: &Path,
        front: &WpFrontMatter,
        body: &str,
    ) -> Result<(), TaskError> {
        let yaml = serde_yaml::to_string(front).map_err(|e| TaskError::FrontMatter {
            path: path.to_path_buf(),
            source: e,
        })?;
        let content = format!("---\n{yaml}---\n{body}");
        atomic_write(path, &content).map_err(|e| TaskError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl TaskStore for FileTaskStore {
    fn wps_for_feature(&self, feature_slug: &str) -> Result<Vec<WorkPackage>, TaskError> {
        let mut wps = Vec::new();
        for path in self.task_files(feature_slug) {
            if let Some((front, _)) = self.read_record(&path)? {
                wps.push(front.to_work_package());
            }
        }
        wps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(wps)
    }

    fn wp(&self, feature_slug: &str, wp_id: &str) -> Result<WorkPackage, TaskError> {
        let (_, front, _) = self.find_record(feature_slug, wp_id)?;
        Ok(front.to_work_package())
    }

    fn set_lane(&self, feature_slug: &str, wp_id: &str, lane: Lane) -> Result<(), TaskError> {
        let (path, mut front, body) = self.find_record(feature_slug, wp_id)?;
        front.lane = Some(lane.as_str().to_string());
        self.write_record(&path, &front, &body)
    }

    fn append_history(
        &self,
        feature_slug: &str,
        wp_id: &str,
        entry: HistoryEntry,
    ) -> Result<(), TaskError> {
        let (path, mut front, body) = self.find_record(feature_slug, wp_id)?;
        front.history.push(entry);
        self.write_record(&path, &front, &body)
    }
}

/// Split a task file into its YAML front matter and markdown body.
///
/// Returns `None` when the file does not start with a `---` delimiter or
/// the closing delimiter is missing.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    for (idx, _) in rest.match_indices("\n---") {
        let after = &rest[idx + 4..];
        if after.is_empty() {
            return Some((&rest[..idx + 1], ""));
        }
        if let Some(body) = after.strip_prefix("\r\n").or_else(|| after.strip_prefix('\n')) {
            return Some((&rest[..idx + 1], body));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wp(dir: &Path, feature: &str, file: &str, content: &str) -> PathBuf {
        let tasks = dir.join(feature).join("tasks");
        std::fs::create_dir_all(&tasks).unwrap();
        let path = tasks.join(file);
        std::fs::write(&path, content).unwrap();
        path
    }

    const WP01: &str = "---\n\
work_package_id: WP01\n\
title: Event Infrastructure\n\
lane: done\n\
dependencies: []\n\
---\n\
# WP01\n\nBuild the event bus.\n";

    const WP02: &str = "---\n\
work_package_id: WP02\n\
title: Event Logger\n\
lane: planned\n\
dependencies: [WP01]\n\
---\n\
# WP02\n";

    #[test]
    fn test_split_front_matter() {
        let (yaml, body) = split_front_matter(WP01).unwrap();
        assert!(yaml.contains("work_package_id: WP01"));
        assert!(body.starts_with("# WP01"));
    }

    #[test]
    fn test_split_front_matter_missing_delimiter() {
        assert!(split_front_matter("# just markdown\n").is_none());
        assert!(split_front_matter("---\nunterminated: yes\n").is_none());
    }

    #[test]
    fn test_wps_for_feature_sorted_by_id() {
        let dir = tempdir().unwrap();
        write_wp(dir.path(), "025-events", "WP02-logger.md", WP02);
        write_wp(dir.path(), "025-events", "WP01-infra.md", WP01);

        let store = FileTaskStore::new(dir.path().to_path_buf());
        let wps = store.wps_for_feature("025-events").unwrap();

        assert_eq!(wps.len(), 2);
        assert_eq!(wps[0].id, "WP01");
        assert_eq!(wps[0].lane, Some(Lane::Done));
        assert_eq!(wps[1].id, "WP02");
        assert_eq!(wps[1].dependencies, vec!["WP01".to_string()]);
    }

    #[test]
    fn test_wp_not_found() {
        let dir = tempdir().unwrap();
        write_wp(dir.path(), "025-events", "WP01-infra.md", WP01);

        let store = FileTaskStore::new(dir.path().to_path_buf());
        let result = store.wp("025-events", "WP99");
        assert!(matches!(result, Err(TaskError::WpNotFound { .. })));
    }

    #[test]
    fn test_missing_lane_reads_as_none() {
        let dir = tempdir().unwrap();
        write_wp(
            dir.path(),
            "025-events",
            "WP03-no-lane.md",
            "---\nwork_package_id: WP03\ntitle: No Lane\ndependencies: []\n---\nbody\n",
        );

        let store = FileTaskStore::new(dir.path().to_path_buf());
        let wp = store.wp("025-events", "WP03").unwrap();
        assert_eq!(wp.lane, None);
    }

    #[test]
    fn test_unrecognized_lane_reads_as_none() {
        let dir = tempdir().unwrap();
        write_wp(
            dir.path(),
            "025-events",
            "WP04-odd.md",
            "---\nwork_package_id: WP04\ntitle: Odd\nlane: wip\ndependencies: []\n---\n",
        );

        let store = FileTaskStore::new(dir.path().to_path_buf());
        let wp = store.wp("025-events", "WP04").unwrap();
        assert_eq!(wp.lane, None);
    }

    #[test]
    fn test_set_lane_preserves_body() {
        let dir = tempdir().unwrap();
        let path = write_wp(dir.path(), "025-events", "WP01-infra.md", WP01);

        let store = FileTaskStore::new(dir.path().to_path_buf());
        store.set_lane("025-events", "WP01", Lane::Doing).unwrap();

        let wp = store.wp("025-events", "WP01").unwrap();
        assert_eq!(wp.lane, Some(Lane::Doing));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Build the event bus."));
    }

    #[test]
    fn test_append_history_preserves_order() {
        let dir = tempdir().unwrap();
        write_wp(dir.path(), "025-events", "WP01-infra.md", WP01);

        let store = FileTaskStore::new(dir.path().to_path_buf());
        store
            .append_history(
                "025-events",
                "WP01",
                HistoryEntry::now(Lane::Doing, "orchestrator", Some("started".to_string())),
            )
            .unwrap();
        store
            .append_history(
                "025-events",
                "WP01",
                HistoryEntry::now(Lane::ForReview, "orchestrator", None),
            )
            .unwrap();

        let wp = store.wp("025-events", "WP01").unwrap();
        assert_eq!(wp.history.len(), 2);
        assert_eq!(wp.history[0].lane, Lane::Doing);
        assert_eq!(wp.history[0].note.as_deref(), Some("started"));
        assert_eq!(wp.history[1].lane, Lane::ForReview);
    }

    #[test]
    fn test_non_record_files_skipped() {
        let dir = tempdir().unwrap();
        write_wp(dir.path(), "025-events", "WP01-infra.md", WP01);
        write_wp(dir.path(), "025-events", "README.md", "# notes, not a record\n");

        let store = FileTaskStore::new(dir.path().to_path_buf());
        let wps = store.wps_for_feature("025-events").unwrap();
        assert_eq!(wps.len(), 1);
    }

    #[test]
    fn test_empty_feature_dir() {
        let dir = tempdir().unwrap();
        let store = FileTaskStore::new(dir.path().to_path_buf());
        assert!(store.wps_for_feature("missing").unwrap().is_empty());
    }
}
