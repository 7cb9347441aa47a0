//! Cross-process resource locks.
//!
//! Mutual exclusion over named resources (a work package, a feature, a
//! config file) shared by every process touching the project: CLI
//! invocations, the orchestration engine, and anything else operating on
//! the same filesystem. The protocol is deliberately minimal: one lock
//! file per resource id in a configured lock directory; the file's
//! existence plus its mtime is the entire contract. A lock file older
//! than twice the configured timeout is presumed abandoned by a crashed
//! holder and purged before the next acquisition attempt.
//!
//! Locks on distinct resource ids use distinct files and never contend.

use crate::errors::LockError;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default time to wait for acquisition: 5 minutes.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A pessimistic lock on a named project resource.
///
/// Construct via [`ResourceLock::for_resource`] or one of the scoped
/// constructors, then call [`ResourceLock::acquire`]. The returned
/// [`LockGuard`] releases the lock on drop, on every exit path.
#[derive(Debug, Clone)]
pub struct ResourceLock {
    resource_id: String,
    lock_file: PathBuf,
    timeout: Duration,
}

impl ResourceLock {
    /// Create a lock over an explicit lock-file path.
    ///
    /// Fails with `LockError::InvalidTimeout` unless `timeout` is positive.
    pub fn new(
        resource_id: impl Into<String>,
        lock_file: PathBuf,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        if timeout.is_zero() {
            return Err(LockError::InvalidTimeout);
        }
        Ok(Self {
            resource_id: resource_id.into(),
            lock_file,
            timeout,
        })
    }

    /// Create a lock for a resource id, with the lock file named
    /// `.lock-{resource_id}` inside `lock_dir`.
    pub fn for_resource(
        lock_dir: &Path,
        resource_id: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let lock_file = lock_dir.join(format!(".lock-{resource_id}"));
        Self::new(resource_id, lock_file, timeout)
    }

    /// Lock scoped to a single work package (`WP-{wp_id}`).
    pub fn for_work_package(
        lock_dir: &Path,
        wp_id: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        Self::for_resource(lock_dir, &format!("WP-{wp_id}"), timeout)
    }

    /// Lock scoped to an entire feature (`feature-{slug}`). Serializes
    /// worktree-metadata mutation across processes.
    pub fn for_feature(
        lock_dir: &Path,
        feature_slug: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        Self::for_resource(lock_dir, &format!("feature-{feature_slug}"), timeout)
    }

    /// Lock scoped to a configuration file (`config-{name}`).
    pub fn for_config_file(
        lock_dir: &Path,
        config_name: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        Self::for_resource(lock_dir, &format!("config-{config_name}"), timeout)
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Remove the lock file if it is stale (mtime older than 2x timeout).
    ///
    /// Returns `true` if a stale lock was purged.
    pub fn release_if_stale(&self) -> Result<bool, LockError> {
        let metadata = match fs::metadata(&self.lock_file) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(LockError::Io {
                    path: self.lock_file.clone(),
                    source: e,
                });
            }
        };

        let age = metadata.modified().ok().and_then(|m| m.elapsed().ok());
        let Some(age) = age else {
            return Ok(false);
        };

        if age <= self.timeout * 2 {
            return Ok(false);
        }

        match fs::remove_file(&self.lock_file) {
            Ok(()) => {
                tracing::warn!(
                    resource = %self.resource_id,
                    age_secs = age.as_secs(),
                    threshold_secs = (self.timeout * 2).as_secs(),
                    "removed stale lock"
                );
                Ok(true)
            }
            // Another process purged it between the stat and the unlink.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::Io {
                path: self.lock_file.clone(),
                source: e,
            }),
        }
    }

    /// Acquire the lock, blocking up to the configured timeout.
    ///
    /// Stale locks are purged before the first attempt. Acquisition is an
    /// atomic create-new of the lock file, retried at a short interval.
    /// On timeout, fails with `LockError::Timeout` naming the resource.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        self.release_if_stale()?;

        if let Some(parent) = self.lock_file.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_file)
            {
                Ok(mut file) => {
                    let owner_pid = std::process::id();
                    let acquired_at = Utc::now();
                    // Content is informational only; existence + mtime is
                    // the protocol.
                    let _ = writeln!(file, "pid={owner_pid} acquired_at={acquired_at}");

                    tracing::debug!(
                        resource = %self.resource_id,
                        pid = owner_pid,
                        timeout_secs = self.timeout.as_secs(),
                        "lock acquired"
                    );

                    return Ok(LockGuard {
                        resource_id: self.resource_id.clone(),
                        lock_file: self.lock_file.clone(),
                        acquired_at,
                        owner_pid,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout {
                            resource_id: self.resource_id.clone(),
                            timeout_secs: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(self.timeout));
                }
                Err(e) => {
                    return Err(LockError::Io {
                        path: self.lock_file.clone(),
                        source: e,
                    });
                }
            }
        }
    }
}

/// Held lock. Removes the lock file when dropped.
#[derive(Debug)]
pub struct LockGuard {
    resource_id: String,
    lock_file: PathBuf,
    acquired_at: DateTime<Utc>,
    owner_pid: u32,
}

impl LockGuard {
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn owner_pid(&self) -> u32 {
        self.owner_pid
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    resource = %self.resource_id,
                    error = %e,
                    "failed to remove lock file on release"
                );
            }
        } else {
            tracing::debug!(resource = %self.resource_id, "lock released");
        }
    }
}
