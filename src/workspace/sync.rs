//! Repository synchronization.
//!
//! Before a non-git command runs, the workspace must hold an up-to-date
//! checkout of the requested remote. The state machine is evaluated on
//! every invocation:
//!
//! - `Absent` (no `.git`) → wipe leftovers, clone fresh
//! - `Clean` (empty porcelain status) → fetch + hard reset to the remote
//!   default branch
//! - `Dirty` (uncommitted changes) → no-op; in-flight edits made through
//!   the editor are never clobbered
//!
//! Git subcommands issued by the user bypass synchronization entirely;
//! the executor enforces that.

use std::path::Path;

use git2::{Repository, StatusOptions};
use tokio::process::Command;

use crate::errors::SyncError;

/// Observed state of a workspace checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Absent,
    Clean,
    Dirty,
}

/// Action taken by [`Synchronizer::synchronize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Updated,
    SkippedDirty,
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    default_branch: String,
}

impl Synchronizer {
    pub fn new(default_branch: impl Into<String>) -> Self {
        Self {
            default_branch: default_branch.into(),
        }
    }

    /// Classify the checkout at `dir`.
    pub fn detect_state(dir: &Path) -> Result<RepoState, SyncError> {
        if !dir.join(".git").exists() {
            return Ok(RepoState::Absent);
        }
        let repo = Repository::open(dir)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        if statuses.is_empty() {
            Ok(RepoState::Clean)
        } else {
            Ok(RepoState::Dirty)
        }
    }

    /// Ensure `dir` holds a checkout of `remote_url`, per the state machine
    /// above. A failed fetch or reset surfaces as `SyncError` and leaves
    /// the previous checkout intact.
    pub async fn synchronize(&self, dir: &Path, remote_url: &str) -> Result<SyncOutcome, SyncError> {
        match Self::detect_state(dir)? {
            RepoState::Absent => {
                self.clone_fresh(dir, remote_url).await?;
                Ok(SyncOutcome::Cloned)
            }
            RepoState::Clean => {
                self.fetch_and_reset(dir).await?;
                Ok(SyncOutcome::Updated)
            }
            RepoState::Dirty => {
                tracing::info!(
                    workspace = %dir.display(),
                    "workspace has uncommitted changes, skipping sync"
                );
                Ok(SyncOutcome::SkippedDirty)
            }
        }
    }

    async fn clone_fresh(&self, dir: &Path, remote_url: &str) -> Result<(), SyncError> {
        // The directory may hold leftovers from an interrupted setup; a
        // clone refuses non-empty targets, so wipe the contents first.
        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|source| SyncError::Filesystem {
                    path: dir.to_path_buf(),
                    source,
                })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| SyncError::Filesystem {
                path: dir.to_path_buf(),
                source,
            })?
        {
            let path = entry.path();
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.map_err(|source| SyncError::Filesystem { path, source })?;
        }

        tracing::info!(url = remote_url, workspace = %dir.display(), "cloning repository");
        let dir_str = dir.to_string_lossy();
        let output = run_git(&["clone", remote_url, dir_str.as_ref()], None).await?;
        if !output.status.success() {
            return Err(SyncError::CloneFailed {
                url: remote_url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_and_reset(&self, dir: &Path) -> Result<(), SyncError> {
        let output = run_git(&["fetch", "origin"], Some(dir)).await?;
        if !output.status.success() {
            return Err(SyncError::FetchFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let branch = self.remote_default_branch(dir).await;
        let target = format!("origin/{}", branch);
        tracing::info!(workspace = %dir.display(), target = %target, "resetting to remote");
        let output = run_git(&["reset", "--hard", &target], Some(dir)).await?;
        if !output.status.success() {
            return Err(SyncError::ResetFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    /// The branch `origin/HEAD` points at, falling back to the configured
    /// default when the symref is unset.
    async fn remote_default_branch(&self, dir: &Path) -> String {
        if let Ok(output) =
            run_git(&["symbolic-ref", "--short", "refs/remotes/origin/HEAD"], Some(dir)).await
        {
            if output.status.success() {
                let full = String::from_utf8_lossy(&output.stdout).trim().to_string();
                // "origin/main" → "main"
                if let Some(branch) = full.strip_prefix("origin/") {
                    if !branch.is_empty() {
                        return branch.to_string();
                    }
                }
            }
        }
        self.default_branch.clone()
    }
}

/// Run `git` with the given args, optionally inside `cwd`.
pub(crate) async fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<std::process::Output, SyncError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.output().await.map_err(SyncError::Spawn)
}
