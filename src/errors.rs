//! Typed error hierarchy for the workbench service.
//!
//! Three top-level enums cover the three subsystems:
//! - `WorkspaceError` — path resolution and file gateway failures
//! - `SyncError` — clone / fetch / reset failures against the remote
//! - `ExecError` — command dispatch failures that abort a request

use std::path::PathBuf;

use thiserror::Error;

/// Errors from workspace path resolution and the file gateway.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path escapes the workspace root: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    NotFound(PathBuf),
}

/// Errors from repository synchronization. Any of these aborts the
/// requested command entirely; no partial execution against an unsynced
/// tree.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Clone failed for {url}: {stderr}")]
    CloneFailed { url: String, stderr: String },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Reset failed: {0}")]
    ResetFailed(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a command request before or during dispatch.
/// Expected process outcomes (non-zero exit, stderr output) are NOT
/// errors — they are reported inside the command result.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to spawn command: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Dev server failed to start: {0}")]
    DevServerStart(String),
}
