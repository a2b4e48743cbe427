//! Route handlers for the terminal API.
//!
//! Every failure body is JSON with at least `{"success": false, "error"}`.
//! Command-level failures (a process exiting non-zero) are not transport
//! failures and stay inside 200 responses; only malformed requests, sync
//! errors and spawn failures map to error statuses.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::errors::{ExecError, WorkspaceError};
use crate::workspace::executor::{CommandExecutor, ExecutorConfig};
use crate::workspace::files;
use crate::workspace::registry::ProcessRegistry;
use crate::workspace::store::{WorkspaceLocks, WorkspaceStore};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: WorkspaceStore,
    pub locks: WorkspaceLocks,
    pub executor: CommandExecutor,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(workspaces_root: impl Into<std::path::PathBuf>, config: ExecutorConfig) -> Self {
        let locks = WorkspaceLocks::new();
        Self {
            store: WorkspaceStore::new(workspaces_root),
            executor: CommandExecutor::new(ProcessRegistry::new(), locks.clone(), config),
            locks,
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

// Fields are Option so a missing field becomes a structured 400 body
// instead of an extractor rejection.
#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub command: Option<String>,
    pub cwd: Option<String>,
    #[serde(rename = "repoUrl")]
    pub repo_url: Option<String>,
}

#[derive(Deserialize)]
pub struct SaveFileRequest {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub path: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct CwdQuery {
    pub cwd: Option<String>,
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct RepoQuery {
    pub owner: Option<String>,
    pub repo: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (
            status,
            Json(serde_json::json!({"success": false, "error": message})),
        )
            .into_response()
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::InvalidPath(_) => ApiError::BadRequest(err.to_string()),
            WorkspaceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            WorkspaceError::Filesystem { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ExecError::Workspace(inner) => inner.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/terminal/execute", post(execute_command))
        .route("/api/terminal/node-modules", get(node_modules))
        .route("/api/terminal/save-file", post(save_file))
        .route("/api/terminal/read-file", get(read_file))
        .route("/api/terminal/files", get(list_files))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// `cwd` must split into exactly two non-empty segments.
fn split_cwd(cwd: &str) -> Result<(&str, &str), ApiError> {
    let mut parts = cwd.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.trim().is_empty() => {
            Ok((owner, repo.trim()))
        }
        _ => Err(ApiError::BadRequest(
            "Invalid repository format. Expected format: owner/repository".to_string(),
        )),
    }
}

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::BadRequest(format!(
            "Missing required parameter: {}",
            name
        ))),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn execute_command(
    State(state): State<SharedState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Response, ApiError> {
    let command = required(req.command, "command")?;
    let cwd = required(req.cwd, "cwd")?;
    let repo_url = required(req.repo_url, "repoUrl")?;
    let (owner, repo) = split_cwd(&cwd)?;

    let workspace = state.store.resolve(owner, repo).await?;
    let result = state
        .executor
        .execute(&workspace, &command, &repo_url)
        .await?;
    Ok(Json(result).into_response())
}

async fn node_modules(
    State(state): State<SharedState>,
    Query(query): Query<CwdQuery>,
) -> Result<Response, ApiError> {
    let cwd = required(query.cwd, "cwd")?;
    let (owner, repo) = split_cwd(&cwd)?;
    let workspace = state.store.resolve(owner, repo).await?;

    let lock = state.locks.lock_for(&workspace).await;
    let _guard = lock.lock().await;
    let modules = files::list_node_modules(&workspace).await?;
    Ok(Json(serde_json::json!({"success": true, "modules": modules})).into_response())
}

async fn save_file(
    State(state): State<SharedState>,
    Json(req): Json<SaveFileRequest>,
) -> Result<Response, ApiError> {
    let owner = required(req.owner, "owner")?;
    let repo = required(req.repo, "repo")?;
    let path = required(req.path, "path")?;
    let content = req.content.unwrap_or_default();

    let workspace = state.store.resolve(&owner, &repo).await?;
    // The write (and its best-effort staging) completes under the
    // workspace lock, so a commit issued right after cannot see a
    // half-written file.
    let lock = state.locks.lock_for(&workspace).await;
    let _guard = lock.lock().await;
    files::write(&workspace, &path, &content).await?;
    Ok(Json(serde_json::json!({"success": true, "path": path})).into_response())
}

async fn read_file(
    State(state): State<SharedState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let owner = required(query.owner, "owner")?;
    let repo = required(query.repo, "repo")?;
    let path = required(query.path, "path")?;

    let workspace = state.store.resolve(&owner, &repo).await?;
    let lock = state.locks.lock_for(&workspace).await;
    let _guard = lock.lock().await;
    let content = files::read(&workspace, &path).await?;
    Ok(Json(serde_json::json!({"success": true, "content": content})).into_response())
}

async fn list_files(
    State(state): State<SharedState>,
    Query(query): Query<RepoQuery>,
) -> Result<Response, ApiError> {
    let owner = required(query.owner, "owner")?;
    let repo = required(query.repo, "repo")?;
    let workspace = state.store.resolve(&owner, &repo).await?;
    let lock = state.locks.lock_for(&workspace).await;
    let _guard = lock.lock().await;
    let tree = files::list(&workspace).await?;
    Ok(Json(serde_json::json!({"success": true, "files": tree})).into_response())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
