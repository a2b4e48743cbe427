//! Server bootstrap.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState, SharedState};
use crate::workspace::executor::ExecutorConfig;

/// Configuration for the workbench server.
pub struct ServerConfig {
    pub port: u16,
    pub workspaces_root: PathBuf,
    pub executor: ExecutorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            workspaces_root: PathBuf::from("workspaces"),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Build the application router. The browser editor is served from a
/// different origin, so CORS is permissive.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the workbench server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.workspaces_root)
        .context("Failed to create workspaces root directory")?;
    let workspaces_root = config
        .workspaces_root
        .canonicalize()
        .context("Failed to resolve workspaces root directory")?;

    let state = Arc::new(AppState::new(workspaces_root.clone(), config.executor));
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, workspaces = %workspaces_root.display(), "workbench running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}
