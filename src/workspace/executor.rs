//! Command dispatch.
//!
//! `CommandExecutor` is the central component: given a workspace and a raw
//! command line, it classifies the command, guarantees the checkout is
//! synchronized (skipped for git subcommands — the user is managing git
//! state intentionally), and executes with the matching strategy:
//!
//! - git: identity auto-config plus clean-tree special cases for
//!   `add`/`commit`/`push`, everything else passed through
//! - install: verbose npm run with a capped output buffer, then a
//!   one-level enumeration of what landed in `node_modules`
//! - dev server: terminate-and-replace the tracked process, probe a free
//!   port, spawn with `PORT` exported, wait briefly for a ready signal
//! - generic: `sh -c` in the workspace; a non-zero exit is still a
//!   successful request, with stderr appended for visibility
//!
//! Expected process outcomes never raise; only malformed requests, sync
//! failures and spawn-level errors abort a request.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

use crate::command::{classify, commit_message, CommandKind};
use crate::errors::ExecError;
use crate::workspace::files;
use crate::workspace::reader::LineScanner;
use crate::workspace::registry::{ProcessRegistry, TrackedProcess};
use crate::workspace::store::WorkspaceLocks;
use crate::workspace::sync::{run_git, RepoState, Synchronizer};

/// Outcome of one command request. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<String>,
}

impl CommandResult {
    fn new(success: bool, output: impl Into<String>) -> Self {
        Self {
            success,
            output: output.into(),
            modules: None,
            port: None,
            server_url: None,
            workspace_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub git_author_name: String,
    pub git_author_email: String,
    pub default_branch: String,
    pub dev_server_base_port: u16,
    pub dev_server_wait: Duration,
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            git_author_name: "workbench".to_string(),
            git_author_email: "workbench@localhost".to_string(),
            default_branch: "main".to_string(),
            dev_server_base_port: 3001,
            dev_server_wait: Duration::from_secs(3),
            max_output_bytes: 10 * 1024 * 1024,
        }
    }
}

pub struct CommandExecutor {
    sync: Synchronizer,
    registry: ProcessRegistry,
    locks: WorkspaceLocks,
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(registry: ProcessRegistry, locks: WorkspaceLocks, config: ExecutorConfig) -> Self {
        Self {
            sync: Synchronizer::new(config.default_branch.clone()),
            registry,
            locks,
            config,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Execute `raw` inside `workspace`, synchronizing from `remote_url`
    /// first for non-git commands. All work against the same workspace
    /// path is serialized through its lock.
    pub async fn execute(
        &self,
        workspace: &Path,
        raw: &str,
        remote_url: &str,
    ) -> Result<CommandResult, ExecError> {
        if raw.trim().is_empty() {
            return Err(ExecError::InvalidRequest("command must not be empty".into()));
        }

        let lock = self.locks.lock_for(workspace).await;
        let _guard = lock.lock().await;

        tracing::info!(workspace = %workspace.display(), command = raw, "executing command");

        let mut result = match classify(raw) {
            CommandKind::Git { subcommand, args } => {
                self.run_git_command(workspace, raw, &subcommand, &args).await?
            }
            CommandKind::Install => {
                self.sync.synchronize(workspace, remote_url).await?;
                self.run_install(workspace, raw).await?
            }
            CommandKind::DevServer => {
                self.sync.synchronize(workspace, remote_url).await?;
                self.start_dev_server(workspace, raw).await?
            }
            CommandKind::Generic => {
                self.sync.synchronize(workspace, remote_url).await?;
                self.run_generic(workspace, raw).await?
            }
        };

        result.workspace_dir = Some(workspace.display().to_string());
        Ok(result)
    }

    // ── Git commands ──────────────────────────────────────────────────

    async fn run_git_command(
        &self,
        workspace: &Path,
        raw: &str,
        subcommand: &str,
        args: &[String],
    ) -> Result<CommandResult, ExecError> {
        self.ensure_identity(workspace).await?;
        let state = Synchronizer::detect_state(workspace).map_err(ExecError::Sync)?;

        match subcommand {
            "add" if state != RepoState::Dirty => Ok(CommandResult::new(
                true,
                "Nothing to add: working tree clean",
            )),
            "commit" if state != RepoState::Dirty => Ok(CommandResult::new(
                true,
                "nothing to commit, working tree clean",
            )),
            "commit" => {
                let message = commit_message(args);
                let output = run_git(&["commit", "-m", &message], Some(workspace))
                    .await
                    .map_err(ExecError::Sync)?;
                Ok(self.result_from_output(&output))
            }
            "push" => {
                if self.nothing_to_push(workspace).await? {
                    return Ok(CommandResult::new(true, "No changes to push"));
                }
                let output = self.run_shell(workspace, raw).await?;
                Ok(self.result_from_output(&output))
            }
            _ => {
                let output = self.run_shell(workspace, raw).await?;
                Ok(self.result_from_output(&output))
            }
        }
    }

    /// Set a repo-local commit identity so commits issued through the API
    /// never fail for lack of a configured author.
    async fn ensure_identity(&self, workspace: &Path) -> Result<(), ExecError> {
        if !workspace.join(".git").exists() {
            return Ok(());
        }
        run_git(
            &["config", "user.name", &self.config.git_author_name],
            Some(workspace),
        )
        .await
        .map_err(ExecError::Sync)?;
        run_git(
            &["config", "user.email", &self.config.git_author_email],
            Some(workspace),
        )
        .await
        .map_err(ExecError::Sync)?;
        Ok(())
    }

    /// True when HEAD has no commits on top of its upstream. When no
    /// upstream is configured the push is passed through as-is.
    async fn nothing_to_push(&self, workspace: &Path) -> Result<bool, ExecError> {
        let output = run_git(&["rev-list", "--count", "@{u}..HEAD"], Some(workspace))
            .await
            .map_err(ExecError::Sync)?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "0")
    }

    // ── Install ───────────────────────────────────────────────────────

    async fn run_install(&self, workspace: &Path, raw: &str) -> Result<CommandResult, ExecError> {
        // npm is chatty only when asked; mirror the verbose install the
        // terminal UI expects to stream back.
        let command = if raw.starts_with("npm") && !raw.contains("--verbose") {
            format!("{} --verbose", raw)
        } else {
            raw.to_string()
        };

        let output = self.run_shell(workspace, &command).await?;
        let mut result = self.result_from_output(&output);
        // Install failures stay inside the response body like any other
        // command-level failure.
        result.success = true;
        result.modules = Some(files::installed_module_names(workspace).await);
        Ok(result)
    }

    // ── Dev server ────────────────────────────────────────────────────

    async fn start_dev_server(&self, workspace: &Path, raw: &str) -> Result<CommandResult, ExecError> {
        // Replace, never leak: a previous dev server for this workspace is
        // terminated before the new one spawns.
        self.registry.terminate(workspace).await;

        let port = find_free_port(self.config.dev_server_base_port).await?;

        // Own process group: terminating the server must take the whole
        // npm/node tree with it, not just the shell.
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(raw)
            .current_dir(workspace)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(ExecError::SpawnFailed)?;

        let transcript = Arc::new(StdMutex::new(String::new()));
        let max = self.config.max_output_bytes;
        let mut stdout_scanner = child
            .stdout
            .take()
            .map(|out| LineScanner::spawn(out, transcript.clone(), max));
        if let Some(stderr) = child.stderr.take() {
            // stderr feeds the transcript only; readiness is signalled on
            // stdout.
            drop(LineScanner::spawn(stderr, transcript.clone(), max));
        }

        // Track before waiting: a slow starter stays registered even when
        // the ready wait below times out.
        self.registry
            .insert(
                workspace,
                TrackedProcess::new(child, Some(port), transcript.clone()),
            )
            .await;

        // Frameworks may pick their own port; the printed local URL wins
        // over the probed one.
        let ready = Regex::new(r"Local:\s+https?://(?:localhost|127\.0\.0\.1):(\d+)|ready in")
            .expect("static regex");

        let hit = match stdout_scanner.as_mut() {
            Some(scanner) => scanner.wait_for(&ready, self.config.dev_server_wait).await,
            None => None,
        };

        match hit {
            Some(m) => {
                let port = m
                    .capture
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(port);
                self.registry.set_port(workspace, port).await;
                let output = transcript
                    .lock()
                    .map(|buf| buf.clone())
                    .unwrap_or_default();
                let mut result = CommandResult::new(
                    true,
                    if output.is_empty() {
                        "Dev server started".to_string()
                    } else {
                        output
                    },
                );
                result.port = Some(port);
                result.server_url = Some(format!("http://localhost:{}", port));
                Ok(result)
            }
            None => {
                tracing::warn!(
                    workspace = %workspace.display(),
                    wait = ?self.config.dev_server_wait,
                    "no ready signal from dev server; leaving it running"
                );
                Err(ExecError::DevServerStart(
                    "server failed to start".to_string(),
                ))
            }
        }
    }

    // ── Generic ───────────────────────────────────────────────────────

    async fn run_generic(&self, workspace: &Path, raw: &str) -> Result<CommandResult, ExecError> {
        let output = self.run_shell(workspace, raw).await?;
        let mut result = self.result_from_output(&output);
        // Business failure is not a transport failure: the exit code is
        // visible through stderr in the output, the request itself
        // succeeded.
        result.success = true;
        Ok(result)
    }

    // ── Shared plumbing ───────────────────────────────────────────────

    async fn run_shell(&self, workspace: &Path, raw: &str) -> Result<std::process::Output, ExecError> {
        Command::new("sh")
            .arg("-c")
            .arg(raw)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(ExecError::SpawnFailed)
    }

    fn result_from_output(&self, output: &std::process::Output) -> CommandResult {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = truncate(
            combine_output(&stdout, &stderr),
            self.config.max_output_bytes,
        );
        CommandResult::new(output.status.success(), combined)
    }
}

/// Combined output is `stdout + "\n" + stderr` only when stderr is
/// non-empty, else stdout alone. Callers must not assume a separator.
pub fn combine_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n{}", stdout, stderr)
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("\n[output truncated]");
    }
    s
}

/// Probe for a free TCP port starting at `base`, incrementing on bind
/// failure. Never returns an occupied port.
pub async fn find_free_port(base: u16) -> Result<u16, ExecError> {
    let mut port = base;
    loop {
        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                drop(listener);
                return Ok(port);
            }
            Err(_) if port < base.saturating_add(200) => {
                port += 1;
            }
            Err(e) => {
                return Err(ExecError::DevServerStart(format!(
                    "no free port in range {}..{}: {}",
                    base, port, e
                )))
            }
        }
    }
}
