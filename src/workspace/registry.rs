//! Tracking of long-running workspace processes.
//!
//! At most one background child (typically a dev server) is tracked per
//! workspace path. Entries are replaced explicitly when a new dev server
//! starts; a crashed child leaves a stale entry until then, which is
//! accepted — replace-on-start covers the common case. The registry is
//! created at service startup and injected into the executor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::process::Child;
use tokio::sync::Mutex;

/// A long-running child process bound to one workspace.
///
/// Tracked children are spawned as process group leaders
/// (`process_group(0)`), so terminating one kills its whole tree.
pub struct TrackedProcess {
    pub child: Child,
    /// Port the server is believed to be listening on.
    pub port: Option<u16>,
    /// Accumulated stdout/stderr transcript, appended by the reader task.
    pub output: Arc<StdMutex<String>>,
}

impl TrackedProcess {
    pub fn new(child: Child, port: Option<u16>, output: Arc<StdMutex<String>>) -> Self {
        Self {
            child,
            port,
            output,
        }
    }
}

#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<PathBuf, TrackedProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (unconditionally overwriting) the tracked process for a
    /// workspace, returning any previous occupant. Callers terminate the
    /// previous occupant first; the return value is a safety net.
    pub async fn insert(&self, workspace: &Path, process: TrackedProcess) -> Option<TrackedProcess> {
        self.inner
            .lock()
            .await
            .insert(workspace.to_path_buf(), process)
    }

    pub async fn remove(&self, workspace: &Path) -> Option<TrackedProcess> {
        self.inner.lock().await.remove(workspace)
    }

    /// Kill and drop the tracked process for a workspace, if any.
    /// Returns true when a process was terminated.
    pub async fn terminate(&self, workspace: &Path) -> bool {
        let Some(mut tracked) = self.remove(workspace).await else {
            return false;
        };
        // The shell is a group leader; kill the group first so its
        // grandchildren (npm spawning node) do not survive as orphans.
        // ESRCH when the group is already gone is fine.
        if let Some(pid) = tracked.child.id() {
            unsafe {
                libc::killpg(pid as i32, libc::SIGKILL);
            }
        }
        match tracked.child.kill().await {
            Ok(()) => {
                tracing::info!(workspace = %workspace.display(), "terminated tracked process");
                true
            }
            Err(e) => {
                // Already exited; the entry was stale.
                tracing::debug!(workspace = %workspace.display(), error = %e, "tracked process was not running");
                true
            }
        }
    }

    pub async fn is_tracked(&self, workspace: &Path) -> bool {
        self.inner.lock().await.contains_key(workspace)
    }

    pub async fn port(&self, workspace: &Path) -> Option<u16> {
        self.inner.lock().await.get(workspace).and_then(|p| p.port)
    }

    /// Update the port once the server has announced the one it actually
    /// bound (frameworks may ignore the `PORT` hint).
    pub async fn set_port(&self, workspace: &Path, port: u16) {
        if let Some(tracked) = self.inner.lock().await.get_mut(workspace) {
            tracked.port = Some(port);
        }
    }

    /// OS pid of the tracked child, when it is still running.
    pub async fn pid(&self, workspace: &Path) -> Option<u32> {
        self.inner
            .lock()
            .await
            .get(workspace)
            .and_then(|p| p.child.id())
    }

    /// Snapshot of the accumulated output transcript for later inspection.
    pub async fn output_snapshot(&self, workspace: &Path) -> Option<String> {
        let map = self.inner.lock().await;
        let tracked = map.get(workspace)?;
        let buf = tracked.output.lock().ok()?;
        Some(buf.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_sleeper() -> Child {
        Command::new("sh")
            .arg("-c")
            .arg("sleep 30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap()
    }

    fn tracked(child: Child, port: Option<u16>) -> TrackedProcess {
        TrackedProcess::new(child, port, Arc::new(StdMutex::new(String::new())))
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let registry = ProcessRegistry::new();
        let ws = PathBuf::from("/ws/demo");

        assert!(!registry.is_tracked(&ws).await);
        let prev = registry.insert(&ws, tracked(spawn_sleeper(), Some(3001))).await;
        assert!(prev.is_none());
        assert!(registry.is_tracked(&ws).await);
        assert_eq!(registry.port(&ws).await, Some(3001));

        registry.terminate(&ws).await;
    }

    #[tokio::test]
    async fn insert_overwrites_and_returns_previous() {
        let registry = ProcessRegistry::new();
        let ws = PathBuf::from("/ws/demo");

        registry.insert(&ws, tracked(spawn_sleeper(), Some(3001))).await;
        let mut prev = registry
            .insert(&ws, tracked(spawn_sleeper(), Some(3002)))
            .await
            .expect("previous occupant returned");
        prev.child.kill().await.unwrap();

        assert_eq!(registry.port(&ws).await, Some(3002));
        registry.terminate(&ws).await;
    }

    #[tokio::test]
    async fn terminate_kills_the_child() {
        let registry = ProcessRegistry::new();
        let ws = PathBuf::from("/ws/demo");

        let child = spawn_sleeper();
        let id = child.id().expect("child has a pid");
        registry.insert(&ws, tracked(child, None)).await;

        assert!(registry.terminate(&ws).await);
        assert!(!registry.is_tracked(&ws).await);

        // The pid is gone (kill(0) probing via /proc on Linux)
        let alive = std::path::Path::new(&format!("/proc/{}", id)).exists()
            && std::fs::read_to_string(format!("/proc/{}/stat", id))
                .map(|s| !s.contains(") Z "))
                .unwrap_or(false);
        assert!(!alive, "terminated child still running");
    }

    #[tokio::test]
    async fn terminate_kills_grandchildren() {
        let registry = ProcessRegistry::new();
        let ws = PathBuf::from("/ws/demo");
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("pid");

        // The shell records its background child's pid, then waits on it
        let child = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 30 & echo $! > {}; wait", pidfile.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        registry.insert(&ws, tracked(child, None)).await;

        let mut grandchild = None;
        for _ in 0..50 {
            if let Some(pid) = std::fs::read_to_string(&pidfile)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
            {
                grandchild = Some(pid);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let gpid = grandchild.expect("grandchild pid recorded");

        assert!(registry.terminate(&ws).await);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let alive = std::path::Path::new(&format!("/proc/{}", gpid)).exists()
            && std::fs::read_to_string(format!("/proc/{}/stat", gpid))
                .map(|s| !s.contains(") Z "))
                .unwrap_or(false);
        assert!(!alive, "grandchild survived the group kill");
    }

    #[tokio::test]
    async fn terminate_without_entry_is_false() {
        let registry = ProcessRegistry::new();
        assert!(!registry.terminate(Path::new("/ws/none")).await);
    }

    #[tokio::test]
    async fn output_snapshot_reflects_buffer() {
        let registry = ProcessRegistry::new();
        let ws = PathBuf::from("/ws/demo");
        let buf = Arc::new(StdMutex::new(String::new()));
        registry
            .insert(&ws, TrackedProcess::new(spawn_sleeper(), None, buf.clone()))
            .await;

        buf.lock().unwrap().push_str("ready in 120 ms\n");
        let snapshot = registry.output_snapshot(&ws).await.unwrap();
        assert!(snapshot.contains("ready in"));

        registry.terminate(&ws).await;
    }
}
