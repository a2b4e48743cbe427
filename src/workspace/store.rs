//! Workspace path resolution.
//!
//! A workspace is the on-disk checkout for one `(owner, repo)` pair. Paths
//! are owner-namespaced (`<root>/<owner>/<repo>`, both segments sanitized)
//! so two tenants with identically-named repositories never share a
//! checkout. Directories are created lazily on first resolve and never
//! deleted by the running service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::WorkspaceError;

/// Replace every character outside `[A-Za-z0-9-_]` with `_`.
///
/// Deterministic; distinct names may still collide after sanitization,
/// which is why paths are additionally namespaced by owner.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Maps `(owner, repo)` to an absolute workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the workspace directory for `(owner, repo)`, creating it if
    /// absent. Idempotent; fails only on unrecoverable filesystem errors.
    pub async fn resolve(&self, owner: &str, repo: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.root.join(sanitize(owner)).join(sanitize(repo));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| WorkspaceError::Filesystem {
                path: dir.clone(),
                source,
            })?;
        tracing::debug!(workspace = %dir.display(), "resolved workspace directory");
        Ok(dir)
    }
}

/// One async mutex per workspace path.
///
/// Everything that touches a checkout (sync, command execution, file
/// saves) acquires the path's lock first, so a clone in progress can
/// never race a status check or a second clone for the same workspace.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock guarding `path`. Callers hold the returned
    /// mutex for the duration of their work against the checkout.
    pub async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize("my repo!"), "my_repo_");
        assert_eq!(sanitize("a/b\\c"), "a_b_c");
        assert_eq!(sanitize("demo.app"), "demo_app");
        assert_eq!(sanitize("ok-name_2"), "ok-name_2");
    }

    #[test]
    fn sanitize_output_charset_and_determinism() {
        let inputs = ["weird name", "ü¶é", "a..b", "x/y/z", "plain"];
        for input in inputs {
            let first = sanitize(input);
            let second = sanitize(input);
            assert_eq!(first, second);
            assert!(first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[tokio::test]
    async fn resolve_creates_directory_and_is_idempotent() {
        let root = tempdir().unwrap();
        let store = WorkspaceStore::new(root.path());

        let first = store.resolve("alice", "demo").await.unwrap();
        assert!(first.is_dir());

        // Second call must not fail on the existing directory
        let second = store.resolve("alice", "demo").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn resolve_namespaces_by_owner() {
        let root = tempdir().unwrap();
        let store = WorkspaceStore::new(root.path());

        let alice = store.resolve("alice", "demo").await.unwrap();
        let bob = store.resolve("bob", "demo").await.unwrap();
        assert_ne!(alice, bob);
        assert!(alice.ends_with("alice/demo"));
        assert!(bob.ends_with("bob/demo"));
    }

    #[tokio::test]
    async fn resolve_sanitizes_both_segments() {
        let root = tempdir().unwrap();
        let store = WorkspaceStore::new(root.path());

        let dir = store.resolve("some org", "my repo!").await.unwrap();
        assert!(dir.ends_with("some_org/my_repo_"));
    }

    #[tokio::test]
    async fn locks_are_shared_per_path() {
        let locks = WorkspaceLocks::new();
        let a1 = locks.lock_for(Path::new("/ws/a")).await;
        let a2 = locks.lock_for(Path::new("/ws/a")).await;
        let b = locks.lock_for(Path::new("/ws/b")).await;

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));

        // Holding a's lock must not block b's
        let _guard = a1.lock().await;
        let _b_guard = b.try_lock().expect("unrelated workspace lock was held");
        assert!(a2.try_lock().is_err());
    }
}
