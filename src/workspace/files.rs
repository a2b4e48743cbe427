//! Workspace-scoped file access.
//!
//! Read, write and list operations used by the editor's save/load path and
//! by git staging. Every relative path is validated against the workspace
//! root first: absolute paths and `..` segments are rejected, so a request
//! can never reach outside its checkout.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::errors::WorkspaceError;
use crate::workspace::sync::run_git;

/// One node of the workspace file tree.
#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Path relative to the workspace root, `/`-separated.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<FileNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// Validate `relative` and join it onto the workspace root.
///
/// Rejects absolute paths and any path containing `..` (or other
/// non-normal) components with `InvalidPath`.
pub fn resolve_relative(workspace: &Path, relative: &str) -> Result<PathBuf, WorkspaceError> {
    let rel = Path::new(relative);
    if rel.as_os_str().is_empty() {
        return Err(WorkspaceError::InvalidPath(relative.to_string()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(WorkspaceError::InvalidPath(relative.to_string())),
        }
    }
    Ok(workspace.join(rel))
}

/// Read a file from the workspace. `NotFound` when absent.
pub async fn read(workspace: &Path, relative: &str) -> Result<String, WorkspaceError> {
    let path = resolve_relative(workspace, relative)?;
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WorkspaceError::NotFound(PathBuf::from(relative)))
        }
        Err(source) => Err(WorkspaceError::Filesystem { path, source }),
    }
}

/// Write the full content of a file (overwrite semantics), creating parent
/// directories as needed, then stage it with a best-effort `git add`. A
/// staging failure is logged and swallowed; the save itself must succeed
/// even when git bookkeeping fails.
pub async fn write(workspace: &Path, relative: &str, content: &str) -> Result<(), WorkspaceError> {
    let path = resolve_relative(workspace, relative)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| WorkspaceError::Filesystem {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|source| WorkspaceError::Filesystem {
            path: path.clone(),
            source,
        })?;

    match run_git(&["add", relative], Some(workspace)).await {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            tracing::warn!(
                file = relative,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "failed to stage saved file"
            );
        }
        Err(e) => {
            tracing::warn!(file = relative, error = %e, "failed to run git add for saved file");
        }
    }
    Ok(())
}

/// Recursive listing of the workspace tree.
///
/// `.git` and `node_modules` are excluded; the dependency tree has its own
/// one-level listing below.
pub async fn list(workspace: &Path) -> Result<Vec<FileNode>, WorkspaceError> {
    let root = workspace.to_path_buf();
    tokio::task::spawn_blocking(move || build_tree(&root, &root))
        .await
        .map_err(|e| WorkspaceError::Filesystem {
            path: workspace.to_path_buf(),
            source: std::io::Error::other(e),
        })?
}

fn build_tree(root: &Path, dir: &Path) -> Result<Vec<FileNode>, WorkspaceError> {
    let entries = std::fs::read_dir(dir).map_err(|source| WorkspaceError::Filesystem {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut nodes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::Filesystem {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == ".git" || name == "node_modules" {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        if path.is_dir() {
            nodes.push(FileNode {
                name,
                kind: NodeKind::Dir,
                path: rel,
                contents: Some(build_tree(root, &path)?),
            });
        } else {
            nodes.push(FileNode {
                name,
                kind: NodeKind::File,
                path: rel,
                contents: None,
            });
        }
    }
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

/// One-level listing of `node_modules`: each installed package directory
/// (hidden entries excluded) with a partial contents list covering
/// `package.json`, `README.md`, `dist` and `src`.
pub async fn list_node_modules(workspace: &Path) -> Result<Vec<FileNode>, WorkspaceError> {
    let dir = workspace.join("node_modules");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|source| WorkspaceError::Filesystem {
            path: dir.clone(),
            source,
        })?;

    let mut modules = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| WorkspaceError::Filesystem {
            path: dir.clone(),
            source,
        })?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }

        let module_path = entry.path();
        let mut contents = Vec::new();
        for candidate in ["package.json", "README.md", "dist", "src"] {
            let candidate_path = module_path.join(candidate);
            let kind = if candidate == "dist" || candidate == "src" {
                if !candidate_path.is_dir() {
                    continue;
                }
                NodeKind::Dir
            } else {
                if !candidate_path.is_file() {
                    continue;
                }
                NodeKind::File
            };
            contents.push(FileNode {
                name: candidate.to_string(),
                kind,
                path: format!("node_modules/{}/{}", name, candidate),
                contents: None,
            });
        }

        modules.push(FileNode {
            path: format!("node_modules/{}", name),
            name,
            kind: NodeKind::Dir,
            contents: Some(contents),
        });
    }

    modules.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(modules)
}

/// Names of installed packages, one level deep, hidden entries excluded.
/// Used by the install command to report what landed on disk.
pub async fn installed_module_names(workspace: &Path) -> Vec<String> {
    let dir = workspace.join("node_modules");
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with('.') && entry.path().is_dir() {
            names.push(name);
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let ws = tempdir().unwrap();
        write(ws.path(), "src/app.js", "console.log('hi');\n")
            .await
            .unwrap();
        let content = read(ws.path(), "src/app.js").await.unwrap();
        assert_eq!(content, "console.log('hi');\n");
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let ws = tempdir().unwrap();
        write(ws.path(), "deep/nested/dir/file.txt", "x").await.unwrap();
        assert!(ws.path().join("deep/nested/dir/file.txt").is_file());
    }

    #[tokio::test]
    async fn write_succeeds_without_a_git_repo() {
        // Staging is best-effort; no repo means git add fails and is swallowed
        let ws = tempdir().unwrap();
        write(ws.path(), "plain.txt", "content").await.unwrap();
        assert!(ws.path().join("plain.txt").is_file());
    }

    #[tokio::test]
    async fn write_stages_file_when_repo_present() {
        let ws = tempdir().unwrap();
        let repo = git2::Repository::init(ws.path()).unwrap();
        write(ws.path(), "staged.txt", "content").await.unwrap();

        let statuses = repo.statuses(None).unwrap();
        let entry = statuses
            .iter()
            .find(|e| e.path() == Some("staged.txt"))
            .expect("file visible to git");
        assert!(entry.status().contains(git2::Status::INDEX_NEW));
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let ws = tempdir().unwrap();
        let err = read(ws.path(), "missing.txt").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let ws = tempdir().unwrap();
        for bad in ["../escape.txt", "a/../../escape.txt", "/etc/passwd", ""] {
            let err = resolve_relative(ws.path(), bad).unwrap_err();
            assert!(
                matches!(err, WorkspaceError::InvalidPath(_)),
                "expected InvalidPath for {bad:?}"
            );
        }
        let read_err = read(ws.path(), "../escape.txt").await.unwrap_err();
        assert!(matches!(read_err, WorkspaceError::InvalidPath(_)));
        let write_err = write(ws.path(), "../escape.txt", "x").await.unwrap_err();
        assert!(matches!(write_err, WorkspaceError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn list_builds_relative_tree_and_skips_git() {
        let ws = tempdir().unwrap();
        fs::create_dir_all(ws.path().join(".git")).unwrap();
        fs::create_dir_all(ws.path().join("node_modules/react")).unwrap();
        fs::create_dir_all(ws.path().join("src")).unwrap();
        fs::write(ws.path().join("src/index.js"), "x").unwrap();
        fs::write(ws.path().join("package.json"), "{}").unwrap();

        let tree = list(ws.path()).await.unwrap();
        let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["package.json", "src"]);

        let src = tree.iter().find(|n| n.name == "src").unwrap();
        assert_eq!(src.kind, NodeKind::Dir);
        let children = src.contents.as_ref().unwrap();
        assert_eq!(children[0].name, "index.js");
        assert_eq!(children[0].path, "src/index.js");
        assert_eq!(children[0].kind, NodeKind::File);
    }

    #[tokio::test]
    async fn node_modules_listing_with_partial_contents() {
        let ws = tempdir().unwrap();
        let module = ws.path().join("node_modules/left-pad");
        fs::create_dir_all(module.join("dist")).unwrap();
        fs::write(module.join("package.json"), "{}").unwrap();
        fs::write(module.join("index.js"), "x").unwrap();
        fs::create_dir_all(ws.path().join("node_modules/.bin")).unwrap();

        let modules = list_node_modules(ws.path()).await.unwrap();
        assert_eq!(modules.len(), 1);
        let module = &modules[0];
        assert_eq!(module.name, "left-pad");
        assert_eq!(module.path, "node_modules/left-pad");

        let contents = module.contents.as_ref().unwrap();
        let names: Vec<&str> = contents.iter().map(|n| n.name.as_str()).collect();
        // index.js is not one of the surfaced files
        assert_eq!(names, vec!["package.json", "dist"]);
    }

    #[tokio::test]
    async fn node_modules_listing_empty_when_absent() {
        let ws = tempdir().unwrap();
        let modules = list_node_modules(ws.path()).await.unwrap();
        assert!(modules.is_empty());
    }

    #[tokio::test]
    async fn installed_module_names_skips_hidden() {
        let ws = tempdir().unwrap();
        fs::create_dir_all(ws.path().join("node_modules/react")).unwrap();
        fs::create_dir_all(ws.path().join("node_modules/.cache")).unwrap();
        fs::write(ws.path().join("node_modules/stray.txt"), "x").unwrap();

        let names = installed_module_names(ws.path()).await;
        assert_eq!(names, vec!["react".to_string()]);
    }
}
