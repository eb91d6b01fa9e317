//! Source-control inspection primitive: given a working directory, produce
//! the configured remote URL. Kept behind a trait so the resolver can be
//! exercised without a real repository on disk.

use crate::error::{ContextError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait RemoteProbe: Send + Sync {
    /// Returns the remote URL configured for `dir`'s governing repository.
    async fn remote_url(&self, dir: &Path) -> Result<String>;
}

/// Filesystem-backed probe: ascends to the repository root, follows linked
/// worktrees to their governing repository, and reads the remote URL out of
/// the repository config. No `git` binary involved.
pub struct GitDirProbe {
    remote_name: String,
}

impl GitDirProbe {
    pub fn new(remote_name: impl Into<String>) -> Self {
        Self {
            remote_name: remote_name.into(),
        }
    }
}

impl Default for GitDirProbe {
    fn default() -> Self {
        Self::new("origin")
    }
}

#[async_trait]
impl RemoteProbe for GitDirProbe {
    async fn remote_url(&self, dir: &Path) -> Result<String> {
        let git_dir = discover_git_dir(dir).await?;
        let config = tokio::fs::read_to_string(git_dir.join("config"))
            .await
            .map_err(|_| ContextError::NoRemote {
                remote: self.remote_name.clone(),
            })?;
        remote_url_from_config(&config, &self.remote_name).ok_or_else(|| ContextError::NoRemote {
            remote: self.remote_name.clone(),
        })
    }
}

/// Ascends from `start` until a `.git` entry is found. A `.git` directory is
/// the repository itself; a `.git` file is a linked worktree whose `gitdir:`
/// pointer (plus the worktree's `commondir`) leads to the governing
/// repository.
async fn discover_git_dir(start: &Path) -> Result<PathBuf> {
    for candidate in start.ancestors() {
        let dot_git = candidate.join(".git");
        let Ok(meta) = tokio::fs::metadata(&dot_git).await else {
            continue;
        };
        if meta.is_dir() {
            return Ok(dot_git);
        }
        if meta.is_file() {
            return resolve_gitfile(candidate, &dot_git).await;
        }
    }
    Err(ContextError::NotARepository(start.to_path_buf()))
}

async fn resolve_gitfile(worktree_root: &Path, dot_git: &Path) -> Result<PathBuf> {
    let not_a_repo = || ContextError::NotARepository(worktree_root.to_path_buf());

    let contents = tokio::fs::read_to_string(dot_git)
        .await
        .map_err(|_| not_a_repo())?;
    let pointer = contents
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(str::trim)
        .ok_or_else(not_a_repo)?;

    let worktree_git_dir = absolutize(worktree_root, Path::new(pointer));

    // Linked worktrees keep a `commondir` file pointing at the governing
    // repository's .git directory, where the shared config lives.
    match tokio::fs::read_to_string(worktree_git_dir.join("commondir")).await {
        Ok(common) => Ok(absolutize(&worktree_git_dir, Path::new(common.trim()))),
        Err(_) => Ok(worktree_git_dir),
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        normalize(&base.join(path))
    }
}

/// Collapses `..`/`.` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Minimal git-config reader: enough to find `url` under `[remote "<name>"]`.
fn remote_url_from_config(config: &str, remote_name: &str) -> Option<String> {
    let wanted = format!("remote \"{remote_name}\"");
    let mut in_section = false;
    for raw_line in config.lines() {
        let line = raw_line.trim();
        if line.starts_with('[') {
            let section = line.trim_start_matches('[').trim_end_matches(']').trim();
            in_section = section.eq_ignore_ascii_case(&wanted);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("url") {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CONFIG: &str = r#"[core]
	repositoryformatversion = 0
	bare = false
[remote "origin"]
	url = git@github.com:acme/widgets.git
	fetch = +refs/heads/*:refs/remotes/origin/*
[branch "main"]
	remote = origin
"#;

    async fn init_repo(root: &Path) {
        tokio::fs::create_dir_all(root.join(".git")).await.unwrap();
        tokio::fs::write(root.join(".git/config"), CONFIG).await.unwrap();
    }

    #[tokio::test]
    async fn finds_remote_from_repo_root() {
        let temp = TempDir::new().unwrap();
        init_repo(temp.path()).await;

        let url = GitDirProbe::default().remote_url(temp.path()).await.unwrap();
        assert_eq!(url, "git@github.com:acme/widgets.git");
    }

    #[tokio::test]
    async fn finds_remote_from_nested_directory() {
        let temp = TempDir::new().unwrap();
        init_repo(temp.path()).await;
        let nested = temp.path().join("src/deeply/nested");
        tokio::fs::create_dir_all(&nested).await.unwrap();

        let url = GitDirProbe::default().remote_url(&nested).await.unwrap();
        assert_eq!(url, "git@github.com:acme/widgets.git");
    }

    #[tokio::test]
    async fn resolves_linked_worktree_to_governing_repository() {
        let temp = TempDir::new().unwrap();
        let main = temp.path().join("main");
        init_repo(&main).await;

        // Layout produced by `git worktree add ../feature`.
        let wt_git_dir = main.join(".git/worktrees/feature");
        tokio::fs::create_dir_all(&wt_git_dir).await.unwrap();
        tokio::fs::write(wt_git_dir.join("commondir"), "../..\n")
            .await
            .unwrap();

        let feature = temp.path().join("feature");
        tokio::fs::create_dir_all(&feature).await.unwrap();
        tokio::fs::write(
            feature.join(".git"),
            format!("gitdir: {}\n", wt_git_dir.display()),
        )
        .await
        .unwrap();

        let url = GitDirProbe::default().remote_url(&feature).await.unwrap();
        assert_eq!(url, "git@github.com:acme/widgets.git");
    }

    #[tokio::test]
    async fn missing_repository_is_not_a_repository() {
        let temp = TempDir::new().unwrap();
        let err = GitDirProbe::default()
            .remote_url(temp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::NotARepository(_)));
    }

    #[tokio::test]
    async fn repository_without_remote_reports_no_remote() {
        let temp = TempDir::new().unwrap();
        tokio::fs::create_dir_all(temp.path().join(".git")).await.unwrap();
        tokio::fs::write(temp.path().join(".git/config"), "[core]\n\tbare = false\n")
            .await
            .unwrap();

        let err = GitDirProbe::default()
            .remote_url(temp.path())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ContextError::NoRemote {
                remote: "origin".into()
            }
        );
    }

    #[test]
    fn config_reader_ignores_other_remotes() {
        let config = "[remote \"upstream\"]\n\turl = git@github.com:other/fork.git\n";
        assert_eq!(remote_url_from_config(config, "origin"), None);
        assert_eq!(
            remote_url_from_config(config, "upstream").as_deref(),
            Some("git@github.com:other/fork.git")
        );
    }
}
