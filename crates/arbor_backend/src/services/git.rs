use anyhow::{Context as _, anyhow};
use arbor_domain::{DiffStats, GitError, GitStatus};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};

use super::git_parse::{count_lines, parse_left_right_count, parse_porcelain_v1, parse_shortstat};

const DEFAULT_REMOTE: &str = "origin";
const DEFAULT_BASE_BRANCHES: [&str; 2] = ["origin/main", "origin/master"];

/// Thin wrapper over the `git` executable. Every call blocks until the child
/// exits; async callers go through `spawn_blocking`.
#[derive(Clone, Debug)]
pub struct GitWorktreeService {
    git: PathBuf,
}

impl Default for GitWorktreeService {
    fn default() -> Self {
        Self::new()
    }
}

impl GitWorktreeService {
    pub fn new() -> Self {
        Self {
            git: PathBuf::from("git"),
        }
    }

    pub fn with_executable(git: PathBuf) -> Self {
        Self { git }
    }

    pub(crate) fn run_git<I, S>(&self, repo_path: &Path, args: I) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self.run_git_untrimmed(repo_path, args)?.trim().to_owned())
    }

    /// Like `run_git` but keeps leading whitespace, which porcelain formats
    /// use as a status column.
    fn run_git_untrimmed<I, S>(&self, repo_path: &Path, args: I) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(repo_path)
            .output()
            .context("failed to spawn git")?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "git failed ({}):\nstdout:\n{}\nstderr:\n{}",
                output.status,
                stdout.trim(),
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn is_repository(&self, path: &Path) -> bool {
        path.is_dir() && self.run_git(path, ["rev-parse", "--git-dir"]).is_ok()
    }

    pub fn branch_exists(&self, repo_path: &Path, branch: &str) -> bool {
        let branch_ref = format!("refs/heads/{branch}");
        self.run_git(repo_path, ["show-ref", "--verify", "--quiet", &branch_ref])
            .is_ok()
    }

    pub fn has_remote(&self, repo_path: &Path, remote: &str) -> bool {
        self.run_git(repo_path, ["remote"])
            .map(|out| out.lines().map(str::trim).any(|r| r == remote))
            .unwrap_or(false)
    }

    /// Start point for a new workspace branch: `origin/main` when the source
    /// has an `origin` remote (fetched first, best effort), otherwise `None`
    /// which branches from `HEAD`.
    pub fn default_start_point(&self, source_repo: &Path) -> Option<String> {
        if !self.has_remote(source_repo, DEFAULT_REMOTE) {
            return None;
        }

        if let Err(err) = self.run_git(source_repo, ["fetch", DEFAULT_REMOTE]) {
            tracing::warn!(
                repo = %source_repo.display(),
                error = %format!("{err:#}"),
                "fetch failed; branching from possibly stale origin/main"
            );
        }
        Some(format!("{DEFAULT_REMOTE}/main"))
    }

    /// Attaches to `branch` when it already exists in the source repository,
    /// otherwise creates it at `start_point` (or `HEAD`).
    pub fn create_worktree(
        &self,
        source_repo: &Path,
        dest_path: &Path,
        branch: &str,
        start_point: Option<&str>,
    ) -> Result<(), GitError> {
        if !self.is_repository(source_repo) {
            return Err(GitError::NotARepository(source_repo.to_path_buf()));
        }

        let dest = dest_path
            .to_str()
            .ok_or_else(|| GitError::WorktreeCreationFailed("invalid worktree path".to_owned()))?;

        let mut args: Vec<&str> = vec!["worktree", "add"];
        if self.branch_exists(source_repo, branch) {
            args.extend([dest, branch]);
        } else {
            args.extend(["-b", branch, dest]);
            if let Some(start_point) = start_point {
                args.push(start_point);
            }
        }

        self.run_git(source_repo, &args)
            .with_context(|| format!("failed to create worktree at {}", dest_path.display()))
            .map_err(|err| GitError::WorktreeCreationFailed(format!("{err:#}")))?;

        tracing::info!(
            repo = %source_repo.display(),
            worktree = %dest_path.display(),
            branch,
            "created worktree"
        );
        Ok(())
    }

    /// Best effort: falls back to deleting the directory when git refuses.
    pub fn remove_worktree(&self, worktree_path: &Path, source_repo: &Path) {
        let Some(path_str) = worktree_path.to_str() else {
            tracing::warn!(worktree = %worktree_path.display(), "non utf-8 worktree path");
            remove_dir_fallback(worktree_path);
            return;
        };

        match self.run_git(source_repo, ["worktree", "remove", "--force", path_str]) {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    worktree = %worktree_path.display(),
                    error = %format!("{err:#}"),
                    "git worktree remove failed; deleting directory"
                );
                remove_dir_fallback(worktree_path);
            }
        }
    }

    pub fn prune_worktrees(&self, source_repo: &Path) -> Result<(), GitError> {
        self.run_git(source_repo, ["worktree", "prune"])
            .map(|_| ())
            .map_err(|err| GitError::CommandFailed(format!("{err:#}")))
    }

    /// Branch, upstream tracking and changed files. Never fails: anything git
    /// cannot answer degrades to empty values.
    pub fn status(&self, path: &Path) -> GitStatus {
        let branch = self
            .run_git(path, ["rev-parse", "--abbrev-ref", "HEAD"])
            .unwrap_or_default();
        let upstream = self
            .run_git(path, ["rev-parse", "--abbrev-ref", "@{upstream}"])
            .ok()
            .filter(|u| !u.is_empty());

        let (ahead, behind) = match upstream {
            Some(_) => self
                .run_git(
                    path,
                    ["rev-list", "--left-right", "--count", "HEAD...@{upstream}"],
                )
                .ok()
                .and_then(|out| parse_left_right_count(&out))
                .unwrap_or((0, 0)),
            None => (0, 0),
        };

        let changes = match self.run_git_untrimmed(path, ["status", "--porcelain=v1"]) {
            Ok(out) => parse_porcelain_v1(&out),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %format!("{err:#}"), "git status failed");
                Vec::new()
            }
        };

        GitStatus {
            branch,
            upstream,
            ahead,
            behind,
            changes,
        }
    }

    /// Lines added/removed relative to the merge-base with the remote default
    /// branch, plus every line of untracked files.
    pub fn diff_stats(&self, path: &Path) -> DiffStats {
        let base = self.diff_base(path);
        let (additions, deletions) = match self.run_git(path, ["diff", "--shortstat", &base]) {
            Ok(out) => parse_shortstat(&out),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %format!("{err:#}"), "git diff failed");
                (0, 0)
            }
        };

        DiffStats {
            additions: additions + self.untracked_line_count(path),
            deletions,
        }
    }

    fn diff_base(&self, path: &Path) -> String {
        for candidate in DEFAULT_BASE_BRANCHES {
            if let Ok(base) = self.run_git(path, ["merge-base", "HEAD", candidate])
                && !base.is_empty()
            {
                return base;
            }
        }
        "HEAD".to_owned()
    }

    fn untracked_line_count(&self, path: &Path) -> u64 {
        let Ok(out) = self.run_git(path, ["ls-files", "--others", "--exclude-standard"]) else {
            return 0;
        };
        out.lines()
            .map(str::trim)
            .filter(|rel| !rel.is_empty())
            .map(|rel| path.join(rel))
            .filter(|file| !file.is_dir())
            .filter_map(|file| std::fs::read(&file).ok())
            .map(|bytes| count_lines(&bytes))
            .sum()
    }

    pub fn remote_origin_url(&self, path: &Path) -> Option<String> {
        self.run_git(path, ["config", "--get", "remote.origin.url"])
            .ok()
            .filter(|url| !url.is_empty())
    }

    pub fn push_branch(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        self.run_git(
            path,
            ["push", "--force-with-lease", "-u", DEFAULT_REMOTE, branch],
        )
        .map(|_| ())
        .map_err(|err| GitError::CommandFailed(format!("{err:#}")))
    }
}

fn remove_dir_fallback(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to delete worktree directory");
    }
}
