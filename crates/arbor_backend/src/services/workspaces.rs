use anyhow::Context as _;
use arbor_domain::{
    EditorChoice, GitError, Preferences, Workspace, WorkspaceError, WorkspaceRepository,
    branch_name_for, paths, sanitize_slug,
};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::GitWorktreeService;
use super::editor;
use super::workspace_name::generate_unique_name;

const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Creates, archives and opens workspaces. Blocking; see [`GitWorktreeService`].
#[derive(Clone, Debug, Default)]
pub struct WorkspaceManager {
    git: GitWorktreeService,
}

impl WorkspaceManager {
    pub fn new(git: GitWorktreeService) -> Self {
        Self { git }
    }

    pub fn git(&self) -> &GitWorktreeService {
        &self.git
    }

    fn worktrees_root(preferences: &Preferences) -> Result<PathBuf, WorkspaceError> {
        preferences
            .root_directory
            .clone()
            .ok_or(WorkspaceError::NoRootPath)
    }

    /// Slugs of workspace directories already present under the root.
    fn names_on_disk(root: &Path) -> HashSet<String> {
        let Ok(entries) = std::fs::read_dir(root) else {
            return HashSet::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(ToOwned::to_owned))
            .filter(|name| name != paths::ARCHIVE_DIR_NAME)
            .collect()
    }

    pub fn create_workspace(
        &self,
        source_repo: &Path,
        preferences: &Preferences,
    ) -> Result<Workspace, WorkspaceError> {
        let root = Self::worktrees_root(preferences)?;
        let existing = Self::names_on_disk(&root);
        let name = generate_unique_name(&preferences.recent_workspace_names, &existing);
        self.create_workspace_named(source_repo, preferences, &name)
    }

    pub fn create_workspace_named(
        &self,
        source_repo: &Path,
        preferences: &Preferences,
        name: &str,
    ) -> Result<Workspace, WorkspaceError> {
        let root = Self::worktrees_root(preferences)?;
        if !source_repo.exists() {
            return Err(WorkspaceError::SourceRepoNotFound(source_repo.to_path_buf()));
        }
        if !self.git.is_repository(source_repo) {
            return Err(GitError::NotARepository(source_repo.to_path_buf()).into());
        }

        std::fs::create_dir_all(&root).map_err(|err| WorkspaceError::FailedToCreateDirectory {
            path: root.clone(),
            message: err.to_string(),
        })?;

        let slug = sanitize_slug(name);
        let worktree_path = root.join(&slug);
        if worktree_path.exists() {
            return Err(GitError::WorktreeCreationFailed(format!(
                "destination already exists: {}",
                worktree_path.display()
            ))
            .into());
        }
        let branch_name = branch_name_for(&preferences.branch_prefix, &slug);

        let start_point = self.git.default_start_point(source_repo);
        self.git.create_worktree(
            source_repo,
            &worktree_path,
            &branch_name,
            start_point.as_deref(),
        )?;

        let repository =
            WorkspaceRepository::new(source_repo.to_path_buf(), worktree_path, branch_name);
        let workspace = Workspace::new(name.to_owned(), repository);
        tracing::info!(
            workspace_id = %workspace.id,
            name,
            root = ?workspace.root_path(),
            "workspace created"
        );
        Ok(workspace)
    }

    /// Moves every worktree of `workspace` under `.archived/` next to it and
    /// prunes the source repositories. Returns the archive locations.
    pub fn delete_workspace(&self, workspace: &Workspace) -> Vec<PathBuf> {
        let mut archived = Vec::new();
        for repo in &workspace.repositories {
            self.prune_logged(&repo.source_repo_path);
            match self.archive_worktree(&repo.worktree_path) {
                Ok(Some(dest)) => archived.push(dest),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        worktree = %repo.worktree_path.display(),
                        error = %format!("{err:#}"),
                        "archiving failed; removing worktree instead"
                    );
                    self.git
                        .remove_worktree(&repo.worktree_path, &repo.source_repo_path);
                }
            }
            self.prune_logged(&repo.source_repo_path);
        }
        tracing::info!(workspace_id = %workspace.id, archived = archived.len(), "workspace deleted");
        archived
    }

    fn prune_logged(&self, source_repo: &Path) {
        if let Err(err) = self.git.prune_worktrees(source_repo) {
            tracing::warn!(repo = %source_repo.display(), error = %err, "worktree prune failed");
        }
    }

    fn archive_worktree(&self, worktree_path: &Path) -> anyhow::Result<Option<PathBuf>> {
        if !worktree_path.exists() {
            return Ok(None);
        }
        let parent = worktree_path
            .parent()
            .context("worktree path has no parent")?;
        let name = worktree_path
            .file_name()
            .context("worktree path has no file name")?
            .to_string_lossy()
            .into_owned();
        let archive_root = paths::archive_root(parent);
        std::fs::create_dir_all(&archive_root)
            .with_context(|| format!("failed to create {}", archive_root.display()))?;

        let stamp = Utc::now().format(ARCHIVE_TIMESTAMP_FORMAT).to_string();
        let mut dest = archive_root.join(format!("{name}-{stamp}"));
        let mut attempt = 2;
        while dest.exists() {
            dest = archive_root.join(format!("{name}-{stamp}-{attempt}"));
            attempt += 1;
        }

        std::fs::rename(worktree_path, &dest).with_context(|| {
            format!(
                "failed to move {} to {}",
                worktree_path.display(),
                dest.display()
            )
        })?;
        Ok(Some(dest))
    }

    pub fn open_in_external_editor(
        &self,
        workspace: &Workspace,
        editor: EditorChoice,
    ) -> Result<(), WorkspaceError> {
        let root = workspace
            .root_path()
            .ok_or(WorkspaceError::WorkspaceNotFound(workspace.id))?;
        editor::open_in_editor(editor, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{init_repo_with_commit, run_git, temp_test_dir};

    fn prefs(root: &Path) -> Preferences {
        Preferences {
            root_directory: Some(root.to_path_buf()),
            branch_prefix: "dev".to_owned(),
            ..Preferences::default()
        }
    }

    #[test]
    fn create_then_delete_archives_worktree() {
        let base = temp_test_dir("manager-tokyo");
        let repo = base.join("repo");
        init_repo_with_commit(&repo);
        let root = base.join("workspaces");

        let manager = WorkspaceManager::default();
        let workspace = manager
            .create_workspace_named(&repo, &prefs(&root), "Tokyo")
            .expect("workspace should be created");

        let worktree = root.join("tokyo");
        assert_eq!(workspace.root_path(), Some(worktree.as_path()));
        assert_eq!(workspace.repositories.len(), 1);
        assert!(workspace.repositories[0].is_main_repo);
        assert_eq!(workspace.repositories[0].branch_name, "dev/tokyo");
        assert_eq!(
            manager.git().status(&worktree).branch,
            "dev/tokyo",
            "worktree should be on the workspace branch"
        );

        let archived = manager.delete_workspace(&workspace);
        assert!(!worktree.exists());
        assert_eq!(archived.len(), 1);
        let archived = &archived[0];
        assert!(archived.exists());
        assert_eq!(archived.parent(), Some(root.join(".archived").as_path()));
        let archived_name = archived
            .file_name()
            .expect("file name")
            .to_string_lossy()
            .into_owned();
        let stamp = archived_name
            .strip_prefix("tokyo-")
            .expect("archive keeps the original name");
        assert_eq!(stamp.len(), "20240101T000000".len());
        assert_eq!(stamp.as_bytes()[8], b'T');
        assert!(archived.join("README.md").exists());

        let list = run_git(&repo, &["worktree", "list", "--porcelain"]);
        let list = String::from_utf8_lossy(&list.stdout);
        assert!(
            !list.contains("tokyo"),
            "pruned worktree should be gone from git: {list}"
        );

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn create_workspace_picks_name_not_on_disk() {
        let base = temp_test_dir("manager-unique");
        let repo = base.join("repo");
        init_repo_with_commit(&repo);
        let root = base.join("workspaces");

        let manager = WorkspaceManager::default();
        let first = manager
            .create_workspace(&repo, &prefs(&root))
            .expect("first workspace");
        let second = manager
            .create_workspace(&repo, &prefs(&root))
            .expect("second workspace");
        assert_ne!(sanitize_slug(&first.name), sanitize_slug(&second.name));

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn create_workspace_requires_root_directory() {
        let manager = WorkspaceManager::default();
        let err = manager
            .create_workspace(Path::new("/nowhere"), &Preferences::default())
            .expect_err("no root configured");
        assert_eq!(err, WorkspaceError::NoRootPath);
    }

    #[test]
    fn create_workspace_validates_source_repository() {
        let base = temp_test_dir("manager-invalid-source");
        let manager = WorkspaceManager::default();
        let root = base.join("workspaces");

        let missing = base.join("missing");
        let err = manager
            .create_workspace_named(&missing, &prefs(&root), "Oslo")
            .expect_err("missing source");
        assert_eq!(err, WorkspaceError::SourceRepoNotFound(missing));

        let plain = base.join("plain");
        std::fs::create_dir_all(&plain).expect("mkdir");
        let err = manager
            .create_workspace_named(&plain, &prefs(&root), "Oslo")
            .expect_err("plain dir");
        assert_eq!(err, WorkspaceError::Git(GitError::NotARepository(plain)));

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn delete_workspace_tolerates_missing_worktree() {
        let base = temp_test_dir("manager-missing-worktree");
        let repo = base.join("repo");
        init_repo_with_commit(&repo);
        let root = base.join("workspaces");

        let manager = WorkspaceManager::default();
        let workspace = manager
            .create_workspace_named(&repo, &prefs(&root), "Lima")
            .expect("create");
        std::fs::remove_dir_all(root.join("lima")).expect("remove by hand");

        assert!(manager.delete_workspace(&workspace).is_empty());

        let _ = std::fs::remove_dir_all(&base);
    }
}
