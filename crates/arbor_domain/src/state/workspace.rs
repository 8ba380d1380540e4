use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{RepositoryId, WorkspaceId};

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRepository {
    pub id: RepositoryId,
    #[serde(rename = "sourceRepoURL")]
    pub source_repo_path: PathBuf,
    pub worktree_path: PathBuf,
    pub branch_name: String,
    #[serde(default)]
    pub is_main_repo: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceRepository {
    pub fn new(source_repo_path: PathBuf, worktree_path: PathBuf, branch_name: String) -> Self {
        Self {
            id: RepositoryId::new(),
            source_repo_path,
            worktree_path,
            branch_name,
            is_main_repo: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub repositories: Vec<WorkspaceRepository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_session_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Workspace {
    /// Builds a single-repository workspace; the repository is marked primary.
    pub fn new(name: String, mut repository: WorkspaceRepository) -> Self {
        repository.is_main_repo = true;
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            name,
            display_name: None,
            repositories: vec![repository],
            claude_session_id: None,
            is_active: false,
            sort_order: 0,
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn effective_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// The repository flagged as main, or the first one when none is flagged.
    pub fn primary_repository(&self) -> Option<&WorkspaceRepository> {
        self.repositories
            .iter()
            .find(|repo| repo.is_main_repo)
            .or_else(|| self.repositories.first())
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.primary_repository()
            .map(|repo| repo.worktree_path.as_path())
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}
