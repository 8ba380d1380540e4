use std::path::PathBuf;

use crate::WorkspaceId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkspaceError {
    #[error("no workspace root directory is configured")]
    NoRootPath,

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),

    #[error("source repository not found: {}", .0.display())]
    SourceRepoNotFound(PathBuf),

    #[error("failed to create directory {}: {message}", .path.display())]
    FailedToCreateDirectory { path: PathBuf, message: String },

    #[error("failed to open editor: {0}")]
    FailedToOpenEditor(String),

    #[error(transparent)]
    Git(#[from] GitError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GitError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("failed to create worktree: {0}")]
    WorktreeCreationFailed(String),

    #[error("failed to remove worktree: {0}")]
    WorktreeRemovalFailed(String),

    #[error("git command failed: {0}")]
    CommandFailed(String),

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostingError {
    #[error("hosting provider is not configured")]
    NotConfigured,

    #[error("cannot derive a project from remote url: {0}")]
    InvalidRemoteUrl(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("api error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_errors_convert_into_workspace_errors() {
        let err: WorkspaceError = GitError::NotARepository(PathBuf::from("/tmp/x")).into();
        assert_eq!(err.to_string(), "not a git repository: /tmp/x");
    }

    #[test]
    fn api_error_includes_code_and_message() {
        let err = HostingError::ApiError {
            code: 404,
            message: "Not Found".to_owned(),
        };
        assert_eq!(err.to_string(), "api error (404): Not Found");
    }
}
