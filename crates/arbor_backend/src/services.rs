mod editor;
mod git;
mod git_parse;
mod hosting;
mod persistence;
mod workspace_name;
mod workspaces;

pub use git::GitWorktreeService;
pub use hosting::{
    CodeReviewProvider, GitHubProvider, GitLabProvider, code_review_provider,
    project_path_from_remote_url,
};
pub use persistence::Persistence;
pub use workspace_name::{WORKSPACE_NAME_POOL, generate_unique_name, generate_unique_name_with};
pub use workspaces::WorkspaceManager;
