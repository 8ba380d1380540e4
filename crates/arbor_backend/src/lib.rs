mod config;
mod env;
mod services;
#[cfg(test)]
mod test_support;

pub use config::{resolve_arbor_root, resolve_claude_bin, resolve_claude_root, resolve_login_shell};
pub use services::{
    CodeReviewProvider, GitHubProvider, GitLabProvider, GitWorktreeService, Persistence,
    WORKSPACE_NAME_POOL, WorkspaceManager, code_review_provider, generate_unique_name,
    generate_unique_name_with, project_path_from_remote_url,
};
