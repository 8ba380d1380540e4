mod code_review;
pub use code_review::{CodeReview, CodeReviewState, Pipeline, PipelineStatus};

mod errors;
pub use errors::{GitError, HostingError, WorkspaceError};

mod git_status;
pub use git_status::{DiffStats, FileChange, FileChangeKind, GitStatus};

pub mod paths;

mod slug;
pub use slug::{branch_name_for, sanitize_slug};

mod state;
pub use state::*;
