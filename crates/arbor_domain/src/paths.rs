use std::path::{Path, PathBuf};

pub const ARBOR_ROOT_ENV: &str = "ARBOR_ROOT";
pub const ARBOR_CLAUDE_BIN_ENV: &str = "ARBOR_CLAUDE_BIN";
pub const ARBOR_CLAUDE_ROOT_ENV: &str = "ARBOR_CLAUDE_ROOT";
pub const ARBOR_SHELL_ENV: &str = "ARBOR_SHELL";

pub const ARCHIVE_DIR_NAME: &str = ".archived";

pub fn workspaces_file(arbor_root: &Path) -> PathBuf {
    arbor_root.join("workspaces.json")
}

pub fn preferences_file(arbor_root: &Path) -> PathBuf {
    arbor_root.join("preferences.json")
}

pub fn archive_root(worktrees_root: &Path) -> PathBuf {
    worktrees_root.join(ARCHIVE_DIR_NAME)
}

/// Directory in which the assistant CLI keeps session transcripts for a
/// project rooted at `workspace_path`.
pub fn assistant_project_dir(claude_root: &Path, workspace_path: &Path) -> PathBuf {
    claude_root
        .join("projects")
        .join(encode_project_dir_name(workspace_path))
}

pub fn assistant_session_file(
    claude_root: &Path,
    workspace_path: &Path,
    session_id: &str,
) -> PathBuf {
    assistant_project_dir(claude_root, workspace_path).join(format!("{session_id}.jsonl"))
}

fn encode_project_dir_name(workspace_path: &Path) -> String {
    workspace_path
        .to_string_lossy()
        .chars()
        .filter(|ch| *ch != '.')
        .map(|ch| if ch == '/' { '-' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_join_to_expected_files() {
        let base = PathBuf::from("arbor-root");
        assert_eq!(workspaces_file(&base), base.join("workspaces.json"));
        assert_eq!(preferences_file(&base), base.join("preferences.json"));
        assert_eq!(archive_root(&base), base.join(".archived"));
        assert_eq!(ARBOR_ROOT_ENV, "ARBOR_ROOT");
        assert_eq!(ARBOR_CLAUDE_BIN_ENV, "ARBOR_CLAUDE_BIN");
        assert_eq!(ARBOR_CLAUDE_ROOT_ENV, "ARBOR_CLAUDE_ROOT");
    }

    #[test]
    fn assistant_project_dir_replaces_separators_and_drops_dots() {
        let claude = PathBuf::from("/home/dev/.claude");
        let dir = assistant_project_dir(&claude, Path::new("/Users/dev/work.trees/tokyo"));
        assert_eq!(
            dir,
            claude.join("projects").join("-Users-dev-worktrees-tokyo")
        );
    }

    #[test]
    fn assistant_session_file_is_jsonl_under_project_dir() {
        let claude = PathBuf::from("claude-root");
        let file = assistant_session_file(&claude, Path::new("/a/b"), "abc");
        assert_eq!(file, claude.join("projects").join("-a-b").join("abc.jsonl"));
    }
}
