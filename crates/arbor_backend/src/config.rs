use arbor_domain::paths;
use std::path::PathBuf;

use crate::env::{home_dir, optional_trimmed_path_from_env};

fn resolve_root_from_env_or_default(
    env_name: &str,
    default: impl FnOnce() -> anyhow::Result<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(root) = optional_trimmed_path_from_env(env_name)? {
        return Ok(root);
    }

    default()
}

/// Directory holding `workspaces.json` and `preferences.json`.
pub fn resolve_arbor_root() -> anyhow::Result<PathBuf> {
    resolve_root_from_env_or_default(paths::ARBOR_ROOT_ENV, || {
        if cfg!(test) {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let pid = std::process::id();
            return Ok(std::env::temp_dir().join(format!("arbor-test-{pid}-{nanos}")));
        }

        Ok(home_dir()?.join(".arbor"))
    })
}

pub fn resolve_claude_root() -> anyhow::Result<PathBuf> {
    resolve_root_from_env_or_default(paths::ARBOR_CLAUDE_ROOT_ENV, || {
        if cfg!(test) {
            return Ok(PathBuf::from(".claude"));
        }

        Ok(home_dir()?.join(".claude"))
    })
}

pub fn resolve_claude_bin() -> anyhow::Result<PathBuf> {
    resolve_root_from_env_or_default(paths::ARBOR_CLAUDE_BIN_ENV, || Ok(PathBuf::from("claude")))
}

pub fn resolve_login_shell() -> anyhow::Result<PathBuf> {
    resolve_root_from_env_or_default(paths::ARBOR_SHELL_ENV, || {
        let shell = std::env::var_os("SHELL")
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("/bin/zsh"));
        Ok(shell)
    })
}
