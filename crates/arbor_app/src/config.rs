use arbor_terminal::{DEFAULT_TERMINAL_CACHE_CAPACITY, LaunchContext};
use std::path::PathBuf;
use std::time::Duration;

pub const DIFF_STATS_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const CI_STATUS_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Holds `workspaces.json` and `preferences.json`.
    pub arbor_root: PathBuf,
    pub launch: LaunchContext,
    pub terminal_capacity: usize,
    pub diff_refresh_interval: Duration,
    pub ci_refresh_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            arbor_root: arbor_backend::resolve_arbor_root()?,
            launch: LaunchContext {
                shell: arbor_backend::resolve_login_shell()?,
                assistant_bin: arbor_backend::resolve_claude_bin()?,
                assistant_root: arbor_backend::resolve_claude_root()?,
            },
            terminal_capacity: DEFAULT_TERMINAL_CACHE_CAPACITY,
            diff_refresh_interval: DIFF_STATS_REFRESH_INTERVAL,
            ci_refresh_interval: CI_STATUS_REFRESH_INTERVAL,
        })
    }
}
