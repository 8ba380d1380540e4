mod config;
mod control;
mod sessions;
mod state;
#[cfg(test)]
mod test_support;

pub use config::{AppConfig, CI_STATUS_REFRESH_INTERVAL, DIFF_STATS_REFRESH_INTERVAL};
pub use control::{AppCommand, AppHandle, AppSnapshot, start};
pub use sessions::SessionStore;
pub use state::{AppEvents, AppState, CiFetchJob, CiFetchResult};
