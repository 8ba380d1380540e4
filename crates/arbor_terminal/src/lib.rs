mod appearance;
mod cache;
mod launch;
mod pty;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use appearance::{AppearanceEvent, AppearanceHub};
pub use cache::{
    DEFAULT_TERMINAL_CACHE_CAPACITY, ExitOutcome, MAX_RAPID_EXITS, RAPID_EXIT_WINDOW,
    TerminalCache, TerminalExit, TerminalHandle, TerminalKey, TerminalRole,
};
pub use launch::{LaunchContext, LaunchSpec, assistant_session_id};
pub use pty::{ExitNotifier, NativePtyBackend, PtyBackend, PtyProcess, TerminalSize};
