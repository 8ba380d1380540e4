mod appearance;
mod ids;
mod navigation;
mod preferences;
mod session;
mod workspace;

pub use appearance::{
    AppearanceTheme, DEFAULT_TERMINAL_FONT_SIZE, MAX_TERMINAL_FONT_SIZE, MIN_TERMINAL_FONT_SIZE,
    TerminalAppearance, TerminalFont,
};
pub use ids::{RepositoryId, TerminalId, WorkspaceId};
pub use navigation::WorkspaceNavigationHistory;
pub use preferences::{
    DEFAULT_BRANCH_PREFIX, EditorChoice, HostingProviderKind, HostingSettings,
    MAX_RECENT_REPOSITORIES, MAX_RECENT_WORKSPACE_NAMES, Preferences,
};
pub use session::{
    AssistantDescriptor, CI_STATUS_TTL, CiFetchTicket, CiStatusCache, MiddlePaneTab,
    TerminalDescriptor, TerminalFocus, WorkspaceSessionState,
};
pub use workspace::{Workspace, WorkspaceRepository};
