use anyhow::Context as _;
use arbor_backend::{
    CodeReviewProvider, GitWorktreeService, Persistence, WorkspaceManager, code_review_provider,
};
use arbor_domain::{
    AppearanceTheme, CiFetchTicket, CodeReview, DiffStats, GitError, HostingError,
    HostingSettings, Preferences, TerminalFont, TerminalId, Workspace, WorkspaceError,
    WorkspaceId, WorkspaceNavigationHistory, WorkspaceSessionState,
};
use arbor_terminal::{
    AppearanceEvent, AppearanceHub, ExitOutcome, PtyBackend, TerminalCache, TerminalExit,
    TerminalHandle, TerminalKey, assistant_session_id,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::control::AppCommand;
use crate::sessions::SessionStore;

/// Receivers the control loop drains alongside commands.
pub struct AppEvents {
    pub terminal_exits: mpsc::UnboundedReceiver<TerminalExit>,
    pub appearance: broadcast::Receiver<AppearanceEvent>,
}

/// A claimed CI lookup, ready to run off the control thread.
pub struct CiFetchJob {
    ticket: CiFetchTicket,
    provider: Arc<dyn CodeReviewProvider>,
    git: GitWorktreeService,
    worktree_path: PathBuf,
    branch: String,
}

#[derive(Debug)]
pub struct CiFetchResult {
    pub ticket: CiFetchTicket,
    pub result: Result<Option<CodeReview>, String>,
}

impl CiFetchJob {
    pub fn ticket(&self) -> CiFetchTicket {
        self.ticket
    }

    /// Blocks on git and the hosting provider.
    pub fn run(self) -> CiFetchResult {
        let result = match self.git.remote_origin_url(&self.worktree_path) {
            None => Err("repository has no origin remote".to_owned()),
            Some(remote) => self
                .provider
                .find_code_review_for_remote(&remote, &self.branch)
                .map_err(|err| err.to_string()),
        };
        CiFetchResult {
            ticket: self.ticket,
            result,
        }
    }
}

/// The application's single source of truth: workspaces, selection,
/// navigation history, preferences, per-workspace sessions and the
/// terminal cache. Owned by the control loop.
pub struct AppState {
    config: AppConfig,
    persistence: Persistence,
    manager: WorkspaceManager,
    workspaces: Vec<Workspace>,
    selected: Option<WorkspaceId>,
    history: WorkspaceNavigationHistory,
    preferences: Preferences,
    sessions: SessionStore,
    terminals: TerminalCache,
    appearance: Arc<AppearanceHub>,
    code_reviews: Option<Arc<dyn CodeReviewProvider>>,
    refreshers: Vec<JoinHandle<()>>,
}

impl AppState {
    pub async fn load(
        config: AppConfig,
        pty_backend: Arc<dyn PtyBackend>,
    ) -> anyhow::Result<(Self, AppEvents)> {
        let persistence = Persistence::new(config.arbor_root.clone());
        let store = persistence.clone();
        let (workspaces, preferences) = tokio::task::spawn_blocking(move || {
            let workspaces = store.load_workspaces()?;
            let preferences = store.load_preferences().unwrap_or_else(|err| {
                tracing::warn!(error = %format!("{err:#}"), "failed to load preferences; using defaults");
                Preferences::default()
            });
            anyhow::Ok((workspaces, preferences))
        })
        .await
        .context("failed to join load task")??;

        let appearance = Arc::new(AppearanceHub::new(preferences.terminal_appearance()));
        let appearance_rx = appearance.subscribe();
        let (terminals, terminal_exits) = TerminalCache::new(
            pty_backend,
            config.launch.clone(),
            config.terminal_capacity,
            preferences.terminal_appearance(),
        );
        let code_reviews = build_code_review_provider(&preferences.hosting);

        let mut state = Self {
            config,
            persistence,
            manager: WorkspaceManager::default(),
            workspaces,
            selected: None,
            history: WorkspaceNavigationHistory::new(),
            preferences,
            sessions: SessionStore::default(),
            terminals,
            appearance,
            code_reviews,
            refreshers: Vec::new(),
        };

        if let Some(id) = state.workspaces.iter().find(|w| w.is_active).map(|w| w.id) {
            state.activate(id, true)?;
        }
        tracing::info!(
            workspaces = state.workspaces.len(),
            selected = ?state.selected,
            "app state loaded"
        );

        Ok((
            state,
            AppEvents {
                terminal_exits,
                appearance: appearance_rx,
            },
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn workspace(&self, workspace_id: WorkspaceId) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == workspace_id)
    }

    fn index_of(&self, workspace_id: WorkspaceId) -> Result<usize, WorkspaceError> {
        self.workspaces
            .iter()
            .position(|w| w.id == workspace_id)
            .ok_or(WorkspaceError::WorkspaceNotFound(workspace_id))
    }

    pub fn selected_workspace_id(&self) -> Option<WorkspaceId> {
        self.selected
    }

    pub fn history(&self) -> &WorkspaceNavigationHistory {
        &self.history
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn terminals(&self) -> &TerminalCache {
        &self.terminals
    }

    pub fn appearance_hub(&self) -> Arc<AppearanceHub> {
        self.appearance.clone()
    }

    pub fn session_state(&self, workspace_id: WorkspaceId) -> Option<&WorkspaceSessionState> {
        self.sessions.get(workspace_id)
    }

    pub fn session_state_mut(
        &mut self,
        workspace_id: WorkspaceId,
    ) -> Option<&mut WorkspaceSessionState> {
        self.sessions.get_mut(workspace_id)
    }

    async fn save_workspaces(&self) {
        let store = self.persistence.clone();
        let workspaces = self.workspaces.clone();
        let saved = tokio::task::spawn_blocking(move || store.save_workspaces(&workspaces)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to save workspaces")
            }
            Err(err) => tracing::warn!(error = %err, "failed to join save task"),
        }
    }

    async fn save_preferences(&self) {
        let store = self.persistence.clone();
        let preferences = self.preferences.clone();
        let saved =
            tokio::task::spawn_blocking(move || store.save_preferences(&preferences)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to save preferences")
            }
            Err(err) => tracing::warn!(error = %err, "failed to join save task"),
        }
    }

    /// Makes `workspace_id` current without persisting. History is only
    /// pushed for user-initiated selection, never for back/forward.
    fn activate(
        &mut self,
        workspace_id: WorkspaceId,
        record_history: bool,
    ) -> Result<(), WorkspaceError> {
        let index = self.index_of(workspace_id)?;
        for workspace in &mut self.workspaces {
            workspace.is_active = workspace.id == workspace_id;
        }
        self.workspaces[index].touch();
        self.selected = Some(workspace_id);
        if record_history {
            self.history.push(workspace_id);
        }
        self.terminals.set_active_workspace(Some(workspace_id));
        self.sessions.get_or_create(&self.workspaces[index]);
        Ok(())
    }

    pub async fn select_workspace(&mut self, workspace_id: WorkspaceId) -> Result<(), WorkspaceError> {
        self.activate(workspace_id, true)?;
        self.save_workspaces().await;
        Ok(())
    }

    pub async fn go_back(&mut self) -> Option<WorkspaceId> {
        let target = self.history.go_back()?;
        self.navigate_to(target).await
    }

    pub async fn go_forward(&mut self) -> Option<WorkspaceId> {
        let target = self.history.go_forward()?;
        self.navigate_to(target).await
    }

    async fn navigate_to(&mut self, target: WorkspaceId) -> Option<WorkspaceId> {
        if let Err(err) = self.activate(target, false) {
            tracing::warn!(workspace_id = %target, error = %err, "history entry no longer exists");
            return None;
        }
        self.save_workspaces().await;
        Some(target)
    }

    pub async fn create_workspace(&mut self, source_repo: PathBuf) -> Result<WorkspaceId, WorkspaceError> {
        self.create_workspace_with_name(source_repo, None).await
    }

    pub async fn create_workspace_named(
        &mut self,
        source_repo: PathBuf,
        name: String,
    ) -> Result<WorkspaceId, WorkspaceError> {
        self.create_workspace_with_name(source_repo, Some(name)).await
    }

    async fn create_workspace_with_name(
        &mut self,
        source_repo: PathBuf,
        name: Option<String>,
    ) -> Result<WorkspaceId, WorkspaceError> {
        let manager = self.manager.clone();
        let preferences = self.preferences.clone();
        let source = source_repo.clone();
        let mut workspace = tokio::task::spawn_blocking(move || match name {
            Some(name) => manager.create_workspace_named(&source, &preferences, &name),
            None => manager.create_workspace(&source, &preferences),
        })
        .await
        .map_err(|err| GitError::WorktreeCreationFailed(format!("worktree task failed: {err}")))??;

        workspace.sort_order = self
            .workspaces
            .iter()
            .map(|w| w.sort_order)
            .max()
            .map_or(0, |max| max + 1);
        workspace.claude_session_id = Some(assistant_session_id(workspace.id));
        let workspace_id = workspace.id;

        self.preferences.record_recent_repository(source_repo);
        self.preferences.record_recent_workspace_name(&workspace.name);
        self.workspaces.push(workspace);
        self.activate(workspace_id, true)?;

        self.save_workspaces().await;
        self.save_preferences().await;
        Ok(workspace_id)
    }

    /// Kills the workspace's terminals, drops its session, archives its
    /// worktrees and forgets it. Returns where the worktrees were archived.
    pub async fn delete_workspace(
        &mut self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        let index = self.index_of(workspace_id)?;
        let killed = self.terminals.remove_all_terminals(workspace_id);
        self.sessions.remove(workspace_id);
        self.history.remove(workspace_id);
        let workspace = self.workspaces.remove(index);

        if self.selected == Some(workspace_id) {
            self.selected = None;
            self.terminals.set_active_workspace(None);
            if let Some(next) = self.history.current() {
                self.activate(next, false)?;
            } else if let Some(next) = self.workspaces.first().map(|w| w.id) {
                self.activate(next, true)?;
            }
        }

        let manager = self.manager.clone();
        let archived = tokio::task::spawn_blocking(move || manager.delete_workspace(&workspace))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to join archive task");
                Vec::new()
            });
        tracing::info!(
            workspace_id = %workspace_id,
            killed_terminals = killed,
            "workspace removed"
        );

        self.save_workspaces().await;
        Ok(archived)
    }

    /// Moves a workspace to `to_index` (clamped) and renumbers sort order.
    pub async fn move_workspace(
        &mut self,
        workspace_id: WorkspaceId,
        to_index: usize,
    ) -> Result<(), WorkspaceError> {
        let from = self.index_of(workspace_id)?;
        let workspace = self.workspaces.remove(from);
        let to = to_index.min(self.workspaces.len());
        self.workspaces.insert(to, workspace);
        for (order, workspace) in self.workspaces.iter_mut().enumerate() {
            workspace.sort_order = order as i64;
        }
        self.save_workspaces().await;
        Ok(())
    }

    /// A blank name clears the display name.
    pub async fn rename_workspace(
        &mut self,
        workspace_id: WorkspaceId,
        display_name: &str,
    ) -> Result<(), WorkspaceError> {
        let index = self.index_of(workspace_id)?;
        let trimmed = display_name.trim();
        self.workspaces[index].display_name = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self.save_workspaces().await;
        Ok(())
    }

    pub async fn open_in_editor(&self, workspace_id: WorkspaceId) -> Result<(), WorkspaceError> {
        let index = self.index_of(workspace_id)?;
        let workspace = self.workspaces[index].clone();
        let editor = self.preferences.editor;
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || manager.open_in_external_editor(&workspace, editor))
            .await
            .map_err(|err| WorkspaceError::FailedToOpenEditor(err.to_string()))?
    }

    pub async fn set_root_directory(&mut self, root: PathBuf) {
        self.preferences.root_directory = Some(root);
        self.save_preferences().await;
    }

    pub async fn set_hosting(&mut self, settings: HostingSettings) {
        self.code_reviews = build_code_review_provider(&settings);
        self.preferences.hosting = settings;
        self.save_preferences().await;
    }

    /// Overrides the provider built from preferences.
    pub fn set_code_review_provider(&mut self, provider: Option<Arc<dyn CodeReviewProvider>>) {
        self.code_reviews = provider;
    }

    pub fn assistant_terminal(
        &mut self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        let (root, session_id) = self.assistant_launch(workspace_id)?;
        self.terminals
            .get_or_create_assistant_terminal(workspace_id, &root, &session_id)
    }

    fn assistant_launch(&self, workspace_id: WorkspaceId) -> anyhow::Result<(PathBuf, String)> {
        let workspace = self
            .workspace(workspace_id)
            .ok_or(WorkspaceError::WorkspaceNotFound(workspace_id))?;
        let root = workspace
            .root_path()
            .context("workspace has no repositories")?
            .to_path_buf();
        let session_id = workspace
            .claude_session_id
            .clone()
            .unwrap_or_else(|| assistant_session_id(workspace_id));
        Ok((root, session_id))
    }

    pub fn add_terminal(&mut self, workspace_id: WorkspaceId) -> Result<TerminalId, WorkspaceError> {
        let workspace = self
            .workspaces
            .iter()
            .find(|w| w.id == workspace_id)
            .ok_or(WorkspaceError::WorkspaceNotFound(workspace_id))?;
        let session = self
            .sessions
            .get_or_create(workspace)
            .ok_or(WorkspaceError::WorkspaceNotFound(workspace_id))?;
        let root = session
            .assistant
            .as_ref()
            .map(|a| a.working_directory.clone())
            .unwrap_or_default();
        Ok(session.add_terminal(root, None, Vec::new()))
    }

    pub fn additional_terminal(
        &mut self,
        workspace_id: WorkspaceId,
        terminal_id: TerminalId,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        let descriptor = self
            .sessions
            .get(workspace_id)
            .and_then(|session| session.terminal(terminal_id))
            .cloned()
            .context("terminal is not part of the workspace session")?;
        self.terminals
            .get_or_create_additional_terminal(workspace_id, &descriptor)
    }

    /// Closes the tab and kills its process.
    pub fn close_terminal(&mut self, workspace_id: WorkspaceId, terminal_id: TerminalId) -> bool {
        let closed = self
            .sessions
            .get_mut(workspace_id)
            .and_then(|session| session.close_terminal(terminal_id))
            .is_some();
        let killed = self
            .terminals
            .remove_terminal(&TerminalKey::additional(workspace_id, terminal_id));
        closed || killed
    }

    /// Starts a fresh assistant in the workspace root, replacing any cached one.
    pub fn restart_assistant(
        &mut self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        let (root, session_id) = self.assistant_launch(workspace_id)?;
        self.terminals
            .restart_assistant(workspace_id, &root, &session_id)
    }

    pub fn handle_terminal_exit(&mut self, exit: TerminalExit) -> ExitOutcome {
        self.terminals.handle_exit(exit)
    }

    /// Recomputes diff stats for the selected workspace only.
    pub async fn refresh_diff_stats(&mut self) -> Option<DiffStats> {
        let workspace_id = self.selected?;
        let root = self.workspace(workspace_id)?.root_path()?.to_path_buf();
        let git = self.manager.git().clone();
        let stats = match tokio::task::spawn_blocking(move || git.diff_stats(&root)).await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "diff stats task failed");
                return None;
            }
        };
        tracing::debug!(
            workspace_id = %workspace_id,
            additions = stats.additions,
            deletions = stats.deletions,
            "diff stats refreshed"
        );
        if let Some(session) = self.sessions.get_mut(workspace_id) {
            session.diff_stats = Some(stats);
        }
        Some(stats)
    }

    /// Claims a CI lookup for the selected workspace. Returns `None` when no
    /// provider is configured, the cached status is still fresh, or a lookup
    /// is already in flight (unless `force`).
    pub fn begin_ci_refresh(&mut self, force: bool) -> Option<CiFetchJob> {
        let workspace_id = self.selected?;
        let provider = self.code_reviews.clone()?;
        let workspace = self.workspaces.iter().find(|w| w.id == workspace_id)?;
        let repository = workspace.primary_repository()?;
        let session = self.sessions.get_or_create(workspace)?;
        if !force && !session.ci_needs_refresh(Instant::now()) {
            return None;
        }
        let ticket = session.begin_ci_fetch(force)?;
        Some(CiFetchJob {
            ticket,
            provider,
            git: self.manager.git().clone(),
            worktree_path: repository.worktree_path.clone(),
            branch: repository.branch_name.clone(),
        })
    }

    /// Stores a finished lookup. Returns `false` if it was superseded or its
    /// workspace is gone.
    pub fn apply_ci_result(&mut self, fetched: CiFetchResult) -> bool {
        let workspace_id = fetched.ticket.workspace_id;
        if let Err(message) = &fetched.result {
            tracing::warn!(workspace_id = %workspace_id, error = %message, "code review lookup failed");
        }
        let Some(session) = self.sessions.get_mut(workspace_id) else {
            return false;
        };
        session.complete_ci_fetch(fetched.ticket, fetched.result, Instant::now())
    }

    pub async fn refresh_ci_status(&mut self, force: bool) -> bool {
        let Some(job) = self.begin_ci_refresh(force) else {
            return false;
        };
        let ticket = job.ticket();
        let fetched = tokio::task::spawn_blocking(move || job.run())
            .await
            .unwrap_or_else(|err| CiFetchResult {
                ticket,
                result: Err(format!("code review task failed: {err}")),
            });
        self.apply_ci_result(fetched)
    }

    pub async fn set_theme(&mut self, theme: AppearanceTheme) {
        self.preferences.theme = theme;
        self.appearance.publish_theme(theme);
        self.save_preferences().await;
    }

    pub async fn set_font(&mut self, size: u16, family: Option<String>) {
        let font = TerminalFont::new(size, family);
        self.preferences.terminal_font_size = font.size;
        self.preferences.terminal_font_family = font.family.clone();
        self.appearance.publish_font(font);
        self.save_preferences().await;
    }

    pub fn apply_appearance_event(&mut self, event: AppearanceEvent) {
        match event {
            AppearanceEvent::Theme(theme) => self.terminals.apply_theme(theme),
            AppearanceEvent::Font(font) => self.terminals.apply_font(font),
        }
    }

    /// Reapplies the hub's current appearance after missed events.
    pub fn resync_appearance(&mut self) {
        let current = self.appearance.current();
        self.terminals.apply_theme(current.theme);
        self.terminals.apply_font(current.font);
    }

    /// Starts the diff-stat and CI tickers. Any previous tickers are stopped.
    pub fn spawn_refreshers(&mut self, tx: mpsc::Sender<AppCommand>) {
        self.stop_refreshers();
        self.refreshers.push(spawn_ticker(
            self.config.diff_refresh_interval,
            tx.clone(),
            || AppCommand::RefreshDiffStats,
        ));
        self.refreshers.push(spawn_ticker(
            self.config.ci_refresh_interval,
            tx,
            || AppCommand::RefreshCiStatus { force: false },
        ));
    }

    pub fn running_refreshers(&self) -> usize {
        self.refreshers.iter().filter(|h| !h.is_finished()).count()
    }

    fn stop_refreshers(&mut self) {
        for handle in self.refreshers.drain(..) {
            handle.abort();
        }
    }

    /// Stops background work, kills every terminal and flushes state.
    pub async fn shutdown(&mut self) {
        self.stop_refreshers();
        let cached = self.terminals.len();
        self.terminals.clear();
        self.save_workspaces().await;
        self.save_preferences().await;
        tracing::info!(killed_terminals = cached, "app state shut down");
    }
}

fn spawn_ticker(
    period: Duration,
    tx: mpsc::Sender<AppCommand>,
    command: fn() -> AppCommand,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tx.send(command()).await.is_err() {
                break;
            }
        }
    })
}

fn build_code_review_provider(settings: &HostingSettings) -> Option<Arc<dyn CodeReviewProvider>> {
    match code_review_provider(settings) {
        Ok(provider) => Some(Arc::from(provider)),
        Err(HostingError::NotConfigured) => None,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring invalid hosting settings");
            None
        }
    }
}
