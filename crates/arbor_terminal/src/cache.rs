use arbor_domain::{
    AppearanceTheme, TerminalAppearance, TerminalDescriptor, TerminalFont, TerminalId, WorkspaceId,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

use crate::launch::{LaunchContext, LaunchSpec};
use crate::pty::{ExitNotifier, PtyBackend, PtyProcess, TerminalSize};

pub const DEFAULT_TERMINAL_CACHE_CAPACITY: usize = 10;

/// An assistant that exits sooner than this after starting counts as a
/// rapid exit.
pub const RAPID_EXIT_WINDOW: Duration = Duration::from_secs(5);
/// Consecutive rapid exits after which the assistant is left stopped.
pub const MAX_RAPID_EXITS: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TerminalRole {
    Assistant,
    Additional(TerminalId),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TerminalKey {
    pub workspace_id: WorkspaceId,
    pub role: TerminalRole,
}

impl TerminalKey {
    pub fn assistant(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            role: TerminalRole::Assistant,
        }
    }

    pub fn additional(workspace_id: WorkspaceId, terminal_id: TerminalId) -> Self {
        Self {
            workspace_id,
            role: TerminalRole::Additional(terminal_id),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == TerminalRole::Assistant
    }
}

/// Sent when a cached process exits. `generation` identifies which spawn of
/// the key exited, so exits of killed or replaced processes can be ignored.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TerminalExit {
    pub key: TerminalKey,
    pub generation: u64,
}

#[derive(Debug)]
pub enum ExitOutcome {
    /// The exit belonged to a process that is no longer cached.
    Stale,
    Restarted(Arc<TerminalHandle>),
    /// A non-assistant terminal exited, or the assistant could not be kept
    /// running. The entry stays cached until closed or restarted.
    Exited,
}

/// Shared view of one live terminal.
pub struct TerminalHandle {
    key: TerminalKey,
    generation: u64,
    working_directory: PathBuf,
    process: Box<dyn PtyProcess>,
    appearance: Mutex<TerminalAppearance>,
}

impl std::fmt::Debug for TerminalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("working_directory", &self.working_directory)
            .finish_non_exhaustive()
    }
}

impl TerminalHandle {
    pub fn key(&self) -> TerminalKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn appearance(&self) -> TerminalAppearance {
        self.appearance
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn update_appearance(&self, update: impl FnOnce(&mut TerminalAppearance)) {
        update(&mut self.appearance.lock().unwrap_or_else(|err| err.into_inner()));
    }

    pub fn write_input(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.process.write_input(bytes)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.process.resize(TerminalSize { cols, rows })
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.process.subscribe_output()
    }

    pub fn snapshot_output_history(&self) -> Vec<Vec<u8>> {
        self.process.snapshot_output_history()
    }

    pub fn is_terminated(&self) -> bool {
        self.process.is_terminated()
    }

    fn kill(&self) {
        self.process.kill();
    }
}

#[derive(Clone, Debug)]
enum LaunchRecipe {
    Assistant {
        workspace_root: PathBuf,
        session_id: String,
    },
    Additional(TerminalDescriptor),
}

impl LaunchRecipe {
    fn resolve(&self, ctx: &LaunchContext) -> LaunchSpec {
        match self {
            Self::Assistant {
                workspace_root,
                session_id,
            } => LaunchSpec::assistant(ctx, workspace_root, session_id),
            Self::Additional(descriptor) => LaunchSpec::additional(ctx, descriptor),
        }
    }
}

struct CacheEntry {
    handle: Arc<TerminalHandle>,
    recipe: LaunchRecipe,
    last_accessed_at: u64,
    spawned_at: Instant,
    rapid_exits: u32,
}

/// Keeps terminal processes alive across workspace switches.
///
/// Bounded to `capacity` entries. When an insert would exceed it, the least
/// recently accessed entries outside the active workspace are killed first;
/// entries of the active workspace are never evicted, so the cache may grow
/// past capacity while they alone fill it.
pub struct TerminalCache {
    backend: Arc<dyn PtyBackend>,
    launch: LaunchContext,
    capacity: usize,
    entries: HashMap<TerminalKey, CacheEntry>,
    active_workspace: Option<WorkspaceId>,
    appearance: TerminalAppearance,
    access_clock: u64,
    next_generation: u64,
    exit_tx: mpsc::UnboundedSender<TerminalExit>,
}

impl TerminalCache {
    /// Exit notifications arrive on the returned receiver; feed them to
    /// [`TerminalCache::handle_exit`].
    pub fn new(
        backend: Arc<dyn PtyBackend>,
        launch: LaunchContext,
        capacity: usize,
        appearance: TerminalAppearance,
    ) -> (Self, mpsc::UnboundedReceiver<TerminalExit>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let cache = Self {
            backend,
            launch,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            active_workspace: None,
            appearance,
            access_clock: 0,
            next_generation: 0,
            exit_tx,
        };
        (cache, exit_rx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &TerminalKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &TerminalKey) -> Option<Arc<TerminalHandle>> {
        self.entries.get(key).map(|entry| entry.handle.clone())
    }

    pub fn active_workspace(&self) -> Option<WorkspaceId> {
        self.active_workspace
    }

    pub fn set_active_workspace(&mut self, workspace_id: Option<WorkspaceId>) {
        self.active_workspace = workspace_id;
    }

    pub fn get_or_create_assistant_terminal(
        &mut self,
        workspace_id: WorkspaceId,
        workspace_root: &Path,
        session_id: &str,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        let recipe = LaunchRecipe::Assistant {
            workspace_root: workspace_root.to_path_buf(),
            session_id: session_id.to_owned(),
        };
        self.get_or_create(TerminalKey::assistant(workspace_id), recipe)
    }

    pub fn get_or_create_additional_terminal(
        &mut self,
        workspace_id: WorkspaceId,
        descriptor: &TerminalDescriptor,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        self.get_or_create(
            TerminalKey::additional(workspace_id, descriptor.id),
            LaunchRecipe::Additional(descriptor.clone()),
        )
    }

    fn get_or_create(
        &mut self,
        key: TerminalKey,
        recipe: LaunchRecipe,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        let now = self.tick();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_accessed_at = now;
            return Ok(entry.handle.clone());
        }

        self.evict_for_insert();
        let handle = self.spawn(key, &recipe)?;
        tracing::info!(
            workspace_id = %key.workspace_id,
            role = ?key.role,
            cached = self.entries.len() + 1,
            "terminal spawned"
        );
        self.entries.insert(
            key,
            CacheEntry {
                handle: handle.clone(),
                recipe,
                last_accessed_at: now,
                spawned_at: Instant::now(),
                rapid_exits: 0,
            },
        );
        Ok(handle)
    }

    fn tick(&mut self) -> u64 {
        self.access_clock += 1;
        self.access_clock
    }

    fn spawn(&mut self, key: TerminalKey, recipe: &LaunchRecipe) -> anyhow::Result<Arc<TerminalHandle>> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let spec = recipe.resolve(&self.launch);
        let notifier = ExitNotifier::new(key, generation, self.exit_tx.clone());
        let process = self
            .backend
            .spawn(&spec, TerminalSize::default(), notifier)?;
        Ok(Arc::new(TerminalHandle {
            key,
            generation,
            working_directory: spec.cwd,
            process,
            appearance: Mutex::new(self.appearance.clone()),
        }))
    }

    /// Evicts at most one entry per insert, even when the cache is already
    /// past capacity.
    fn evict_for_insert(&mut self) {
        if self.entries.len() < self.capacity {
            return;
        }
        let active = self.active_workspace;
        let victim = self
            .entries
            .iter()
            .filter(|(key, _)| Some(key.workspace_id) != active)
            .min_by_key(|(_, entry)| entry.last_accessed_at)
            .map(|(key, _)| *key);
        let Some(victim) = victim else {
            tracing::debug!(
                cached = self.entries.len(),
                capacity = self.capacity,
                "terminal cache over capacity; all entries belong to the active workspace"
            );
            return;
        };
        if let Some(entry) = self.entries.remove(&victim) {
            entry.handle.kill();
            tracing::info!(
                workspace_id = %victim.workspace_id,
                role = ?victim.role,
                "terminal evicted"
            );
        }
    }

    /// Kills and forgets one terminal. Returns whether it was cached.
    pub fn remove_terminal(&mut self, key: &TerminalKey) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        entry.handle.kill();
        tracing::info!(workspace_id = %key.workspace_id, role = ?key.role, "terminal removed");
        true
    }

    /// Kills every terminal of a workspace.
    pub fn remove_all_terminals(&mut self, workspace_id: WorkspaceId) -> usize {
        let keys: Vec<TerminalKey> = self
            .entries
            .keys()
            .filter(|key| key.workspace_id == workspace_id)
            .copied()
            .collect();
        for key in &keys {
            self.remove_terminal(key);
        }
        keys.len()
    }

    /// Kills everything. Used on shutdown.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.kill();
        }
    }

    /// Replaces the workspace's assistant with a fresh process rooted at
    /// `workspace_root`, or starts one when none is cached. Clears the
    /// rapid-exit count, so a stopped assistant runs again.
    pub fn restart_assistant(
        &mut self,
        workspace_id: WorkspaceId,
        workspace_root: &Path,
        session_id: &str,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        let key = TerminalKey::assistant(workspace_id);
        let recipe = LaunchRecipe::Assistant {
            workspace_root: workspace_root.to_path_buf(),
            session_id: session_id.to_owned(),
        };
        let Some(entry) = self.entries.get_mut(&key) else {
            return self.get_or_create(key, recipe);
        };
        entry.handle.kill();
        entry.recipe = recipe;
        entry.rapid_exits = 0;
        self.respawn(key)
    }

    fn respawn(&mut self, key: TerminalKey) -> anyhow::Result<Arc<TerminalHandle>> {
        let Some(recipe) = self.entries.get(&key).map(|entry| entry.recipe.clone()) else {
            anyhow::bail!("terminal is not cached");
        };
        let now = self.tick();
        match self.spawn(key, &recipe) {
            Ok(handle) => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.handle = handle.clone();
                    entry.last_accessed_at = now;
                    entry.spawned_at = Instant::now();
                }
                tracing::info!(workspace_id = %key.workspace_id, generation = handle.generation(), "assistant restarted");
                Ok(handle)
            }
            Err(err) => {
                self.entries.remove(&key);
                Err(err)
            }
        }
    }

    /// Reacts to a process exit: the assistant is relaunched in place, other
    /// terminals are left for the user to close. After [`MAX_RAPID_EXITS`]
    /// consecutive exits within [`RAPID_EXIT_WINDOW`] of starting, the
    /// assistant is left stopped until [`TerminalCache::restart_assistant`].
    pub fn handle_exit(&mut self, exit: TerminalExit) -> ExitOutcome {
        let Some(entry) = self
            .entries
            .get_mut(&exit.key)
            .filter(|entry| entry.handle.generation() == exit.generation)
        else {
            tracing::debug!(workspace_id = %exit.key.workspace_id, role = ?exit.key.role, "ignoring exit of replaced terminal");
            return ExitOutcome::Stale;
        };
        if !exit.key.is_assistant() {
            tracing::info!(workspace_id = %exit.key.workspace_id, role = ?exit.key.role, "terminal exited");
            return ExitOutcome::Exited;
        }
        if entry.spawned_at.elapsed() < RAPID_EXIT_WINDOW {
            entry.rapid_exits += 1;
        } else {
            entry.rapid_exits = 0;
        }
        if entry.rapid_exits >= MAX_RAPID_EXITS {
            tracing::warn!(
                workspace_id = %exit.key.workspace_id,
                rapid_exits = entry.rapid_exits,
                "assistant keeps exiting right after start; not restarting"
            );
            return ExitOutcome::Exited;
        }
        match self.respawn(exit.key) {
            Ok(handle) => ExitOutcome::Restarted(handle),
            Err(err) => {
                tracing::warn!(
                    workspace_id = %exit.key.workspace_id,
                    error = %format!("{err:#}"),
                    "assistant auto-restart failed"
                );
                ExitOutcome::Exited
            }
        }
    }

    pub fn appearance(&self) -> &TerminalAppearance {
        &self.appearance
    }

    pub fn apply_theme(&mut self, theme: AppearanceTheme) {
        self.appearance.theme = theme;
        for entry in self.entries.values() {
            entry.handle.update_appearance(|a| a.theme = theme);
        }
    }

    pub fn apply_font(&mut self, font: TerminalFont) {
        for entry in self.entries.values() {
            entry.handle.update_appearance(|a| a.font = font.clone());
        }
        self.appearance.font = font;
    }
}

impl Drop for TerminalCache {
    fn drop(&mut self) {
        self.clear();
    }
}
