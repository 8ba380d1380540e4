use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{TerminalId, WorkspaceId};
use crate::{CodeReview, DiffStats};

pub const CI_STATUS_TTL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssistantDescriptor {
    pub working_directory: PathBuf,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TerminalDescriptor {
    pub id: TerminalId,
    pub title: String,
    pub working_directory: PathBuf,
    /// `None` launches the user's login shell.
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalFocus {
    Assistant,
    Additional(TerminalId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MiddlePaneTab {
    Assistant,
    Changes,
    File(PathBuf),
}

/// Issued by [`CiStatusCache::begin_fetch`]; hand it back on completion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CiFetchTicket {
    pub workspace_id: WorkspaceId,
    pub request_id: u64,
}

#[derive(Clone, Debug, Default)]
pub struct CiStatusCache {
    code_review: Option<CodeReview>,
    last_error: Option<String>,
    fetched_at: Option<Instant>,
    in_flight: Option<u64>,
    next_request_id: u64,
    applied_request_id: u64,
}

impl CiStatusCache {
    pub fn code_review(&self) -> Option<&CodeReview> {
        self.code_review.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        match self.fetched_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= CI_STATUS_TTL,
        }
    }

    pub fn needs_refresh(&self, now: Instant) -> bool {
        !self.is_fetching() && self.is_stale(now)
    }

    /// Returns `None` while another fetch is outstanding unless `force` is set.
    /// A forced fetch supersedes the outstanding one.
    pub fn begin_fetch(&mut self, workspace_id: WorkspaceId, force: bool) -> Option<CiFetchTicket> {
        if self.in_flight.is_some() && !force {
            return None;
        }
        self.next_request_id += 1;
        self.in_flight = Some(self.next_request_id);
        Some(CiFetchTicket {
            workspace_id,
            request_id: self.next_request_id,
        })
    }

    /// Applies a finished fetch. Results older than one already applied are
    /// dropped and `false` is returned. Errors keep the last known review.
    pub fn complete_fetch(
        &mut self,
        ticket: CiFetchTicket,
        result: Result<Option<CodeReview>, String>,
        now: Instant,
    ) -> bool {
        if self.in_flight == Some(ticket.request_id) {
            self.in_flight = None;
        }
        if ticket.request_id <= self.applied_request_id {
            return false;
        }
        self.applied_request_id = ticket.request_id;
        self.fetched_at = Some(now);
        match result {
            Ok(review) => {
                self.code_review = review;
                self.last_error = None;
            }
            Err(message) => {
                self.last_error = Some(message);
            }
        }
        true
    }
}

#[derive(Clone, Debug)]
pub struct WorkspaceSessionState {
    pub workspace_id: WorkspaceId,
    pub assistant: Option<AssistantDescriptor>,
    pub terminals: Vec<TerminalDescriptor>,
    pub focus: TerminalFocus,
    pub open_files: Vec<PathBuf>,
    pub selected_tab: MiddlePaneTab,
    pub ci: CiStatusCache,
    pub diff_stats: Option<DiffStats>,
    next_terminal_number: u32,
}

impl WorkspaceSessionState {
    /// Fresh state with the assistant rooted at `root_path` and one ready shell.
    pub fn new_for_workspace(workspace_id: WorkspaceId, root_path: &Path) -> Self {
        let mut state = Self {
            workspace_id,
            assistant: Some(AssistantDescriptor {
                working_directory: root_path.to_path_buf(),
            }),
            terminals: Vec::new(),
            focus: TerminalFocus::Assistant,
            open_files: Vec::new(),
            selected_tab: MiddlePaneTab::Assistant,
            ci: CiStatusCache::default(),
            diff_stats: None,
            next_terminal_number: 1,
        };
        state.add_terminal(root_path.to_path_buf(), None, Vec::new());
        state
    }

    pub fn add_terminal(
        &mut self,
        working_directory: PathBuf,
        command: Option<String>,
        args: Vec<String>,
    ) -> TerminalId {
        let id = TerminalId::new();
        let title = format!("Terminal {}", self.next_terminal_number);
        self.next_terminal_number += 1;
        self.terminals.push(TerminalDescriptor {
            id,
            title,
            working_directory,
            command,
            args,
        });
        id
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&TerminalDescriptor> {
        self.terminals.iter().find(|t| t.id == id)
    }

    pub fn close_terminal(&mut self, id: TerminalId) -> Option<TerminalDescriptor> {
        let idx = self.terminals.iter().position(|t| t.id == id)?;
        let removed = self.terminals.remove(idx);
        if self.focus == TerminalFocus::Additional(id) {
            let neighbor = idx
                .checked_sub(1)
                .and_then(|i| self.terminals.get(i))
                .or_else(|| self.terminals.get(idx));
            self.focus = match neighbor {
                Some(t) => TerminalFocus::Additional(t.id),
                None => TerminalFocus::Assistant,
            };
        }
        Some(removed)
    }

    /// Focusing an unknown terminal is ignored.
    pub fn focus(&mut self, focus: TerminalFocus) {
        if let TerminalFocus::Additional(id) = focus
            && self.terminal(id).is_none()
        {
            return;
        }
        self.focus = focus;
    }

    pub fn open_file(&mut self, path: PathBuf) {
        if !self.open_files.contains(&path) {
            self.open_files.push(path.clone());
        }
        self.selected_tab = MiddlePaneTab::File(path);
    }

    pub fn close_file(&mut self, path: &Path) {
        let Some(idx) = self.open_files.iter().position(|p| p == path) else {
            return;
        };
        self.open_files.remove(idx);
        if matches!(&self.selected_tab, MiddlePaneTab::File(selected) if selected == path) {
            self.selected_tab = idx
                .checked_sub(1)
                .and_then(|i| self.open_files.get(i))
                .or_else(|| self.open_files.get(idx))
                .cloned()
                .map(MiddlePaneTab::File)
                .unwrap_or(MiddlePaneTab::Assistant);
        }
    }

    pub fn ci_needs_refresh(&self, now: Instant) -> bool {
        self.ci.needs_refresh(now)
    }

    pub fn begin_ci_fetch(&mut self, force: bool) -> Option<CiFetchTicket> {
        self.ci.begin_fetch(self.workspace_id, force)
    }

    /// Tickets issued for another workspace are rejected.
    pub fn complete_ci_fetch(
        &mut self,
        ticket: CiFetchTicket,
        result: Result<Option<CodeReview>, String>,
        now: Instant,
    ) -> bool {
        if ticket.workspace_id != self.workspace_id {
            return false;
        }
        self.ci.complete_fetch(ticket, result, now)
    }
}
