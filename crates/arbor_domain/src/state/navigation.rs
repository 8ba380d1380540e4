use super::WorkspaceId;

/// Browser-style back/forward history of selected workspaces.
///
/// `cursor` is `None` exactly when `entries` is empty; otherwise it always
/// indexes into `entries`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkspaceNavigationHistory {
    entries: Vec<WorkspaceId>,
    cursor: Option<usize>,
}

impl WorkspaceNavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[WorkspaceId] {
        &self.entries
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<WorkspaceId> {
        self.cursor.map(|idx| self.entries[idx])
    }

    pub fn push(&mut self, id: WorkspaceId) {
        if self.current() == Some(id) {
            return;
        }
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
        self.entries.push(id);
        self.cursor = Some(self.entries.len() - 1);
    }

    pub fn can_go_back(&self) -> bool {
        matches!(self.cursor, Some(idx) if idx > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        matches!(self.cursor, Some(idx) if idx + 1 < self.entries.len())
    }

    pub fn go_back(&mut self) -> Option<WorkspaceId> {
        if !self.can_go_back() {
            return None;
        }
        let idx = self.cursor? - 1;
        self.cursor = Some(idx);
        Some(self.entries[idx])
    }

    pub fn go_forward(&mut self) -> Option<WorkspaceId> {
        if !self.can_go_forward() {
            return None;
        }
        let idx = self.cursor? + 1;
        self.cursor = Some(idx);
        Some(self.entries[idx])
    }

    /// Drops every occurrence of `id`. Adjacent duplicates left behind by the
    /// removal are collapsed. The cursor moves to the closest surviving entry
    /// at or before its old position.
    pub fn remove(&mut self, id: WorkspaceId) {
        let Some(cursor) = self.cursor else {
            return;
        };

        let mut kept: Vec<WorkspaceId> = Vec::with_capacity(self.entries.len());
        let mut next_cursor: Option<usize> = None;
        for (idx, entry) in self.entries.iter().copied().enumerate() {
            if entry == id {
                continue;
            }
            if kept.last() != Some(&entry) {
                kept.push(entry);
            }
            if idx <= cursor {
                next_cursor = Some(kept.len() - 1);
            }
        }

        self.cursor = if kept.is_empty() {
            None
        } else {
            Some(next_cursor.unwrap_or(0))
        };
        self.entries = kept;
    }
}
