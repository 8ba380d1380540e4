use arbor_domain::{Workspace, WorkspaceId, WorkspaceSessionState};
use std::collections::HashMap;

/// Per-workspace session state, created on first use and kept until the
/// workspace is deleted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<WorkspaceId, WorkspaceSessionState>,
}

impl SessionStore {
    pub fn get(&self, workspace_id: WorkspaceId) -> Option<&WorkspaceSessionState> {
        self.sessions.get(&workspace_id)
    }

    pub fn get_mut(&mut self, workspace_id: WorkspaceId) -> Option<&mut WorkspaceSessionState> {
        self.sessions.get_mut(&workspace_id)
    }

    /// `None` when the workspace has no repositories to root a session in.
    pub fn get_or_create(&mut self, workspace: &Workspace) -> Option<&mut WorkspaceSessionState> {
        let root = workspace.root_path()?;
        Some(
            self.sessions
                .entry(workspace.id)
                .or_insert_with(|| WorkspaceSessionState::new_for_workspace(workspace.id, root)),
        )
    }

    pub fn remove(&mut self, workspace_id: WorkspaceId) -> Option<WorkspaceSessionState> {
        self.sessions.remove(&workspace_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_domain::WorkspaceRepository;

    fn workspace(name: &str) -> Workspace {
        Workspace::new(
            name.to_owned(),
            WorkspaceRepository::new(
                "/src/repo".into(),
                format!("/wt/{name}").into(),
                format!("arbor/{name}"),
            ),
        )
    }

    #[test]
    fn sessions_are_created_once_and_kept() {
        let mut store = SessionStore::default();
        let ws = workspace("oslo");

        let terminal = store.get_or_create(&ws).expect("session").terminals[0].id;
        store
            .get_or_create(&ws)
            .expect("session")
            .open_file("README.md".into());

        let session = store.get(ws.id).expect("kept");
        assert_eq!(session.terminals[0].id, terminal);
        assert_eq!(session.open_files.len(), 1);
        assert_eq!(store.len(), 1);

        assert!(store.remove(ws.id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn workspace_without_repositories_has_no_session() {
        let mut store = SessionStore::default();
        let mut ws = workspace("lima");
        ws.repositories.clear();
        assert!(store.get_or_create(&ws).is_none());
    }
}
