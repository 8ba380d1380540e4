use anyhow::{Context as _, anyhow};
use arbor_domain::{AppearanceTheme, TerminalId, Workspace, WorkspaceError, WorkspaceId};
use arbor_terminal::TerminalHandle;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::state::{AppEvents, AppState, CiFetchResult};

type Reply<T> = oneshot::Sender<T>;

pub enum AppCommand {
    CreateWorkspace {
        source_repo: PathBuf,
        name: Option<String>,
        reply: Reply<Result<WorkspaceId, WorkspaceError>>,
    },
    DeleteWorkspace {
        workspace_id: WorkspaceId,
        reply: Reply<Result<Vec<PathBuf>, WorkspaceError>>,
    },
    SelectWorkspace {
        workspace_id: WorkspaceId,
        reply: Reply<Result<(), WorkspaceError>>,
    },
    GoBack {
        reply: Reply<Option<WorkspaceId>>,
    },
    GoForward {
        reply: Reply<Option<WorkspaceId>>,
    },
    MoveWorkspace {
        workspace_id: WorkspaceId,
        to_index: usize,
        reply: Reply<Result<(), WorkspaceError>>,
    },
    RenameWorkspace {
        workspace_id: WorkspaceId,
        display_name: String,
        reply: Reply<Result<(), WorkspaceError>>,
    },
    OpenInEditor {
        workspace_id: WorkspaceId,
        reply: Reply<Result<(), WorkspaceError>>,
    },
    AssistantTerminal {
        workspace_id: WorkspaceId,
        reply: Reply<anyhow::Result<Arc<TerminalHandle>>>,
    },
    RestartAssistant {
        workspace_id: WorkspaceId,
        reply: Reply<anyhow::Result<Arc<TerminalHandle>>>,
    },
    AddTerminal {
        workspace_id: WorkspaceId,
        reply: Reply<Result<TerminalId, WorkspaceError>>,
    },
    AdditionalTerminal {
        workspace_id: WorkspaceId,
        terminal_id: TerminalId,
        reply: Reply<anyhow::Result<Arc<TerminalHandle>>>,
    },
    CloseTerminal {
        workspace_id: WorkspaceId,
        terminal_id: TerminalId,
        reply: Reply<bool>,
    },
    SetTheme {
        theme: AppearanceTheme,
    },
    SetFont {
        size: u16,
        family: Option<String>,
    },
    RefreshDiffStats,
    RefreshCiStatus {
        force: bool,
    },
    CiStatusFetched(CiFetchResult),
    Snapshot {
        reply: Reply<AppSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub workspaces: Vec<Workspace>,
    pub selected: Option<WorkspaceId>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub cached_terminals: usize,
}

impl AppSnapshot {
    fn of(state: &AppState) -> Self {
        Self {
            workspaces: state.workspaces().to_vec(),
            selected: state.selected_workspace_id(),
            can_go_back: state.history().can_go_back(),
            can_go_forward: state.history().can_go_forward(),
            cached_terminals: state.terminals().len(),
        }
    }
}

/// Cheap cloneable front door to the control loop.
#[derive(Clone)]
pub struct AppHandle {
    tx: mpsc::Sender<AppCommand>,
}

impl AppHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> AppCommand) -> anyhow::Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("app control loop has stopped"))?;
        rx.await.context("app control loop dropped the request")
    }

    async fn notify(&self, command: AppCommand) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("app control loop has stopped"))
    }

    pub async fn create_workspace(
        &self,
        source_repo: PathBuf,
        name: Option<String>,
    ) -> anyhow::Result<WorkspaceId> {
        Ok(self
            .request(|reply| AppCommand::CreateWorkspace {
                source_repo,
                name,
                reply,
            })
            .await??)
    }

    pub async fn delete_workspace(&self, workspace_id: WorkspaceId) -> anyhow::Result<Vec<PathBuf>> {
        Ok(self
            .request(|reply| AppCommand::DeleteWorkspace {
                workspace_id,
                reply,
            })
            .await??)
    }

    pub async fn select_workspace(&self, workspace_id: WorkspaceId) -> anyhow::Result<()> {
        Ok(self
            .request(|reply| AppCommand::SelectWorkspace {
                workspace_id,
                reply,
            })
            .await??)
    }

    pub async fn go_back(&self) -> anyhow::Result<Option<WorkspaceId>> {
        self.request(|reply| AppCommand::GoBack { reply }).await
    }

    pub async fn go_forward(&self) -> anyhow::Result<Option<WorkspaceId>> {
        self.request(|reply| AppCommand::GoForward { reply }).await
    }

    pub async fn move_workspace(&self, workspace_id: WorkspaceId, to_index: usize) -> anyhow::Result<()> {
        Ok(self
            .request(|reply| AppCommand::MoveWorkspace {
                workspace_id,
                to_index,
                reply,
            })
            .await??)
    }

    pub async fn rename_workspace(
        &self,
        workspace_id: WorkspaceId,
        display_name: String,
    ) -> anyhow::Result<()> {
        Ok(self
            .request(|reply| AppCommand::RenameWorkspace {
                workspace_id,
                display_name,
                reply,
            })
            .await??)
    }

    pub async fn open_in_editor(&self, workspace_id: WorkspaceId) -> anyhow::Result<()> {
        Ok(self
            .request(|reply| AppCommand::OpenInEditor {
                workspace_id,
                reply,
            })
            .await??)
    }

    /// The workspace's assistant terminal, spawned on first use and reused
    /// across workspace switches.
    pub async fn assistant_terminal(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        self.request(|reply| AppCommand::AssistantTerminal {
            workspace_id,
            reply,
        })
        .await?
    }

    pub async fn restart_assistant(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        self.request(|reply| AppCommand::RestartAssistant {
            workspace_id,
            reply,
        })
        .await?
    }

    /// Adds a shell tab to the workspace session; open it with
    /// [`AppHandle::additional_terminal`].
    pub async fn add_terminal(&self, workspace_id: WorkspaceId) -> anyhow::Result<TerminalId> {
        Ok(self
            .request(|reply| AppCommand::AddTerminal {
                workspace_id,
                reply,
            })
            .await??)
    }

    pub async fn additional_terminal(
        &self,
        workspace_id: WorkspaceId,
        terminal_id: TerminalId,
    ) -> anyhow::Result<Arc<TerminalHandle>> {
        self.request(|reply| AppCommand::AdditionalTerminal {
            workspace_id,
            terminal_id,
            reply,
        })
        .await?
    }

    pub async fn close_terminal(
        &self,
        workspace_id: WorkspaceId,
        terminal_id: TerminalId,
    ) -> anyhow::Result<bool> {
        self.request(|reply| AppCommand::CloseTerminal {
            workspace_id,
            terminal_id,
            reply,
        })
        .await
    }

    pub async fn set_theme(&self, theme: AppearanceTheme) -> anyhow::Result<()> {
        self.notify(AppCommand::SetTheme { theme }).await
    }

    pub async fn set_font(&self, size: u16, family: Option<String>) -> anyhow::Result<()> {
        self.notify(AppCommand::SetFont { size, family }).await
    }

    pub async fn refresh_ci_status(&self) -> anyhow::Result<()> {
        self.notify(AppCommand::RefreshCiStatus { force: true }).await
    }

    pub async fn snapshot(&self) -> anyhow::Result<AppSnapshot> {
        self.request(|reply| AppCommand::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.request(|reply| AppCommand::Shutdown { reply }).await
    }
}

/// Spawns the refreshers and the control loop. The loop runs until
/// [`AppHandle::shutdown`].
pub fn start(mut state: AppState, events: AppEvents) -> (AppHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<AppCommand>(256);
    state.spawn_refreshers(tx.clone());
    let loop_tx = tx.clone();
    let task = tokio::spawn(run(state, events, rx, loop_tx));
    (AppHandle { tx }, task)
}

async fn run(
    mut state: AppState,
    mut events: AppEvents,
    mut rx: mpsc::Receiver<AppCommand>,
    tx: mpsc::Sender<AppCommand>,
) {
    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else { break };
                if handle(&mut state, command, &tx).await.is_break() {
                    break;
                }
            }
            Some(exit) = events.terminal_exits.recv() => {
                state.handle_terminal_exit(exit);
            }
            event = events.appearance.recv() => match event {
                Ok(event) => state.apply_appearance_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "appearance events lagged; resyncing");
                    state.resync_appearance();
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
        }
    }
    tracing::debug!("app control loop stopped");
}

async fn handle(
    state: &mut AppState,
    command: AppCommand,
    tx: &mpsc::Sender<AppCommand>,
) -> ControlFlow<()> {
    match command {
        AppCommand::CreateWorkspace {
            source_repo,
            name,
            reply,
        } => {
            let created = match name {
                Some(name) => state.create_workspace_named(source_repo, name).await,
                None => state.create_workspace(source_repo).await,
            };
            if created.is_ok() {
                spawn_ci_fetch(state, tx, false);
            }
            let _ = reply.send(created);
        }
        AppCommand::DeleteWorkspace {
            workspace_id,
            reply,
        } => {
            let _ = reply.send(state.delete_workspace(workspace_id).await);
        }
        AppCommand::SelectWorkspace {
            workspace_id,
            reply,
        } => {
            let selected = state.select_workspace(workspace_id).await;
            if selected.is_ok() {
                spawn_ci_fetch(state, tx, false);
            }
            let _ = reply.send(selected);
        }
        AppCommand::GoBack { reply } => {
            let target = state.go_back().await;
            if target.is_some() {
                spawn_ci_fetch(state, tx, false);
            }
            let _ = reply.send(target);
        }
        AppCommand::GoForward { reply } => {
            let target = state.go_forward().await;
            if target.is_some() {
                spawn_ci_fetch(state, tx, false);
            }
            let _ = reply.send(target);
        }
        AppCommand::MoveWorkspace {
            workspace_id,
            to_index,
            reply,
        } => {
            let _ = reply.send(state.move_workspace(workspace_id, to_index).await);
        }
        AppCommand::RenameWorkspace {
            workspace_id,
            display_name,
            reply,
        } => {
            let _ = reply.send(state.rename_workspace(workspace_id, &display_name).await);
        }
        AppCommand::OpenInEditor {
            workspace_id,
            reply,
        } => {
            let _ = reply.send(state.open_in_editor(workspace_id).await);
        }
        AppCommand::AssistantTerminal {
            workspace_id,
            reply,
        } => {
            let _ = reply.send(state.assistant_terminal(workspace_id));
        }
        AppCommand::RestartAssistant {
            workspace_id,
            reply,
        } => {
            let _ = reply.send(state.restart_assistant(workspace_id));
        }
        AppCommand::AddTerminal {
            workspace_id,
            reply,
        } => {
            let _ = reply.send(state.add_terminal(workspace_id));
        }
        AppCommand::AdditionalTerminal {
            workspace_id,
            terminal_id,
            reply,
        } => {
            let _ = reply.send(state.additional_terminal(workspace_id, terminal_id));
        }
        AppCommand::CloseTerminal {
            workspace_id,
            terminal_id,
            reply,
        } => {
            let _ = reply.send(state.close_terminal(workspace_id, terminal_id));
        }
        AppCommand::SetTheme { theme } => state.set_theme(theme).await,
        AppCommand::SetFont { size, family } => state.set_font(size, family).await,
        AppCommand::RefreshDiffStats => {
            state.refresh_diff_stats().await;
        }
        AppCommand::RefreshCiStatus { force } => spawn_ci_fetch(state, tx, force),
        AppCommand::CiStatusFetched(fetched) => {
            state.apply_ci_result(fetched);
        }
        AppCommand::Snapshot { reply } => {
            let _ = reply.send(AppSnapshot::of(state));
        }
        AppCommand::Shutdown { reply } => {
            state.shutdown().await;
            let _ = reply.send(());
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// Runs a claimed CI lookup on its own thread and feeds the result back.
fn spawn_ci_fetch(state: &mut AppState, tx: &mpsc::Sender<AppCommand>, force: bool) {
    let Some(job) = state.begin_ci_refresh(force) else {
        return;
    };
    let tx = tx.clone();
    std::thread::spawn(move || {
        let fetched = job.run();
        let _ = tx.blocking_send(AppCommand::CiStatusFetched(fetched));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCodeReviewProvider, Harness, assert_git_success};
    use std::time::Duration;

    #[tokio::test]
    async fn handle_drives_state_through_the_loop() {
        let harness = Harness::new("control-loop");
        let (state, events) = harness.load().await;
        let (handle, task) = start(state, events);

        let tokyo = handle
            .create_workspace(harness.repo.clone(), Some("Tokyo".to_owned()))
            .await
            .expect("create tokyo");
        let oslo = handle
            .create_workspace(harness.repo.clone(), Some("Oslo".to_owned()))
            .await
            .expect("create oslo");

        assert_eq!(handle.go_back().await.expect("loop alive"), Some(tokyo));
        handle
            .rename_workspace(tokyo, "Main".to_owned())
            .await
            .expect("rename");
        handle.move_workspace(oslo, 0).await.expect("move");

        let snapshot = handle.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.selected, Some(tokyo));
        assert!(snapshot.can_go_forward);
        assert!(!snapshot.can_go_back);
        assert_eq!(snapshot.workspaces[0].id, oslo);
        assert_eq!(snapshot.workspaces[1].effective_name(), "Main");

        let err = handle
            .select_workspace(WorkspaceId::new())
            .await
            .expect_err("unknown workspace");
        assert!(matches!(
            err.downcast_ref::<WorkspaceError>(),
            Some(WorkspaceError::WorkspaceNotFound(_))
        ));

        handle.shutdown().await.expect("shutdown");
        task.await.expect("loop task should finish");
        assert!(handle.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn assistant_survives_switching_workspaces() {
        let harness = Harness::new("control-terminals");
        let (state, events) = harness.load().await;
        let (handle, task) = start(state, events);

        let a = handle
            .create_workspace(harness.repo.clone(), Some("Tokyo".to_owned()))
            .await
            .expect("create a");
        let b = handle
            .create_workspace(harness.repo.clone(), Some("Oslo".to_owned()))
            .await
            .expect("create b");

        handle.select_workspace(a).await.expect("select a");
        let first = handle.assistant_terminal(a).await.expect("a assistant");
        handle.select_workspace(b).await.expect("select b");
        handle.assistant_terminal(b).await.expect("b assistant");
        handle.select_workspace(a).await.expect("select a again");
        let again = handle.assistant_terminal(a).await.expect("a assistant again");

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(harness.backend.spawn_count(), 2);

        let tab = handle.add_terminal(a).await.expect("add tab");
        let shell = handle
            .additional_terminal(a, tab)
            .await
            .expect("open tab");
        assert!(handle.close_terminal(a, tab).await.expect("close tab"));
        assert!(harness.backend.was_killed(shell.generation()));
        assert!(handle.additional_terminal(a, tab).await.is_err());

        let restarted = handle.restart_assistant(a).await.expect("restart");
        assert!(harness.backend.was_killed(first.generation()));
        assert_ne!(restarted.generation(), first.generation());
        assert_eq!(handle.snapshot().await.expect("snapshot").cached_terminals, 2);

        handle.shutdown().await.expect("shutdown");
        task.await.expect("loop task should finish");
    }

    #[tokio::test]
    async fn selection_triggers_a_background_ci_lookup() {
        let harness = Harness::new("control-ci");
        let (mut state, events) = harness.load().await;
        let lima = state
            .create_workspace_named(harness.repo.clone(), "Lima".to_owned())
            .await
            .expect("create");
        assert_git_success(
            &harness.repo,
            &[
                "remote",
                "add",
                "origin",
                "git@gitlab.example.com:group/app.git",
            ],
        );
        let provider = Arc::new(FakeCodeReviewProvider::new(Ok(None)));
        state.set_code_review_provider(Some(provider.clone()));

        let (handle, task) = start(state, events);
        handle.select_workspace(lima).await.expect("select");

        tokio::time::timeout(Duration::from_secs(10), async {
            while provider.call_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("lookup should run");
        assert_eq!(
            provider.lookups.lock().expect("lookups")[0],
            ("group/app".to_owned(), "arbor/lima".to_owned())
        );

        handle.shutdown().await.expect("shutdown");
        task.await.expect("loop task should finish");
    }
}
