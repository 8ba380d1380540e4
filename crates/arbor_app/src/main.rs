use anyhow::Context as _;
use arbor_app::{AppConfig, AppState};
use arbor_domain::{Workspace, WorkspaceId, sanitize_slug};
use arbor_terminal::NativePtyBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Parallel git worktree workspaces with persistent assistant terminals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List workspaces (default)
    List,

    /// Create a workspace from a local repository
    Create {
        repo: PathBuf,
        /// Workspace name; a free one is picked when omitted
        #[arg(long)]
        name: Option<String>,
    },

    /// Archive a workspace's worktree and forget it
    Delete { workspace: String },

    /// Open a workspace in the configured editor
    Open { workspace: String },

    /// Set the directory new worktrees are created in
    SetRoot { path: PathBuf },

    /// Keep the selected workspace's status fresh until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let (mut state, events) = AppState::load(config, Arc::new(NativePtyBackend)).await?;

    match cli.command.unwrap_or(Command::List) {
        Command::List => print_workspaces(&state),
        Command::Create { repo, name } => {
            let repo = std::fs::canonicalize(&repo)
                .with_context(|| format!("repository not found: {}", repo.display()))?;
            let id = match name {
                Some(name) => state.create_workspace_named(repo, name).await?,
                None => state.create_workspace(repo).await?,
            };
            if let Some(workspace) = state.workspace(id) {
                println!("{}", describe(workspace));
            }
        }
        Command::Delete { workspace } => {
            let id = find_workspace(&state, &workspace)?;
            for archived in state.delete_workspace(id).await? {
                println!("archived to {}", archived.display());
            }
        }
        Command::Open { workspace } => {
            let id = find_workspace(&state, &workspace)?;
            state.open_in_editor(id).await?;
        }
        Command::SetRoot { path } => {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let path = std::fs::canonicalize(&path)?;
            state.set_root_directory(path).await;
        }
        Command::Watch => {
            let (handle, task) = arbor_app::start(state, events);
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            handle.shutdown().await?;
            task.await.context("control loop panicked")?;
            return Ok(());
        }
    }

    state.shutdown().await;
    Ok(())
}

fn describe(workspace: &Workspace) -> String {
    let root = workspace
        .root_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let branch = workspace
        .primary_repository()
        .map(|r| r.branch_name.as_str())
        .unwrap_or_default();
    let marker = if workspace.is_active { "*" } else { " " };
    format!("{marker} {:<20} {branch:<28} {root}", workspace.effective_name())
}

fn print_workspaces(state: &AppState) {
    if state.workspaces().is_empty() {
        println!("no workspaces");
        return;
    }
    for workspace in state.workspaces() {
        println!("{}", describe(workspace));
    }
}

fn find_workspace(state: &AppState, query: &str) -> anyhow::Result<WorkspaceId> {
    let slug = sanitize_slug(query);
    state
        .workspaces()
        .iter()
        .find(|w| {
            w.effective_name().eq_ignore_ascii_case(query)
                || w.name.eq_ignore_ascii_case(query)
                || sanitize_slug(&w.name) == slug
        })
        .map(|w| w.id)
        .with_context(|| format!("no workspace named {query}"))
}
