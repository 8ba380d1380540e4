use arbor_backend::CodeReviewProvider;
use arbor_domain::{CodeReview, HostingError, HostingProviderKind};
use arbor_terminal::LaunchContext;
use arbor_terminal::testing::FakePtyBackend;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::AppConfig;
use crate::state::{AppEvents, AppState};

pub(crate) fn temp_test_dir(purpose: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be valid")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "arbor-app-{purpose}-{}-{unique}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be created");
    dir
}

pub(crate) fn assert_git_success(repo_path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .expect("git should spawn");
    if !output.status.success() {
        panic!(
            "git failed ({:?}):\nstdout:\n{}\nstderr:\n{}",
            args,
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
}

pub(crate) fn init_repo_with_commit(repo_path: &Path) {
    std::fs::create_dir_all(repo_path).expect("repo dir should be created");
    assert_git_success(repo_path, &["init"]);
    assert_git_success(repo_path, &["config", "user.name", "Test User"]);
    assert_git_success(repo_path, &["config", "user.email", "test@example.com"]);
    assert_git_success(repo_path, &["config", "commit.gpgsign", "false"]);
    assert_git_success(repo_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(repo_path.join("README.md"), "init\n").expect("write should succeed");
    assert_git_success(repo_path, &["add", "."]);
    assert_git_success(repo_path, &["commit", "-m", "init"]);
}

pub(crate) fn test_config(base: &Path) -> AppConfig {
    AppConfig {
        arbor_root: base.join("state"),
        launch: LaunchContext {
            shell: PathBuf::from("/bin/sh"),
            assistant_bin: PathBuf::from("claude"),
            assistant_root: base.join("claude"),
        },
        terminal_capacity: 10,
        diff_refresh_interval: Duration::from_secs(3600),
        ci_refresh_interval: Duration::from_secs(3600),
    }
}

pub(crate) struct Harness {
    pub(crate) base: PathBuf,
    pub(crate) repo: PathBuf,
    pub(crate) backend: Arc<FakePtyBackend>,
}

impl Harness {
    /// A source repository plus an empty state directory.
    pub(crate) fn new(purpose: &str) -> Self {
        let base = temp_test_dir(purpose);
        let repo = base.join("repo");
        init_repo_with_commit(&repo);
        Self {
            base,
            repo,
            backend: Arc::new(FakePtyBackend::default()),
        }
    }

    pub(crate) fn worktrees_root(&self) -> PathBuf {
        self.base.join("workspaces")
    }

    pub(crate) async fn load(&self) -> (AppState, AppEvents) {
        let (mut state, events) = AppState::load(test_config(&self.base), self.backend.clone())
            .await
            .expect("state should load");
        if state.preferences().root_directory.is_none() {
            state.set_root_directory(self.worktrees_root()).await;
        }
        (state, events)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.base);
    }
}

/// Answers every lookup with a fixed result and counts calls.
pub(crate) struct FakeCodeReviewProvider {
    pub(crate) calls: AtomicUsize,
    pub(crate) lookups: Mutex<Vec<(String, String)>>,
    response: Mutex<Result<Option<CodeReview>, HostingError>>,
}

impl FakeCodeReviewProvider {
    pub(crate) fn new(response: Result<Option<CodeReview>, HostingError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            lookups: Mutex::new(Vec::new()),
            response: Mutex::new(response),
        }
    }

    pub(crate) fn respond_with(&self, response: Result<Option<CodeReview>, HostingError>) {
        *self.response.lock().expect("response lock") = response;
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeReviewProvider for FakeCodeReviewProvider {
    fn kind(&self) -> HostingProviderKind {
        HostingProviderKind::GitLab
    }

    fn find_code_review(
        &self,
        project_path: &str,
        branch: &str,
    ) -> Result<Option<CodeReview>, HostingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lookups
            .lock()
            .expect("lookups lock")
            .push((project_path.to_owned(), branch.to_owned()));
        self.response.lock().expect("response lock").clone()
    }
}
