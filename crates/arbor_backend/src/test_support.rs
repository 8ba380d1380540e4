use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    pub(crate) fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = std::env::var_os(key);
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, prev }
    }

    pub(crate) fn remove(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            unsafe {
                std::env::set_var(self.key, prev);
            }
        } else {
            unsafe {
                std::env::remove_var(self.key);
            }
        }
    }
}

pub(crate) fn temp_test_dir(purpose: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be valid")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "arbor-{purpose}-{}-{unique}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be created");
    dir
}

pub(crate) fn run_git(repo_path: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .expect("git should spawn")
}

pub(crate) fn assert_git_success(repo_path: &Path, args: &[&str]) {
    let output = run_git(repo_path, args);
    if !output.status.success() {
        panic!(
            "git failed ({:?}):\nstdout:\n{}\nstderr:\n{}",
            args,
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
}

/// Initializes a repository on `main` with one committed file.
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
