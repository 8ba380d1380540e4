use arbor_domain::{EditorChoice, WorkspaceError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::thread::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenCommand {
    pub(crate) program: &'static str,
    pub(crate) args: Vec<OsString>,
}

/// Finds an installed application bundle for `editor`, first by bundle
/// identifier, then under the applications directory.
pub(crate) fn locate_app_bundle(
    editor: EditorChoice,
    find_by_bundle_id: impl FnOnce(&str) -> Option<PathBuf>,
    applications_dir: &Path,
) -> Option<PathBuf> {
    if let Some(path) = find_by_bundle_id(editor.bundle_identifier()) {
        return Some(path);
    }
    let candidate = applications_dir.join(format!("{}.app", editor.app_name()));
    candidate.exists().then_some(candidate)
}

pub(crate) fn macos_open_command(app: &Path, directory: &Path) -> OpenCommand {
    OpenCommand {
        program: "open",
        args: vec![
            OsString::from("-a"),
            app.as_os_str().to_os_string(),
            directory.as_os_str().to_os_string(),
        ],
    }
}

pub(crate) fn linux_open_command(
    editor: EditorChoice,
    directory: &Path,
) -> Result<OpenCommand, WorkspaceError> {
    let program = match editor {
        EditorChoice::Vscode => "code",
        EditorChoice::Cursor => "cursor",
        EditorChoice::Zed => "zed",
        EditorChoice::Xcode => {
            return Err(WorkspaceError::FailedToOpenEditor(
                "Xcode is not available on this platform".to_owned(),
            ));
        }
    };
    Ok(OpenCommand {
        program,
        args: vec![directory.as_os_str().to_os_string()],
    })
}

fn mdfind_bundle(bundle_id: &str) -> Option<PathBuf> {
    let output = Command::new("mdfind")
        .arg(format!("kMDItemCFBundleIdentifier == '{bundle_id}'"))
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

fn resolve_open_command(
    editor: EditorChoice,
    directory: &Path,
) -> Result<OpenCommand, WorkspaceError> {
    if cfg!(target_os = "macos") {
        let app = locate_app_bundle(editor, mdfind_bundle, Path::new("/Applications"))
            .ok_or_else(|| {
                WorkspaceError::FailedToOpenEditor(format!("{} is not installed", editor.app_name()))
            })?;
        Ok(macos_open_command(&app, directory))
    } else {
        linux_open_command(editor, directory)
    }
}

pub(crate) fn open_in_editor(editor: EditorChoice, directory: &Path) -> Result<(), WorkspaceError> {
    let command = resolve_open_command(editor, directory)?;
    tracing::info!(
        editor = editor.app_name(),
        directory = %directory.display(),
        "opening workspace in editor"
    );
    let mut process = Command::new(command.program);
    process.args(&command.args);
    spawn_reaped(process).map(drop).map_err(|err| {
        WorkspaceError::FailedToOpenEditor(format!("failed to spawn {}: {err}", command.program))
    })
}

/// Spawns without waiting; a background thread collects the exit status so
/// the child never lingers as a zombie.
fn spawn_reaped(mut command: Command) -> std::io::Result<JoinHandle<std::io::Result<ExitStatus>>> {
    let mut child = command.spawn()?;
    std::thread::Builder::new()
        .name("arbor-editor-reap".to_owned())
        .spawn(move || child.wait())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_test_dir;

    #[test]
    fn bundle_lookup_wins_over_applications_dir() {
        let apps = temp_test_dir("editor-bundle");
        std::fs::create_dir_all(apps.join("Zed.app")).expect("mkdir");
        let found = locate_app_bundle(
            EditorChoice::Zed,
            |id| {
                assert_eq!(id, "dev.zed.Zed");
                Some(PathBuf::from("/Volumes/Apps/Zed.app"))
            },
            &apps,
        );
        assert_eq!(found, Some(PathBuf::from("/Volumes/Apps/Zed.app")));
        let _ = std::fs::remove_dir_all(&apps);
    }

    #[test]
    fn falls_back_to_applications_dir() {
        let apps = temp_test_dir("editor-fallback");
        std::fs::create_dir_all(apps.join("Visual Studio Code.app")).expect("mkdir");
        let found = locate_app_bundle(EditorChoice::Vscode, |_| None, &apps);
        assert_eq!(found, Some(apps.join("Visual Studio Code.app")));

        assert_eq!(locate_app_bundle(EditorChoice::Cursor, |_| None, &apps), None);
        let _ = std::fs::remove_dir_all(&apps);
    }

    #[test]
    fn macos_command_uses_open_dash_a() {
        let command = macos_open_command(
            Path::new("/Applications/Zed.app"),
            Path::new("/tmp/arbor-ws"),
        );
        assert_eq!(command.program, "open");
        assert_eq!(
            command.args,
            vec![
                OsString::from("-a"),
                OsString::from("/Applications/Zed.app"),
                OsString::from("/tmp/arbor-ws"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn spawned_editor_is_reaped() {
        let mut command = Command::new("sh");
        command.args(["-c", "exit 3"]);
        let reaper = spawn_reaped(command).expect("sh should spawn");
        let status = reaper
            .join()
            .expect("reaper thread should not panic")
            .expect("wait should succeed");
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn linux_command_uses_editor_cli() {
        let command =
            linux_open_command(EditorChoice::Vscode, Path::new("/tmp/arbor-ws")).expect("code");
        assert_eq!(command.program, "code");
        assert_eq!(command.args, vec![OsString::from("/tmp/arbor-ws")]);

        let err = linux_open_command(EditorChoice::Xcode, Path::new("/tmp/arbor-ws"))
            .expect_err("xcode is mac only");
        assert!(matches!(err, WorkspaceError::FailedToOpenEditor(_)));
    }
}
