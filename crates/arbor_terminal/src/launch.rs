use arbor_domain::{TerminalDescriptor, WorkspaceId, paths};
use std::path::{Path, PathBuf};

const SESSION_ID_CONTEXT: &str = "arbor assistant session v1";

/// Executables and directories every launch depends on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchContext {
    pub shell: PathBuf,
    pub assistant_bin: PathBuf,
    /// Where the assistant keeps per-project session transcripts.
    pub assistant_root: PathBuf,
}

/// A fully resolved process launch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Runs the assistant through a login shell so the user's profile (PATH,
    /// version managers) is loaded. Resumes `session_id` when a transcript
    /// for it already exists, otherwise starts it under that id.
    pub fn assistant(ctx: &LaunchContext, workspace_root: &Path, session_id: &str) -> Self {
        let transcript =
            paths::assistant_session_file(&ctx.assistant_root, workspace_root, session_id);
        let flag = if transcript.is_file() {
            "--resume"
        } else {
            "--session-id"
        };
        let command = format!(
            "cd {} && exec {} {flag} {}",
            shell_quote(&workspace_root.to_string_lossy()),
            shell_quote(&ctx.assistant_bin.to_string_lossy()),
            shell_quote(session_id),
        );
        Self::login_shell(ctx, workspace_root, Some(command))
    }

    /// A plain interactive login shell, or `command` wrapped in one.
    pub fn additional(ctx: &LaunchContext, descriptor: &TerminalDescriptor) -> Self {
        let command = descriptor.command.as_deref().map(|program| {
            let mut words = vec![shell_quote(program)];
            words.extend(descriptor.args.iter().map(|arg| shell_quote(arg)));
            format!(
                "cd {} && exec {}",
                shell_quote(&descriptor.working_directory.to_string_lossy()),
                words.join(" ")
            )
        });
        Self::login_shell(ctx, &descriptor.working_directory, command)
    }

    fn login_shell(ctx: &LaunchContext, cwd: &Path, command: Option<String>) -> Self {
        let mut args = vec!["-l".to_owned()];
        if let Some(command) = command {
            args.push("-c".to_owned());
            args.push(command);
        }
        Self {
            program: ctx.shell.clone(),
            args,
            cwd: cwd.to_path_buf(),
            env: vec![
                ("TERM".to_owned(), "xterm-256color".to_owned()),
                ("COLORTERM".to_owned(), "truecolor".to_owned()),
            ],
        }
    }
}

/// Stable assistant session id for a workspace, in uuid form.
pub fn assistant_session_id(workspace_id: WorkspaceId) -> String {
    let hash = blake3::derive_key(SESSION_ID_CONTEXT, workspace_id.as_uuid().as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

pub(crate) fn shell_quote(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:@%+,".contains(&b));
    if plain {
        raw.to_owned()
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}
