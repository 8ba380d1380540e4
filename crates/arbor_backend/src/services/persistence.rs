use anyhow::Context as _;
use arbor_domain::{Preferences, Workspace, paths};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const PREFERENCES_KEY: &str = "arbor.preferences";

/// JSON files under the Arbor state directory.
#[derive(Clone, Debug)]
pub struct Persistence {
    root: PathBuf,
}

impl Persistence {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A missing file is an empty list.
    pub fn load_workspaces(&self) -> anyhow::Result<Vec<Workspace>> {
        let path = paths::workspaces_file(&self.root);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(Vec::new());
        };
        let mut workspaces: Vec<Workspace> = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        workspaces.sort_by_key(|w| w.sort_order);
        Ok(workspaces)
    }

    pub fn save_workspaces(&self, workspaces: &[Workspace]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(workspaces).context("failed to encode workspaces")?;
        write_atomic(&paths::workspaces_file(&self.root), &json)
    }

    pub fn load_preferences(&self) -> anyhow::Result<Preferences> {
        let path = paths::preferences_file(&self.root);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(Preferences::default());
        };
        let mut document: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse {}", path.display()))?;
        let mut preferences = match document.remove(PREFERENCES_KEY) {
            Some(value) => serde_json::from_value::<Preferences>(value)
                .with_context(|| format!("invalid preferences in {}", path.display()))?,
            None => Preferences::default(),
        };
        preferences.normalize();
        Ok(preferences)
    }

    /// Rewrites only the preferences key; other keys in the file are kept.
    pub fn save_preferences(&self, preferences: &Preferences) -> anyhow::Result<()> {
        let path = paths::preferences_file(&self.root);
        let mut document = match read_optional(&path)? {
            Some(bytes) => serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(
                &bytes,
            )
            .unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "discarding unreadable preferences file");
                serde_json::Map::new()
            }),
            None => serde_json::Map::new(),
        };
        let value = serde_json::to_value(preferences).context("failed to encode preferences")?;
        document.insert(PREFERENCES_KEY.to_owned(), value);
        let json = serde_json::to_vec_pretty(&document).context("failed to encode preferences")?;
        write_atomic(&path, &json)
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.{}.{nanos}.tmp", std::process::id()));

    std::fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    if std::fs::rename(&tmp, path).is_err() {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_test_dir;
    use arbor_domain::{AppearanceTheme, WorkspaceRepository};

    #[test]
    fn missing_files_load_as_defaults() {
        let dir = temp_test_dir("persist-missing");
        let store = Persistence::new(dir.join("state"));
        assert!(store.load_workspaces().expect("load").is_empty());
        assert_eq!(store.load_preferences().expect("load"), Preferences::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn workspaces_survive_save_and_load_in_sort_order() {
        let dir = temp_test_dir("persist-workspaces");
        let store = Persistence::new(dir.clone());

        let mut first = Workspace::new(
            "Oslo".to_owned(),
            WorkspaceRepository::new("/src/a".into(), "/ws/oslo".into(), "arbor/oslo".into()),
        );
        first.sort_order = 1;
        let mut second = Workspace::new(
            "Lima".to_owned(),
            WorkspaceRepository::new("/src/a".into(), "/ws/lima".into(), "arbor/lima".into()),
        );
        second.sort_order = 0;

        store
            .save_workspaces(&[first.clone(), second.clone()])
            .expect("save");
        let loaded = store.load_workspaces().expect("load");
        assert_eq!(loaded, vec![second, first]);

        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn preferences_live_under_their_key_and_keep_other_keys() {
        let dir = temp_test_dir("persist-prefs");
        let store = Persistence::new(dir.clone());
        std::fs::write(
            paths::preferences_file(&dir),
            r#"{"other.key": 7, "arbor.preferences": {"branch_prefix": "  me/ ", "terminal_font_size": 99}}"#,
        )
        .expect("seed");

        let mut prefs = store.load_preferences().expect("load");
        assert_eq!(prefs.branch_prefix, "me");
        assert_eq!(prefs.terminal_font_size, arbor_domain::MAX_TERMINAL_FONT_SIZE);

        prefs.theme = AppearanceTheme::Dark;
        store.save_preferences(&prefs).expect("save");

        let raw: serde_json::Value = serde_json::from_slice(
            &std::fs::read(paths::preferences_file(&dir)).expect("read"),
        )
        .expect("json");
        assert_eq!(raw["other.key"], 7);
        assert_eq!(raw[PREFERENCES_KEY]["theme"], "dark");
        assert_eq!(store.load_preferences().expect("reload"), prefs);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_workspace_file_is_an_error() {
        let dir = temp_test_dir("persist-corrupt");
        std::fs::write(paths::workspaces_file(&dir), b"not json").expect("seed");
        let store = Persistence::new(dir.clone());
        assert!(store.load_workspaces().is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
