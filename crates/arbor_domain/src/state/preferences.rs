use std::path::PathBuf;

use super::{AppearanceTheme, TerminalAppearance, TerminalFont};

pub const DEFAULT_BRANCH_PREFIX: &str = "arbor";
pub const MAX_RECENT_REPOSITORIES: usize = 10;
pub const MAX_RECENT_WORKSPACE_NAMES: usize = 20;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorChoice {
    #[default]
    Vscode,
    Cursor,
    Zed,
    Xcode,
}

impl EditorChoice {
    pub fn bundle_identifier(self) -> &'static str {
        match self {
            Self::Vscode => "com.microsoft.VSCode",
            Self::Cursor => "com.todesktop.230313mzl4w4u92",
            Self::Zed => "dev.zed.Zed",
            Self::Xcode => "com.apple.dt.Xcode",
        }
    }

    pub fn app_name(self) -> &'static str {
        match self {
            Self::Vscode => "Visual Studio Code",
            Self::Cursor => "Cursor",
            Self::Zed => "Zed",
            Self::Xcode => "Xcode",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingProviderKind {
    GitLab,
    GitHub,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HostingSettings {
    pub provider: Option<HostingProviderKind>,
    pub base_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub root_directory: Option<PathBuf>,
    pub branch_prefix: String,
    pub recent_repositories: Vec<PathBuf>,
    pub recent_workspace_names: Vec<String>,
    pub theme: AppearanceTheme,
    pub terminal_font_size: u16,
    pub terminal_font_family: Option<String>,
    pub sidebar_width: Option<u16>,
    pub terminal_pane_height: Option<u16>,
    pub editor: EditorChoice,
    pub hosting: HostingSettings,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            root_directory: None,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_owned(),
            recent_repositories: Vec::new(),
            recent_workspace_names: Vec::new(),
            theme: AppearanceTheme::default(),
            terminal_font_size: super::appearance::DEFAULT_TERMINAL_FONT_SIZE,
            terminal_font_family: None,
            sidebar_width: None,
            terminal_pane_height: None,
            editor: EditorChoice::default(),
            hosting: HostingSettings::default(),
        }
    }
}

impl Preferences {
    pub fn terminal_appearance(&self) -> TerminalAppearance {
        TerminalAppearance {
            theme: self.theme,
            font: TerminalFont::new(self.terminal_font_size, self.terminal_font_family.clone()),
        }
    }

    pub fn record_recent_repository(&mut self, path: PathBuf) {
        self.recent_repositories.retain(|p| *p != path);
        self.recent_repositories.insert(0, path);
        self.recent_repositories.truncate(MAX_RECENT_REPOSITORIES);
    }

    pub fn record_recent_workspace_name(&mut self, name: &str) {
        self.recent_workspace_names.retain(|n| n != name);
        self.recent_workspace_names.insert(0, name.to_owned());
        self.recent_workspace_names
            .truncate(MAX_RECENT_WORKSPACE_NAMES);
    }

    /// Repairs values that older or hand-edited files may carry.
    pub fn normalize(&mut self) {
        let prefix = self.branch_prefix.trim().trim_matches('/');
        self.branch_prefix = if prefix.is_empty() || prefix.len() > 64 {
            DEFAULT_BRANCH_PREFIX.to_owned()
        } else {
            prefix.to_owned()
        };

        let font = TerminalFont::new(self.terminal_font_size, self.terminal_font_family.take());
        self.terminal_font_size = font.size;
        self.terminal_font_family = font.family;

        let mut seen = Vec::with_capacity(self.recent_repositories.len());
        for path in self.recent_repositories.drain(..) {
            if !seen.contains(&path) {
                seen.push(path);
            }
        }
        seen.truncate(MAX_RECENT_REPOSITORIES);
        self.recent_repositories = seen;
        self.recent_workspace_names
            .truncate(MAX_RECENT_WORKSPACE_NAMES);

        self.root_directory = self
            .root_directory
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"theme":"dark"}"#).expect("partial prefs should load");
        assert_eq!(prefs.theme, AppearanceTheme::Dark);
        assert_eq!(prefs.branch_prefix, DEFAULT_BRANCH_PREFIX);
        assert_eq!(prefs.editor, EditorChoice::Vscode);
    }

    #[test]
    fn record_recent_repository_dedupes_and_bounds() {
        let mut prefs = Preferences::default();
        for i in 0..15 {
            prefs.record_recent_repository(PathBuf::from(format!("/r/{i}")));
        }
        prefs.record_recent_repository(PathBuf::from("/r/10"));
        assert_eq!(prefs.recent_repositories.len(), MAX_RECENT_REPOSITORIES);
        assert_eq!(prefs.recent_repositories[0], PathBuf::from("/r/10"));
        assert_eq!(
            prefs
                .recent_repositories
                .iter()
                .filter(|p| **p == PathBuf::from("/r/10"))
                .count(),
            1
        );
    }

    #[test]
    fn normalize_repairs_prefix_font_and_duplicates() {
        let mut prefs = Preferences {
            branch_prefix: "  /feature/ ".to_owned(),
            terminal_font_size: 99,
            terminal_font_family: Some(" ".to_owned()),
            recent_repositories: vec![PathBuf::from("/a"), PathBuf::from("/a")],
            root_directory: Some(PathBuf::new()),
            ..Preferences::default()
        };
        prefs.normalize();
        assert_eq!(prefs.branch_prefix, "feature");
        assert_eq!(prefs.terminal_font_size, 32);
        assert_eq!(prefs.terminal_font_family, None);
        assert_eq!(prefs.recent_repositories, vec![PathBuf::from("/a")]);
        assert_eq!(prefs.root_directory, None);
    }
}
