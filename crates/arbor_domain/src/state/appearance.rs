#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppearanceTheme {
    Light,
    Dark,
    #[default]
    System,
}

impl AppearanceTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

pub const DEFAULT_TERMINAL_FONT_SIZE: u16 = 13;
pub const MIN_TERMINAL_FONT_SIZE: u16 = 8;
pub const MAX_TERMINAL_FONT_SIZE: u16 = 32;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TerminalFont {
    pub size: u16,
    pub family: Option<String>,
}

impl TerminalFont {
    pub fn new(size: u16, family: Option<String>) -> Self {
        Self {
            size: size.clamp(MIN_TERMINAL_FONT_SIZE, MAX_TERMINAL_FONT_SIZE),
            family: family
                .map(|f| f.trim().to_owned())
                .filter(|f| !f.is_empty()),
        }
    }
}

impl Default for TerminalFont {
    fn default() -> Self {
        Self {
            size: DEFAULT_TERMINAL_FONT_SIZE,
            family: None,
        }
    }
}

/// Everything a terminal renderer needs to restyle itself.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TerminalAppearance {
    pub theme: AppearanceTheme,
    pub font: TerminalFont,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_parse_roundtrips_as_str() {
        for theme in [
            AppearanceTheme::Light,
            AppearanceTheme::Dark,
            AppearanceTheme::System,
        ] {
            assert_eq!(AppearanceTheme::parse(theme.as_str()), Some(theme));
        }
        assert_eq!(AppearanceTheme::parse("solarized"), None);
    }

    #[test]
    fn terminal_font_clamps_size_and_drops_blank_family() {
        let font = TerminalFont::new(200, Some("   ".to_owned()));
        assert_eq!(font.size, MAX_TERMINAL_FONT_SIZE);
        assert_eq!(font.family, None);

        let font = TerminalFont::new(2, Some(" JetBrains Mono ".to_owned()));
        assert_eq!(font.size, MIN_TERMINAL_FONT_SIZE);
        assert_eq!(font.family.as_deref(), Some("JetBrains Mono"));
    }
}
