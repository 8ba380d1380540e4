use arbor_domain::{AppearanceTheme, TerminalAppearance, TerminalFont};
use std::sync::Mutex;
use tokio::sync::broadcast;

const APPEARANCE_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppearanceEvent {
    Theme(AppearanceTheme),
    Font(TerminalFont),
}

/// Owns the current terminal appearance and fans changes out to subscribers.
pub struct AppearanceHub {
    current: Mutex<TerminalAppearance>,
    tx: broadcast::Sender<AppearanceEvent>,
}

impl AppearanceHub {
    pub fn new(initial: TerminalAppearance) -> Self {
        let (tx, _) = broadcast::channel(APPEARANCE_CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(initial),
            tx,
        }
    }

    pub fn current(&self) -> TerminalAppearance {
        self.current
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppearanceEvent> {
        self.tx.subscribe()
    }

    /// Returns `false` when the theme was already current.
    pub fn publish_theme(&self, theme: AppearanceTheme) -> bool {
        {
            let mut current = self.current.lock().unwrap_or_else(|err| err.into_inner());
            if current.theme == theme {
                return false;
            }
            current.theme = theme;
        }
        let _ = self.tx.send(AppearanceEvent::Theme(theme));
        true
    }

    pub fn publish_font(&self, font: TerminalFont) -> bool {
        {
            let mut current = self.current.lock().unwrap_or_else(|err| err.into_inner());
            if current.font == font {
                return false;
            }
            current.font = font.clone();
        }
        let _ = self.tx.send(AppearanceEvent::Font(font));
        true
    }
}
