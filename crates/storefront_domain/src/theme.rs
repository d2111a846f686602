//! Theme settings.

use serde::{Deserialize, Serialize};
use storefront_sync::SyncContext;

use crate::keys::THEME_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
/// Color scheme selection.
pub enum ThemeMode {
    /// Always light.
    Light,
    /// Always dark.
    Dark,
    /// Follow the operating system.
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Persisted appearance preferences.
pub struct ThemeSettings {
    /// Color scheme.
    pub mode: ThemeMode,
    /// Accent color as a CSS color string.
    pub accent: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            mode: ThemeMode::System,
            accent: "#2f6feb".to_string(),
        }
    }
}

impl ThemeSettings {
    /// Returns whether the dark palette applies given the system preference.
    pub fn is_dark(&self, system_prefers_dark: bool) -> bool {
        match self.mode {
            ThemeMode::Light => false,
            ThemeMode::Dark => true,
            ThemeMode::System => system_prefers_dark,
        }
    }
}

/// Returns the stored settings or the defaults.
pub fn load(ctx: &SyncContext) -> ThemeSettings {
    ctx.get(THEME_KEY, ThemeSettings::default())
}

/// Stores `settings`.
pub fn save(ctx: &SyncContext, settings: &ThemeSettings) {
    ctx.set(THEME_KEY, settings);
}

/// Changes only the color scheme.
pub fn set_mode(ctx: &SyncContext, mode: ThemeMode) {
    let mut settings = load(ctx);
    settings.mode = mode;
    save(ctx, &settings);
}
