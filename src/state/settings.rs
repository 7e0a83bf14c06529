//! Application settings with persistence.
//!
//! `settings.json` is a flat map of setting name to JSON value. Other components
//! (update suppression markers, the last-check timestamp) add their own keys.

use std::collections::BTreeMap;

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::ConfigManager;

/// Well-known setting names.
pub mod keys {
    pub const LAUNCH_AT_STARTUP: &str = "launchAtStartup";
    pub const MINIMIZE_TO_TRAY: &str = "minimizeToTray";
    pub const THEME: &str = "theme";
    pub const NOTIFICATION_SOUND: &str = "notificationSound";
    pub const APP_VERSION: &str = "appVersion";
    pub const LAST_UPDATE_CHECK: &str = "lastUpdateCheck";
}

/// Application theme
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
    #[default]
    System,
}

impl Theme {
    pub fn label(self) -> &'static str {
        match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
            Theme::System => "System",
        }
    }

    pub fn all() -> &'static [Theme] {
        &[Theme::Dark, Theme::Light, Theme::System]
    }
}

/// Key-value settings backed by `settings.json`, cached in memory.
pub struct SettingsStore {
    config: ConfigManager,
    values: RwLock<BTreeMap<String, Value>>,
}

impl SettingsStore {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Load settings from disk. A missing file yields an empty store.
    pub fn load(config: ConfigManager) -> Result<Self> {
        let values = config.load_json(Self::SETTINGS_FILE)?.unwrap_or_default();
        Ok(Self { config, values: RwLock::new(values) })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.read().get(key).and_then(Value::as_i64)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.read().get(key).and_then(Value::as_str).map(String::from)
    }

    /// Set a value and write the whole map back to disk.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.into());
        self.config.save_json(Self::SETTINGS_FILE, &*values)
    }

    /// Remove a key. Returns whether it was present; the file is only rewritten if it was.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut values = self.values.write();
        if values.remove(key).is_none() {
            return Ok(false);
        }
        self.config.save_json(Self::SETTINGS_FILE, &*values)?;
        Ok(true)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values.read().keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    pub fn launch_at_startup(&self) -> bool {
        self.get_bool(keys::LAUNCH_AT_STARTUP).unwrap_or(false)
    }

    pub fn minimize_to_tray(&self) -> bool {
        self.get_bool(keys::MINIMIZE_TO_TRAY).unwrap_or(true)
    }

    pub fn notification_sound(&self) -> bool {
        self.get_bool(keys::NOTIFICATION_SOUND).unwrap_or(true)
    }

    pub fn theme(&self) -> Theme {
        self.get(keys::THEME).and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set(keys::THEME, serde_json::to_value(theme)?)
    }

    /// Version recorded by the last successful startup or completed update.
    pub fn app_version(&self) -> Option<String> {
        self.get_string(keys::APP_VERSION)
    }

    pub fn set_app_version(&self, version: &str) -> Result<()> {
        self.set(keys::APP_VERSION, version)
    }

    /// Epoch milliseconds of the last completed update check.
    pub fn last_update_check(&self) -> Option<i64> {
        self.get_i64(keys::LAST_UPDATE_CHECK)
    }

    pub fn set_last_update_check(&self, epoch_ms: i64) -> Result<()> {
        self.set(keys::LAST_UPDATE_CHECK, epoch_ms)
    }
}
