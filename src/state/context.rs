use anyhow::Result;

use super::config::ConfigManager;
use super::settings::SettingsStore;
use crate::update::{InstallLayout, UpdateConfig};

/// Everything a component needs to know about this installation.
///
/// Built once at startup and shared by reference; nothing in the crate keeps
/// process-wide state of its own.
pub struct AppContext {
    pub config: ConfigManager,
    pub settings: SettingsStore,
    pub update: UpdateConfig,
    pub layout: InstallLayout,
}

impl AppContext {
    pub fn new(config: ConfigManager, update: UpdateConfig, layout: InstallLayout) -> Result<Self> {
        let settings = SettingsStore::load(config.clone())?;
        Ok(Self { config, settings, update, layout })
    }

    /// Platform config directory, environment overrides and the running executable's layout.
    pub fn detect() -> Result<Self> {
        Self::new(ConfigManager::new()?, UpdateConfig::from_env(), InstallLayout::detect()?)
    }
}
