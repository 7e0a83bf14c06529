//! Marker files passing update state between process lifetimes.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::types::UpdateOutcome;
use crate::state::ConfigManager;

/// An extracted update waiting to be applied on the next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedUpdateRecord {
    pub version: String,
    pub extract_path: PathBuf,
}

/// What the apply process did, reported once by the next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStateRecord {
    pub applied: bool,
    pub success: bool,
    pub version: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl UpdateStateRecord {
    pub fn now(version: impl Into<String>, success: bool) -> Self {
        Self {
            applied: true,
            success,
            version: version.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn outcome(&self) -> UpdateOutcome {
        let version = self.version.clone();
        if self.applied && self.success {
            UpdateOutcome::Applied { version }
        } else {
            UpdateOutcome::Failed { version }
        }
    }
}

impl ConfigManager {
    pub const STAGED_UPDATE_FILE: &'static str = "staged-update.json";
    pub const UPDATE_STATE_FILE: &'static str = "update-state.json";

    // =========================================================================
    // Staged update
    // =========================================================================

    /// Replace any existing staged record.
    pub fn save_staged_update(&self, record: &StagedUpdateRecord) -> Result<()> {
        self.save_json(Self::STAGED_UPDATE_FILE, record)
    }

    pub fn load_staged_update(&self) -> Result<Option<StagedUpdateRecord>> {
        self.load_json(Self::STAGED_UPDATE_FILE)
    }

    pub fn clear_staged_update(&self) -> Result<bool> {
        self.remove(Self::STAGED_UPDATE_FILE)
    }

    /// Load the staged record, deleting it when it cannot be read.
    pub fn load_staged_update_or_discard(&self) -> Option<StagedUpdateRecord> {
        match self.load_staged_update() {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Discarding unreadable {}: {e:#}", Self::STAGED_UPDATE_FILE);
                if let Err(e) = self.clear_staged_update() {
                    log::error!("Failed to remove {}: {e:#}", Self::STAGED_UPDATE_FILE);
                }
                None
            }
        }
    }

    // =========================================================================
    // Apply outcome
    // =========================================================================

    pub fn save_update_state(&self, record: &UpdateStateRecord) -> Result<()> {
        self.save_json(Self::UPDATE_STATE_FILE, record)
    }

    pub fn load_update_state(&self) -> Result<Option<UpdateStateRecord>> {
        self.load_json(Self::UPDATE_STATE_FILE)
    }

    /// Read and delete the outcome record; subsequent calls return `None`.
    pub fn take_update_state(&self) -> Result<Option<UpdateStateRecord>> {
        self.take_json(Self::UPDATE_STATE_FILE)
    }

    pub fn clear_update_state(&self) -> Result<bool> {
        self.remove(Self::UPDATE_STATE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn staged_record_uses_camel_case_on_disk() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = ConfigManager::with_dir(temp_dir.path()).expect("config");
        let record =
            StagedUpdateRecord { version: "1.4.0".into(), extract_path: PathBuf::from("/tmp/x") };

        config.save_staged_update(&record).expect("save");
        let raw = std::fs::read_to_string(config.file_path(ConfigManager::STAGED_UPDATE_FILE))
            .expect("read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("parse");

        assert_eq!(json["version"], "1.4.0");
        assert_eq!(json["extractPath"], "/tmp/x");
        assert_eq!(config.load_staged_update().expect("load"), Some(record));
    }

    #[test]
    fn saving_twice_keeps_one_record() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = ConfigManager::with_dir(temp_dir.path()).expect("config");

        for version in ["1.0.0", "1.1.0"] {
            let record = StagedUpdateRecord {
                version: version.into(),
                extract_path: temp_dir.path().join(version),
            };
            config.save_staged_update(&record).expect("save");
        }

        let loaded = config.load_staged_update().expect("load").expect("record");
        assert_eq!(loaded.version, "1.1.0");
    }

    #[test]
    fn unreadable_staged_record_is_discarded() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = ConfigManager::with_dir(temp_dir.path()).expect("config");
        let path = config.file_path(ConfigManager::STAGED_UPDATE_FILE);
        std::fs::write(&path, r#"{"version":"1.4.0"}"#).expect("write");

        assert!(config.load_staged_update().is_err());
        assert_eq!(config.load_staged_update_or_discard(), None);
        assert!(!path.exists());
    }

    #[test]
    fn update_state_is_taken_once() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = ConfigManager::with_dir(temp_dir.path()).expect("config");
        let record = UpdateStateRecord::now("1.4.0", true);
        config.save_update_state(&record).expect("save");

        assert_eq!(config.take_update_state().expect("take"), Some(record));
        assert_eq!(config.take_update_state().expect("take again"), None);
    }

    #[test]
    fn update_state_timestamp_is_epoch_millis() {
        let record = UpdateStateRecord::now("2.0.0", false);
        assert!(record.applied);
        assert!(!record.success);
        // Anything after 2020-01-01 in milliseconds.
        assert!(record.timestamp > 1_577_836_800_000);
    }
}
