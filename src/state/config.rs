// Configuration management for persistent state

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[cfg(debug_assertions)]
const APP_NAME: &str = "statusboard-dev";

#[cfg(not(debug_assertions))]
const APP_NAME: &str = "statusboard";

/// Environment override for the application directory (used by the updater and tests).
pub const APP_DIR_ENV: &str = "STATUSBOARD_APP_DIR";

/// Manages the application-owned private directory and the JSON files inside it
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, initializing the config directory if needed
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(APP_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => Self::get_config_dir()?,
        };
        Self::with_dir(config_dir)
    }

    /// Use an explicit directory instead of the platform default.
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }
        Ok(Self { config_dir })
    }

    /// Get the platform-specific config directory
    fn get_config_dir() -> Result<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_NAME)).context("Could not determine config directory")
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.config_dir.join(filename)
    }

    /// Download and staging area for update artifacts.
    pub fn updates_dir(&self) -> PathBuf {
        self.config_dir.join("updates")
    }

    /// Load data from a JSON file
    pub fn load_json<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);

        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", filename)),
        };

        let value: T = serde_json::from_str(&data)
            .with_context(|| format!("Failed to deserialize {}", filename))?;

        Ok(Some(value))
    }

    /// Save data to a JSON file (atomic via temp + rename).
    pub fn save_json<T: Serialize + ?Sized>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.file_path(filename);

        let json = serde_json::to_string_pretty(data)
            .with_context(|| format!("Failed to serialize {}", filename))?;

        atomic_write(&path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", filename))?;

        Ok(())
    }

    /// Read a JSON file and remove it in one step.
    ///
    /// The file is first renamed to a private name, so a concurrent or repeated
    /// reader sees nothing even if this process dies before the unlink.
    pub fn take_json<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        let claimed = self.file_path(&format!("{filename}.taking"));

        match fs::rename(&path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to claim {}", filename)),
        }

        let data = fs::read_to_string(&claimed);
        let _ = fs::remove_file(&claimed);
        let data = data.with_context(|| format!("Failed to read {}", filename))?;

        let value: T = serde_json::from_str(&data)
            .with_context(|| format!("Failed to deserialize {}", filename))?;

        Ok(Some(value))
    }

    /// Delete a config file. Returns whether a file was actually removed.
    pub fn remove(&self, filename: &str) -> Result<bool> {
        match fs::remove_file(self.file_path(filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", filename)),
        }
    }
}

/// Write `data` to `path` atomically: write to a sibling temp file first, then
/// rename.  `rename` is atomic on POSIX (same filesystem), so readers never see
/// a truncated or partially-written file.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(path);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
