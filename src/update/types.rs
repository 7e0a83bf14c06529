use serde::{Deserialize, Serialize};

/// Latest-release metadata as reported by a [`ReleaseSource`](super::ReleaseSource).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub version: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Outcome of comparing the running build with the latest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResult {
    pub current_version: String,
    pub latest_version: String,
    has_update: bool,
    pub download_url: Option<String>,
    pub release_notes: Option<String>,
    pub release_date: Option<String>,
    pub sha256: Option<String>,
}

impl UpdateCheckResult {
    pub fn new(current_version: impl Into<String>, release: ReleaseInfo) -> Self {
        let current_version = normalize_version(&current_version.into()).to_string();
        let latest_version = normalize_version(&release.version).to_string();
        let has_update = current_version != latest_version;
        Self {
            current_version,
            latest_version,
            has_update,
            download_url: release.download_url,
            release_notes: release.release_notes,
            release_date: release.release_date,
            sha256: release.sha256,
        }
    }

    pub fn has_update(&self) -> bool {
        self.has_update
    }
}

/// Strip surrounding whitespace and a leading `v` from a release tag.
pub fn normalize_version(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}

/// What started an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// Startup or periodic timer.
    Scheduled,
    /// The user asked for it.
    Manual,
}

/// Controller lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Idle,
    Checking,
    Available { version: String, download_url: Option<String> },
    Downloading { version: String, percent: u8 },
    Staging { version: String },
    RestartRequired { version: String },
}

impl UpdateStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, UpdateStatus::Downloading { .. } | UpdateStatus::Staging { .. })
    }
}

/// Result of the last apply, as observed on the next launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied { version: String },
    Failed { version: String },
}
