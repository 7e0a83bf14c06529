use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.github.com/repos/statusboard-app/statusboard/releases/latest";
const DEFAULT_RELEASE_PAGE: &str = "https://github.com/statusboard-app/statusboard/releases/latest";

pub const ENDPOINT_ENV: &str = "STATUSBOARD_UPDATE_URL";
pub const RELEASE_PAGE_ENV: &str = "STATUSBOARD_RELEASE_PAGE";
pub const CHECK_INTERVAL_ENV: &str = "STATUSBOARD_CHECK_INTERVAL_SECS";

/// Tunables for checking, downloading and applying updates.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Latest-release metadata endpoint.
    pub endpoint: String,
    /// Page opened when a release has no installable artifact.
    pub release_page: String,
    /// Minimum time between scheduled checks; also the length of a postponement.
    pub check_interval: Duration,
    /// Progress events are emitted on whole-percent changes or after this much time.
    pub progress_interval: Duration,
    /// How long the apply process waits for the parent to release file handles.
    pub apply_delay: Duration,
    /// Version of the running build.
    pub current_version: String,
    pub user_agent: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        let current_version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            release_page: DEFAULT_RELEASE_PAGE.to_string(),
            check_interval: Duration::from_secs(6 * 60 * 60),
            progress_interval: Duration::from_millis(500),
            apply_delay: Duration::from_millis(1500),
            user_agent: format!("StatusBoard/{current_version}"),
            current_version,
        }
    }
}

impl UpdateConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(ENDPOINT_ENV) {
            config.endpoint = url;
        }
        if let Ok(url) = std::env::var(RELEASE_PAGE_ENV) {
            config.release_page = url;
        }
        if let Ok(raw) = std::env::var(CHECK_INTERVAL_ENV) {
            match raw.parse::<u64>() {
                Ok(secs) => config.check_interval = Duration::from_secs(secs),
                Err(_) => log::warn!("Ignoring invalid {CHECK_INTERVAL_ENV}={raw}"),
            }
        }
        config
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}
