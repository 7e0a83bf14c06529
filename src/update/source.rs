use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use super::config::UpdateConfig;
use super::types::ReleaseInfo;
use crate::error::{Error, Result};

#[cfg(target_os = "windows")]
const PLATFORM: &str = "windows";
#[cfg(target_os = "macos")]
const PLATFORM: &str = "macos";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const PLATFORM: &str = "linux";

/// Artifact suffixes in order of preference.
const ASSET_SUFFIXES: &[&str] = &[".zip", ".tar.gz", ".tgz", ".exe", ".msi"];

/// Anything that can tell us which release is the latest.
pub trait ReleaseSource: Send + Sync + 'static {
    fn latest_release(&self) -> impl Future<Output = Result<ReleaseInfo>> + Send;
}

/// Fetches release metadata over HTTP.
///
/// Understands a flat manifest (`{"version", "downloadUrl", ...}`) and the
/// GitHub "latest release" response.
#[derive(Clone)]
pub struct HttpReleaseSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReleaseSource {
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::CheckFailed(e.to_string()))?;
        Ok(Self { client, endpoint: config.endpoint.clone() })
    }
}

impl ReleaseSource for HttpReleaseSource {
    async fn latest_release(&self) -> Result<ReleaseInfo> {
        let resp = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::CheckFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::CheckFailed(format!("{} returned HTTP {status}", self.endpoint)));
        }

        let json: Value = resp.json().await.map_err(|e| Error::CheckFailed(e.to_string()))?;
        parse_release(&json)
            .ok_or_else(|| Error::CheckFailed("release metadata has no version".to_string()))
    }
}

/// Interpret a release response. Returns `None` when no version can be found.
pub fn parse_release(json: &Value) -> Option<ReleaseInfo> {
    let str_field = |names: &[&str]| {
        names.iter().find_map(|name| json[*name].as_str()).map(String::from)
    };

    let version = str_field(&["version", "tag_name"])?;
    if version.trim().is_empty() {
        return None;
    }

    Some(ReleaseInfo {
        version,
        download_url: str_field(&["downloadUrl", "download_url"]).or_else(|| find_asset_url(json)),
        release_notes: str_field(&["releaseNotes", "body"]),
        release_date: str_field(&["releaseDate", "published_at"]),
        sha256: str_field(&["sha256"]),
    })
}

/// Find the platform-matching artifact among GitHub release assets.
fn find_asset_url(release: &Value) -> Option<String> {
    let assets = release["assets"].as_array()?;
    ASSET_SUFFIXES.iter().find_map(|suffix| {
        assets.iter().find_map(|a| {
            let name = a["name"].as_str()?.to_ascii_lowercase();
            if name.contains(PLATFORM) && name.ends_with(suffix) {
                a["browser_download_url"].as_str().map(String::from)
            } else {
                None
            }
        })
    })
}
