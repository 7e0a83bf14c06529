//! Streaming artifact download with throttled progress and cancellation.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt as _;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt as _;
use tokio_util::sync::CancellationToken;

use super::config::UpdateConfig;
use crate::error::{Error, Result};
use crate::helpers::{format_transfer, percent_of};
use crate::state::events::{UpdatePhase, UpdateProgress};

/// Decides when a progress event is worth sending.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_percent: Option<u8>,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_percent: None, last_emit: None }
    }

    /// True on a whole-percent change, or once `interval` has elapsed since the last emit.
    pub fn should_emit(&mut self, percent: u8, now: Instant) -> bool {
        let percent_changed = self.last_percent != Some(percent);
        let interval_elapsed =
            self.last_emit.is_none_or(|last| now.duration_since(last) >= self.interval);
        if percent_changed || interval_elapsed {
            self.last_percent = Some(percent);
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|s| !s.is_empty() && !s.contains(':')).map(String::from)
}

pub struct Downloader {
    client: reqwest::Client,
    progress_interval: Duration,
}

impl Downloader {
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::DownloadFailed(e.to_string()))?;
        Ok(Self { client, progress_interval: config.progress_interval })
    }

    /// Download `url` into `dest_dir`, returning the path of the finished file.
    ///
    /// Bytes go to `<file>.part` first; on any failure or cancellation the
    /// partial file is removed before returning.
    pub async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        expected_sha256: Option<&str>,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(UpdateProgress),
    ) -> Result<PathBuf> {
        let filename = filename_from_url(url)
            .ok_or_else(|| Error::DownloadFailed(format!("Cannot derive a file name from {url}")))?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let target = dest_dir.join(&filename);
        let partial = dest_dir.join(format!("{filename}.part"));

        let result = self.stream_to_file(url, &partial, expected_sha256, cancel, &mut on_progress).await;
        if let Err(e) = result {
            if let Err(rm) = tokio::fs::remove_file(&partial).await
                && rm.kind() != std::io::ErrorKind::NotFound
            {
                log::warn!("Failed to remove partial download {}: {rm}", partial.display());
            }
            return Err(e);
        }

        tokio::fs::rename(&partial, &target).await?;
        log::info!("Downloaded {url} to {}", target.display());
        Ok(target)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        partial: &Path,
        expected_sha256: Option<&str>,
        cancel: &CancellationToken,
        on_progress: &mut impl FnMut(UpdateProgress),
    ) -> Result<()> {
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.client.get(url).send() => resp.map_err(|e| Error::DownloadFailed(e.to_string()))?,
        };
        let resp = resp.error_for_status().map_err(|e| Error::DownloadFailed(e.to_string()))?;
        let total = resp.content_length();

        let mut file = tokio::fs::File::create(partial).await?;
        let mut stream = resp.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut throttle = ProgressThrottle::new(self.progress_interval);

        on_progress(UpdateProgress::new(UpdatePhase::Downloading, 0, "Starting download"));

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| Error::DownloadFailed(e.to_string()))?;

            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            let percent = percent_of(downloaded, total);
            if throttle.should_emit(percent, Instant::now()) {
                on_progress(UpdateProgress::new(
                    UpdatePhase::Downloading,
                    percent,
                    format!("Downloading update ({})", format_transfer(downloaded, total)),
                ));
            }
        }

        file.flush().await?;
        drop(file);

        if let Some(total) = total
            && downloaded != total
        {
            return Err(Error::DownloadFailed(format!(
                "Size mismatch: expected {total} bytes, received {downloaded}"
            )));
        }

        if let Some(expected) = expected_sha256 {
            on_progress(UpdateProgress::new(UpdatePhase::Verifying, 100, "Verifying download"));
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(Error::DownloadFailed(format!(
                    "Checksum mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        Ok(())
    }
}
