//! Update lifecycle: check, download, stage, hand off to the apply process.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::apply::updater_args;
use super::download::{Downloader, filename_from_url};
use super::launcher::{DetachedLauncher, Launcher};
use super::records::{StagedUpdateRecord, UpdateStateRecord};
use super::source::ReleaseSource;
use super::stage::{ArtifactKind, discard_staged_in_background, run_installer, stage_archive};
use super::types::{CheckTrigger, UpdateCheckResult, UpdateOutcome, UpdateStatus};
use crate::changelog;
use crate::error::{Error, Result, StageFailure};
use crate::helpers::fs::remove_file_if_exists;
use crate::state::{AppContext, AppEvent, EventSender, UpdatePhase, UpdateProgress};

/// Drives one installation's update lifecycle.
///
/// Cheap to clone; every clone shares the same state, so one task can call
/// [`cancel_update`](Self::cancel_update) while another awaits a download.
pub struct UpdateController<S: ReleaseSource> {
    inner: Arc<Inner<S>>,
}

impl<S: ReleaseSource> Clone for UpdateController<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct Inner<S> {
    ctx: Arc<AppContext>,
    source: S,
    downloader: Downloader,
    launcher: Arc<dyn Launcher>,
    status: Mutex<UpdateStatus>,
    cancel: Mutex<Option<CancellationToken>>,
    last_check: Mutex<Option<UpdateCheckResult>>,
    events: EventSender,
}

impl<S: ReleaseSource> UpdateController<S> {
    pub fn new(ctx: Arc<AppContext>, source: S, events: EventSender) -> Result<Self> {
        Self::with_launcher(ctx, source, events, Arc::new(DetachedLauncher))
    }

    pub fn with_launcher(
        ctx: Arc<AppContext>,
        source: S,
        events: EventSender,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self> {
        let downloader = Downloader::new(&ctx.update)?;
        let status = match ctx.config.load_staged_update_or_discard() {
            Some(record) => UpdateStatus::RestartRequired { version: record.version },
            None => UpdateStatus::Idle,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                source,
                downloader,
                launcher,
                status: Mutex::new(status),
                cancel: Mutex::new(None),
                last_check: Mutex::new(None),
                events,
            }),
        })
    }

    pub fn status(&self) -> UpdateStatus {
        self.inner.status.lock().clone()
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.ctx
    }

    fn set_status(&self, status: UpdateStatus) {
        log::debug!("Update status: {status:?}");
        *self.inner.status.lock() = status;
    }

    fn emit(&self, event: AppEvent) {
        if self.inner.events.unbounded_send(event).is_err() {
            log::debug!("Update event dropped: no listener");
        }
    }

    /// Whether the last completed check is older than the check interval.
    pub fn is_check_due(&self) -> bool {
        let Some(last) = self.inner.ctx.settings.last_update_check() else {
            return true;
        };
        let interval = i64::try_from(self.inner.ctx.update.check_interval.as_millis()).unwrap_or(i64::MAX);
        now_ms().saturating_sub(last) >= interval
    }

    /// Run a scheduled check if one is due.
    pub async fn check_if_due(&self) -> Result<Option<UpdateCheckResult>> {
        if !self.is_check_due() {
            log::debug!("Skipping update check; last check is recent");
            return Ok(None);
        }
        self.check_for_updates(CheckTrigger::Scheduled).await.map(Some)
    }

    /// Ask the release source for the latest version.
    ///
    /// Dismissed versions, and postponed ones until the postponement ends, leave
    /// the controller idle. While an update is staged the result is returned
    /// without leaving `RestartRequired`.
    pub async fn check_for_updates(&self, trigger: CheckTrigger) -> Result<UpdateCheckResult> {
        let previous = {
            let mut status = self.inner.status.lock();
            if status.is_busy() || *status == UpdateStatus::Checking {
                return Err(Error::Busy);
            }
            let previous = status.clone();
            if !matches!(previous, UpdateStatus::RestartRequired { .. }) {
                *status = UpdateStatus::Checking;
            }
            previous
        };
        let staged = matches!(previous, UpdateStatus::RestartRequired { .. });
        if !staged {
            self.emit(AppEvent::UpdateCheckStarted);
        }
        log::info!("Checking for updates ({trigger:?})");

        let release = match self.inner.source.latest_release().await {
            Ok(release) => release,
            Err(e) => {
                log::warn!("Update check failed: {e}");
                if !staged {
                    self.set_status(UpdateStatus::Idle);
                }
                self.emit(AppEvent::UpdateCheckFailed { code: e.code().to_string(), message: e.to_string() });
                return Err(e);
            }
        };

        let result = UpdateCheckResult::new(&self.inner.ctx.update.current_version, release);
        *self.inner.last_check.lock() = Some(result.clone());
        if let Err(e) = self.inner.ctx.settings.set_last_update_check(now_ms()) {
            log::warn!("Failed to record update check time: {e}");
        }

        if staged {
            log::info!("Update already staged; latest is {}", result.latest_version);
            return Ok(result);
        }

        if !result.has_update() {
            log::info!("Up to date ({})", result.current_version);
            self.set_status(UpdateStatus::Idle);
            self.emit(AppEvent::UpToDate { version: result.current_version.clone() });
            return Ok(result);
        }

        let suppression = self
            .inner
            .ctx
            .settings
            .update_suppression(&result.latest_version, now_ms())
            .unwrap_or_else(|e| {
                log::warn!("Failed to read update suppression: {e}");
                None
            });
        if suppression.is_some() {
            log::info!("Update {} available but suppressed ({suppression:?})", result.latest_version);
            self.set_status(UpdateStatus::Idle);
            return Ok(result);
        }

        log::info!("Update available: {} -> {}", result.current_version, result.latest_version);
        self.set_status(UpdateStatus::Available {
            version: result.latest_version.clone(),
            download_url: result.download_url.clone(),
        });
        self.emit(AppEvent::UpdateAvailable(result.clone()));
        Ok(result)
    }

    /// Never offer `version` again.
    pub fn dismiss_update(&self, version: &str) -> Result<()> {
        self.inner.ctx.settings.dismiss_update(version)?;
        log::info!("Dismissed update {version}");
        self.leave_available(version);
        Ok(())
    }

    /// Hide `version` from checks for one check interval.
    pub fn postpone_update(&self, version: &str) -> Result<()> {
        let interval = i64::try_from(self.inner.ctx.update.check_interval.as_millis()).unwrap_or(i64::MAX);
        let until = now_ms().saturating_add(interval);
        self.inner.ctx.settings.postpone_update(version, until)?;
        log::info!("Postponed update {version}");
        self.leave_available(version);
        Ok(())
    }

    fn leave_available(&self, version: &str) {
        let mut status = self.inner.status.lock();
        if let UpdateStatus::Available { version: offered, .. } = &*status
            && offered == version
        {
            *status = UpdateStatus::Idle;
        }
    }

    /// Result of the most recent successful check.
    pub fn last_check(&self) -> Option<UpdateCheckResult> {
        self.inner.last_check.lock().clone()
    }

    /// Download the artifact for `version` and stage it for the next restart.
    ///
    /// Without a URL the release page is offered instead and `NoArtifact` is returned.
    pub async fn download_and_install_update(&self, download_url: Option<&str>, version: &str) -> Result<()> {
        if self.inner.status.lock().is_busy() {
            return Err(Error::Busy);
        }
        // Digest is only known when the request matches the last check.
        let sha256 = self
            .inner
            .last_check
            .lock()
            .as_ref()
            .filter(|check| check.latest_version == version)
            .and_then(|check| check.sha256.clone());
        let available = UpdateStatus::Available {
            version: version.to_string(),
            download_url: download_url.map(String::from),
        };

        let Some(url) = download_url.filter(|u| !u.trim().is_empty()) else {
            log::info!("Update {version} has no download; opening release page");
            self.settle(available);
            self.emit(AppEvent::OpenReleasePage {
                version: version.to_string(),
                url: self.inner.ctx.update.release_page.clone(),
            });
            return Err(Error::NoArtifact { version: version.to_string() });
        };

        let token = CancellationToken::new();
        {
            let mut status = self.inner.status.lock();
            if status.is_busy() {
                return Err(Error::Busy);
            }
            *status = UpdateStatus::Downloading { version: version.to_string(), percent: 0 };
            *self.inner.cancel.lock() = Some(token.clone());
        }

        let result = self.download_and_stage(url, version, sha256.as_deref(), &token).await;
        self.inner.cancel.lock().take();

        match result {
            Ok(()) => {
                log::info!("Update {version} ready; restart required");
                self.set_status(UpdateStatus::RestartRequired { version: version.to_string() });
                self.emit(AppEvent::InstallProgress(UpdateProgress::new(
                    UpdatePhase::RestartRequired,
                    100,
                    format!("Version {version} is ready. Restart to finish updating."),
                )));
                Ok(())
            }
            Err(Error::Cancelled) => {
                log::info!("Download of {version} cancelled");
                self.settle(available);
                self.emit(AppEvent::DownloadProgress(UpdateProgress::new(
                    UpdatePhase::Cancelled,
                    0,
                    "Download cancelled",
                )));
                Err(Error::Cancelled)
            }
            Err(e) => {
                log::error!("Update {version} failed: {e}");
                self.settle(available);
                let progress = UpdateProgress::error(e.code(), e.to_string());
                if matches!(e, Error::StageFailed { .. }) {
                    self.emit(AppEvent::InstallProgress(progress));
                } else {
                    self.emit(AppEvent::DownloadProgress(progress));
                }
                Err(e)
            }
        }
    }

    /// Return to `RestartRequired` if an earlier update is still staged, else to `fallback`.
    fn settle(&self, fallback: UpdateStatus) {
        match self.inner.ctx.config.load_staged_update_or_discard() {
            Some(record) => {
                log::info!("Update {} is still staged", record.version);
                self.set_status(UpdateStatus::RestartRequired { version: record.version });
            }
            None => self.set_status(fallback),
        }
    }

    async fn download_and_stage(
        &self,
        url: &str,
        version: &str,
        sha256: Option<&str>,
        token: &CancellationToken,
    ) -> Result<()> {
        let kind = filename_from_url(url)
            .and_then(|name| ArtifactKind::from_path(Path::new(&name)))
            .ok_or_else(|| Error::stage(StageFailure::InvalidArtifact, format!("Unsupported update file: {url}")))?;

        let updates_dir = self.inner.ctx.config.updates_dir();
        let artifact = self
            .inner
            .downloader
            .download(url, &updates_dir, sha256, token, |progress| {
                if let UpdateStatus::Downloading { percent, .. } = &mut *self.inner.status.lock() {
                    *percent = progress.percent;
                }
                self.emit(AppEvent::DownloadProgress(progress));
            })
            .await;
        // Nothing left to cancel once the transfer is over.
        self.inner.cancel.lock().take();
        let artifact = artifact?;

        self.set_status(UpdateStatus::Staging { version: version.to_string() });
        let config = &self.inner.ctx.config;

        if kind.is_installer() {
            self.emit(AppEvent::InstallProgress(UpdateProgress::new(
                UpdatePhase::Installing,
                0,
                format!("Installing version {version}"),
            )));
            discard_staged_in_background(config).await?;
            run_installer(&artifact, kind).await?;
            if let Err(e) = remove_file_if_exists(&artifact) {
                log::warn!("Failed to remove installer {}: {e}", artifact.display());
            }
        } else {
            self.emit(AppEvent::InstallProgress(UpdateProgress::new(
                UpdatePhase::Extracting,
                0,
                format!("Preparing version {version}"),
            )));
            stage_archive(config, &artifact, kind, version).await?;
        }
        Ok(())
    }

    /// Abort an in-flight download. Returns whether one was running.
    pub fn cancel_update(&self) -> bool {
        match self.inner.cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Launch the apply process detached. The caller must exit right after.
    pub fn restart_app(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        let args = updater_args(&ctx.config, &ctx.layout, ctx.update.apply_delay);
        log::info!("Handing off to {}", ctx.layout.updater.display());
        self.inner
            .launcher
            .launch_detached(&ctx.layout.updater, &args)
            .map_err(|e| Error::ApplyFailed(format!("Cannot start {}: {e}", ctx.layout.updater.display())))
    }

    pub fn restart_now(&self) -> Result<()> {
        self.restart_app()
    }

    /// Keep the staged update for the next natural restart.
    pub fn restart_later(&self) {
        if let UpdateStatus::RestartRequired { version } = self.status() {
            log::info!("Restart for {version} deferred");
            self.emit(AppEvent::RestartDeferred { version });
        }
    }

    /// Consume the result of the last apply, if any. Returns it once.
    pub fn check_update_state(&self) -> Result<Option<UpdateStateRecord>> {
        let Some(record) = self.inner.ctx.config.take_update_state()? else {
            return Ok(None);
        };

        match record.outcome() {
            UpdateOutcome::Applied { version } => {
                log::info!("Update to {version} applied");
                self.mark_update_completed(&version)?;
                let whats_new = changelog::whats_new(&version);
                self.emit(AppEvent::UpdateApplied { version, whats_new });
            }
            UpdateOutcome::Failed { version } => {
                log::warn!("Update to {version} was not applied");
                self.emit(AppEvent::UpdateFailed { version });
            }
        }
        Ok(Some(record))
    }

    /// Forget everything recorded about a finished update to `version`.
    pub fn mark_update_completed(&self, version: &str) -> Result<()> {
        let ctx = &self.inner.ctx;
        ctx.config.clear_update_state()?;
        ctx.settings.clear_update_suppression(version)?;
        ctx.settings.set_app_version(version)?;
        Ok(())
    }

    pub fn staged_update(&self) -> Result<Option<StagedUpdateRecord>> {
        Ok(self.inner.ctx.config.load_staged_update()?)
    }

    pub fn has_staged_update(&self) -> bool {
        matches!(self.staged_update(), Ok(Some(_)))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
