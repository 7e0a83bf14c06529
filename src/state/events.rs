//! Events pushed from the update controller to the UI layer

use serde::Serialize;

use crate::changelog::ChangelogEntry;
use crate::update::UpdateCheckResult;

/// Phase reported on the download/install progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Downloading,
    Verifying,
    Extracting,
    Installing,
    RestartRequired,
    Cancelled,
    Error,
}

/// `{phase, percent, message}` payload of the progress stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateProgress {
    pub phase: UpdatePhase,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl UpdateProgress {
    pub fn new(phase: UpdatePhase, percent: u8, message: impl Into<String>) -> Self {
        Self { phase, percent, message: message.into(), code: None }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self { phase: UpdatePhase::Error, percent: 0, message: message.into(), code: Some(code.into()) }
    }
}

/// Events emitted by the update controller
#[derive(Debug, Clone)]
pub enum AppEvent {
    UpdateCheckStarted,
    UpToDate {
        version: String,
    },
    UpdateAvailable(UpdateCheckResult),
    UpdateCheckFailed {
        code: String,
        message: String,
    },
    DownloadProgress(UpdateProgress),
    InstallProgress(UpdateProgress),
    /// No installable artifact; the UI should open the release page instead.
    OpenReleasePage {
        version: String,
        url: String,
    },
    RestartDeferred {
        version: String,
    },
    UpdateApplied {
        version: String,
        whats_new: Vec<ChangelogEntry>,
    },
    UpdateFailed {
        version: String,
    },
}

pub type EventSender = futures::channel::mpsc::UnboundedSender<AppEvent>;
pub type EventReceiver = futures::channel::mpsc::UnboundedReceiver<AppEvent>;

/// Create the channel the UI listens on.
pub fn channel() -> (EventSender, EventReceiver) {
    futures::channel::mpsc::unbounded()
}
