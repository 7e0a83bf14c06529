use thiserror::Error;

/// Why staging a downloaded artifact failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFailure {
    /// Unknown artifact type, or an archive without the application package.
    InvalidArtifact,
    /// The archive could not be unpacked.
    Extract,
    /// The silent installer could not be started or exited non-zero.
    Install,
}

/// Application-wide error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("Update check failed: {0}")]
    CheckFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Staging failed: {message}")]
    StageFailed { kind: StageFailure, message: String },

    #[error("Apply failed: {0}")]
    ApplyFailed(String),

    #[error("Version {version} has no installable download")]
    NoArtifact { version: String },

    #[error("Another update is already in progress")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn stage(kind: StageFailure, message: impl Into<String>) -> Self {
        Self::StageFailed { kind, message: message.into() }
    }

    /// Stable code reported to the UI layer alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::CheckFailed(_) | Error::DownloadFailed(_) => "network-error",
            Error::StageFailed { kind: StageFailure::InvalidArtifact, .. } => "invalid-artifact",
            Error::StageFailed { kind: StageFailure::Extract, .. } => "extract-failed",
            Error::StageFailed { kind: StageFailure::Install, .. } => "install-failed",
            Error::NoArtifact { .. } => "no-download-url",
            Error::ApplyFailed(_) => "apply-failed",
            Error::Cancelled => "cancelled",
            Error::Busy => "busy",
            Error::Io(_) | Error::Json(_) | Error::Other(_) => "io-error",
        }
    }
}

/// Convenience Result type using our Error
pub type Result<T> = std::result::Result<T, Error>;
