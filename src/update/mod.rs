//! Self-update: checking for releases, staging them, and applying them out of process.

pub mod apply;
pub mod config;
pub mod controller;
pub mod download;
pub mod launcher;
pub mod layout;
pub mod records;
pub mod source;
pub mod stage;
pub mod suppression;
pub mod types;

pub use apply::{Applier, ApplyOptions, ApplyReport, updater_args};
pub use config::UpdateConfig;
pub use controller::UpdateController;
pub use download::Downloader;
pub use launcher::{DetachedLauncher, Launcher};
pub use layout::InstallLayout;
pub use records::{StagedUpdateRecord, UpdateStateRecord};
pub use source::{HttpReleaseSource, ReleaseSource};
pub use stage::ArtifactKind;
pub use suppression::Suppression;
pub use types::{CheckTrigger, ReleaseInfo, UpdateCheckResult, UpdateOutcome, UpdateStatus};
