//! The out-of-process half of an update: swap staged files into the installation.
//!
//! Runs after the main application has exited, so nothing holds the installed
//! package open. Every step is safe to repeat if a previous run died midway.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::launcher::Launcher;
use super::layout::{InstallLayout, LOCALES_DIR, RESOURCES_DIR, STAGED_PACKAGE, staged_package};
use super::records::{StagedUpdateRecord, UpdateStateRecord};
use crate::error::{Error, Result};
use crate::helpers::fs::{copy_merge, remove_dir_if_exists, remove_file_if_exists, replace_file};
use crate::state::ConfigManager;

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Grace period for the parent process to release its file handles.
    pub delay: Duration,
    /// Start the main application once done.
    pub relaunch: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { delay: Duration::from_millis(1500), relaunch: true }
    }
}

/// What a run of the apply process did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyReport {
    NothingStaged,
    /// The record pointed at an extraction that no longer exists; it was deleted.
    StaleRecord { version: String },
    /// Files were copied. `success` is false when the application package was
    /// missing or could not be swapped.
    Applied { version: String, success: bool },
    /// An unexpected error stopped the run; the installation was left as it was.
    Aborted { error: String },
}

pub struct Applier<'a> {
    config: &'a ConfigManager,
    layout: &'a InstallLayout,
    launcher: &'a dyn Launcher,
}

impl<'a> Applier<'a> {
    pub fn new(config: &'a ConfigManager, layout: &'a InstallLayout, launcher: &'a dyn Launcher) -> Self {
        Self { config, layout, launcher }
    }

    /// Apply whatever is staged, then relaunch the application no matter what happened.
    pub fn run(&self, options: &ApplyOptions) -> ApplyReport {
        if !options.delay.is_zero() {
            log::info!("Waiting {:?} for the application to exit", options.delay);
            std::thread::sleep(options.delay);
        }

        let report = match self.apply_staged() {
            Ok(report) => report,
            Err(e) => {
                log::error!("Update apply aborted: {e}");
                ApplyReport::Aborted { error: e.to_string() }
            }
        };
        log::info!("Apply finished: {report:?}");

        if options.relaunch {
            self.relaunch();
        }
        report
    }

    fn apply_staged(&self) -> Result<ApplyReport> {
        let Some(record) = self.config.load_staged_update_or_discard() else {
            log::info!("No staged update");
            return Ok(ApplyReport::NothingStaged);
        };
        log::info!("Applying staged update {} from {}", record.version, record.extract_path.display());

        if !record.extract_path.is_dir() {
            log::warn!("Staged files at {} are gone, dropping record", record.extract_path.display());
            self.config.clear_staged_update()?;
            return Ok(ApplyReport::StaleRecord { version: record.version });
        }

        match self.apply_record(&record) {
            Ok(success) => Ok(ApplyReport::Applied { version: record.version, success }),
            Err(e) => {
                let failed = UpdateStateRecord { applied: false, ..UpdateStateRecord::now(&record.version, false) };
                if let Err(save) = self.config.save_update_state(&failed) {
                    log::error!("Failed to record apply failure: {save}");
                }
                Err(e)
            }
        }
    }

    /// Steps after validation. Returns whether the application package was replaced.
    fn apply_record(&self, record: &StagedUpdateRecord) -> Result<bool> {
        let extract = record.extract_path.as_path();

        let package_swapped = self.swap_package(extract);

        let copied = self.copy_resources(extract)?;
        log::info!("Copied {copied} resource file(s)");

        let extracted_locales = extract.join(LOCALES_DIR);
        if extracted_locales.is_dir() {
            let copied = copy_merge(&extracted_locales, &self.layout.locales_dir)?;
            log::info!("Copied {copied} locale file(s)");
        }

        remove_dir_if_exists(extract)?;
        self.config.clear_staged_update()?;
        log::info!("Removed staged files");

        self.config.save_update_state(&UpdateStateRecord::now(&record.version, package_swapped))?;
        Ok(package_swapped)
    }

    /// Rename the installed package aside, copy the new one in, drop the backup.
    ///
    /// A backup left by an interrupted run is handled: if the installed package
    /// is missing the backup is the original and is kept until the copy succeeds.
    fn swap_package(&self, extract: &Path) -> bool {
        let source = staged_package(extract);
        if !source.is_file() {
            log::error!("Update does not contain {}; application package not replaced", source.display());
            return false;
        }

        let target = self.layout.installed_package();
        let backup = self.layout.backup_package();

        if let Err(e) = fs::create_dir_all(&self.layout.resources_dir) {
            log::error!("Cannot create {}: {e}", self.layout.resources_dir.display());
            return false;
        }

        if target.exists() {
            if let Err(e) = remove_file_if_exists(&backup) {
                log::error!("Cannot remove old backup {}: {e}", backup.display());
                return false;
            }
            if let Err(e) = fs::rename(&target, &backup) {
                log::error!("Cannot move {} aside: {e}", target.display());
                return false;
            }
            log::info!("Moved current package to {}", backup.display());
        } else if backup.exists() {
            log::info!("Resuming package swap; original is at {}", backup.display());
        }

        if let Err(e) = replace_file(&source, &target) {
            log::error!("Cannot copy new package to {}: {e}", target.display());
            if backup.exists()
                && let Err(e) = fs::rename(&backup, &target)
            {
                log::error!("Cannot restore {}: {e}", backup.display());
            }
            return false;
        }
        log::info!("Installed new package at {}", target.display());

        if let Err(e) = remove_file_if_exists(&backup) {
            log::warn!("Cannot remove backup {}: {e}", backup.display());
        }
        true
    }

    /// Merge every entry of the extracted resource directory except the package.
    fn copy_resources(&self, extract: &Path) -> Result<u64> {
        let extracted = extract.join(RESOURCES_DIR);
        if !extracted.is_dir() {
            return Ok(0);
        }

        let mut copied = 0;
        for entry in fs::read_dir(&extracted)? {
            let entry = entry?;
            let name = entry.file_name();
            if name == STAGED_PACKAGE {
                continue;
            }
            copied += copy_merge(&entry.path(), &self.layout.resources_dir.join(&name)).map_err(|e| {
                Error::ApplyFailed(format!("Copying {}: {e}", name.to_string_lossy()))
            })?;
        }
        Ok(copied)
    }

    fn relaunch(&self) {
        let exe = &self.layout.executable;
        match self.launcher.launch_detached(exe, &[]) {
            Ok(()) => log::info!("Relaunched {}", exe.display()),
            Err(e) => log::error!("Failed to relaunch {}: {e}", exe.display()),
        }
    }
}

/// Command-line arguments handing this installation to `statusboard-updater`.
pub fn updater_args(config: &ConfigManager, layout: &InstallLayout, delay: Duration) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |flag: &str, value: OsString| {
        args.push(flag.into());
        args.push(value);
    };
    push("--app-dir", config.config_dir().into());
    push("--resources-dir", layout.resources_dir.clone().into());
    push("--locales-dir", layout.locales_dir.clone().into());
    push("--executable", layout.executable.clone().into());
    push("--delay-ms", delay.as_millis().to_string().into());
    args
}
