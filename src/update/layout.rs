use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resource directory inside both the installation and an extracted artifact.
pub const RESOURCES_DIR: &str = "resources";
/// Locale resources, next to the resource directory.
pub const LOCALES_DIR: &str = "locales";
/// Application package as shipped inside an update artifact.
pub const STAGED_PACKAGE: &str = "app.package";
/// Application package as installed.
pub const INSTALLED_PACKAGE: &str = "app.asar";
pub const BACKUP_SUFFIX: &str = ".backup";

const APP_BIN: &str = "statusboard";
const UPDATER_BIN: &str = "statusboard-updater";

/// Where the installed application lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub resources_dir: PathBuf,
    pub locales_dir: PathBuf,
    /// Main application executable, relaunched after an apply.
    pub executable: PathBuf,
    /// External apply process executable.
    pub updater: PathBuf,
}

impl InstallLayout {
    /// Flat layout: executables, `resources/` and `locales/` share one directory.
    pub fn from_install_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            resources_dir: dir.join(RESOURCES_DIR),
            locales_dir: dir.join(LOCALES_DIR),
            executable: dir.join(format!("{APP_BIN}{}", std::env::consts::EXE_SUFFIX)),
            updater: dir.join(format!("{UPDATER_BIN}{}", std::env::consts::EXE_SUFFIX)),
        }
    }

    /// Derive the layout from the running executable.
    ///
    /// Inside a macOS bundle (`*.app/Contents/MacOS/<exe>`) resources live in
    /// `Contents/Resources`; everywhere else they sit next to the executable.
    pub fn detect() -> Result<Self> {
        let exe = std::env::current_exe().context("Cannot get current exe")?;
        let bin_dir = exe.parent().context("Executable has no parent directory")?;

        let mut layout = Self::from_install_dir(bin_dir);
        if bin_dir.file_name().is_some_and(|n| n == "MacOS")
            && let Some(contents) = bin_dir.parent()
            && contents.file_name().is_some_and(|n| n == "Contents")
        {
            let resources = contents.join("Resources");
            layout.locales_dir = resources.join(LOCALES_DIR);
            layout.resources_dir = resources;
        }
        Ok(layout)
    }

    pub fn installed_package(&self) -> PathBuf {
        self.resources_dir.join(INSTALLED_PACKAGE)
    }

    pub fn backup_package(&self) -> PathBuf {
        self.resources_dir.join(format!("{INSTALLED_PACKAGE}{BACKUP_SUFFIX}"))
    }
}

/// Path of the application package inside an extracted artifact.
pub fn staged_package(extract_root: &Path) -> PathBuf {
    extract_root.join(RESOURCES_DIR).join(STAGED_PACKAGE)
}
