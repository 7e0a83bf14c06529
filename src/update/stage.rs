//! Turning a downloaded artifact into something the apply process can use.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use uuid::Uuid;
use zip::ZipArchive;

use super::layout::staged_package;
use super::records::StagedUpdateRecord;
use crate::error::{Error, Result, StageFailure};
use crate::helpers::fs::{remove_dir_if_exists, remove_file_if_exists};
use crate::state::ConfigManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Zip,
    TarGz,
    /// NSIS-style `.exe` installer.
    Exe,
    Msi,
}

impl ArtifactKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".exe") {
            Some(Self::Exe)
        } else if name.ends_with(".msi") {
            Some(Self::Msi)
        } else {
            None
        }
    }

    pub fn is_installer(self) -> bool {
        matches!(self, Self::Exe | Self::Msi)
    }
}

/// Directory holding extracted artifacts.
pub fn staging_root(config: &ConfigManager) -> PathBuf {
    config.updates_dir().join("staging")
}

/// Forget any previously staged update and delete its extraction.
pub fn discard_staged(config: &ConfigManager) -> Result<()> {
    if let Some(previous) = config.load_staged_update_or_discard() {
        log::info!("Discarding previously staged update {}", previous.version);
        remove_dir_if_exists(&previous.extract_path)?;
    }
    config.clear_staged_update()?;
    remove_dir_if_exists(&staging_root(config))?;
    Ok(())
}

/// [`discard_staged`] on the blocking pool.
pub async fn discard_staged_in_background(config: &ConfigManager) -> Result<()> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || discard_staged(&config))
        .await
        .map_err(anyhow::Error::from)?
}

/// Extract `artifact` into a fresh staging directory and record it.
///
/// At most one staged update exists afterwards: any earlier record and its
/// extraction are removed first. The artifact is deleted whether or not
/// staging succeeds; on failure the partial extraction is removed too.
pub async fn stage_archive(
    config: &ConfigManager,
    artifact: &Path,
    kind: ArtifactKind,
    version: &str,
) -> Result<StagedUpdateRecord> {
    let config = config.clone();
    let artifact = artifact.to_path_buf();
    let version = version.to_string();
    tokio::task::spawn_blocking(move || stage_archive_blocking(&config, &artifact, kind, &version))
        .await
        .map_err(|e| Error::stage(StageFailure::Extract, e.to_string()))?
}

fn stage_archive_blocking(
    config: &ConfigManager,
    artifact: &Path,
    kind: ArtifactKind,
    version: &str,
) -> Result<StagedUpdateRecord> {
    let result = extract_and_record(config, artifact, kind, version);
    if let Err(e) = remove_file_if_exists(artifact) {
        log::warn!("Failed to remove downloaded artifact {}: {e}", artifact.display());
    }
    result
}

fn extract_and_record(
    config: &ConfigManager,
    artifact: &Path,
    kind: ArtifactKind,
    version: &str,
) -> Result<StagedUpdateRecord> {
    discard_staged(config)?;

    let extract_path = staging_root(config).join(format!("{version}-{}", Uuid::new_v4().simple()));
    fs::create_dir_all(&extract_path)?;

    let result = extract_archive(artifact, kind, &extract_path).and_then(|()| {
        if staged_package(&extract_path).is_file() {
            Ok(())
        } else {
            Err(Error::stage(
                StageFailure::InvalidArtifact,
                format!("Update {version} does not contain {}", staged_package(Path::new("")).display()),
            ))
        }
    });

    if let Err(e) = result {
        if let Err(cleanup) = remove_dir_if_exists(&extract_path) {
            log::warn!("Failed to remove partial extraction {}: {cleanup}", extract_path.display());
        }
        return Err(e);
    }

    let record = StagedUpdateRecord { version: version.to_string(), extract_path };
    config.save_staged_update(&record)?;
    log::info!("Staged update {version} at {}", record.extract_path.display());
    Ok(record)
}

/// Run a downloaded installer silently and wait for it.
pub async fn run_installer(artifact: &Path, kind: ArtifactKind) -> Result<()> {
    let mut command = match kind {
        ArtifactKind::Exe => {
            let mut cmd = tokio::process::Command::new(artifact);
            cmd.arg("/S");
            cmd
        }
        ArtifactKind::Msi => {
            let mut cmd = tokio::process::Command::new("msiexec");
            cmd.arg("/i").arg(artifact).args(["/qn", "/norestart"]);
            cmd
        }
        ArtifactKind::Zip | ArtifactKind::TarGz => {
            return Err(Error::stage(StageFailure::InvalidArtifact, "Archive is not an installer"));
        }
    };

    log::info!("Running installer {}", artifact.display());
    let status = command
        .status()
        .await
        .map_err(|e| Error::stage(StageFailure::Install, format!("Cannot start installer: {e}")))?;

    if !status.success() {
        return Err(Error::stage(StageFailure::Install, format!("Installer exited with {status}")));
    }
    Ok(())
}

/// Unpack an archive into `dest` (blocking).
pub fn extract_archive(archive: &Path, kind: ArtifactKind, dest: &Path) -> Result<()> {
    let result = match kind {
        ArtifactKind::Zip => extract_zip(archive, dest),
        ArtifactKind::TarGz => extract_tar_gz(archive, dest),
        ArtifactKind::Exe | ArtifactKind::Msi => {
            return Err(Error::stage(StageFailure::InvalidArtifact, "Installer is not an archive"));
        }
    };
    result.map_err(|e| match e {
        Error::StageFailed { .. } => e,
        other => Error::stage(StageFailure::Extract, other.to_string()),
    })
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(file).map_err(|e| Error::stage(StageFailure::Extract, e.to_string()))?;
    for index in 0..zip.len() {
        let mut entry =
            zip.by_index(index).map_err(|e| Error::stage(StageFailure::Extract, e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::stage(
                StageFailure::InvalidArtifact,
                format!("Unsafe archive entry: {}", entry.name()),
            ));
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = destination.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&target)?;
        std::io::copy(&mut entry, &mut outfile)?;
        apply_unix_mode(&target, entry.unix_mode())?;
    }
    Ok(())
}

#[cfg(unix)]
fn apply_unix_mode(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_unix_mode(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for item in archive.entries()? {
        let mut entry = item?;
        let raw_path = entry.path()?.into_owned();
        let Some(relative) = normalize_member_path(&raw_path) else {
            return Err(Error::stage(
                StageFailure::InvalidArtifact,
                format!("Unsafe archive entry: {}", raw_path.display()),
            ));
        };
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(Error::stage(StageFailure::InvalidArtifact, "Archive links are not supported"));
        }
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = destination.join(relative);
        if entry_type.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

/// Relative path with `.` removed; `None` for absolute paths or `..`.
fn normalize_member_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
