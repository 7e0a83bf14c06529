//! Filesystem helpers shared by staging and the apply process.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Copy `src` (file or directory) to `dst`.
///
/// Directories are merged: files present in both are overwritten, files only in
/// `dst` are left alone. Returns the number of files written.
pub fn copy_merge(src: &Path, dst: &Path) -> io::Result<u64> {
    if fs::metadata(src)?.is_dir() {
        fs::create_dir_all(dst)?;
        let mut copied = 0;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copied += copy_merge(&entry.path(), &dst.join(entry.file_name()))?;
        }
        Ok(copied)
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::metadata(dst).is_ok_and(|m| m.is_dir()) {
            fs::remove_dir_all(dst)?;
        }
        fs::copy(src, dst)?;
        Ok(1)
    }
}

/// Copy `src` over `dst` through a sibling `.partial` file, so `dst` is either
/// absent, the old content, or the complete new content.
pub fn replace_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut partial = dst.as_os_str().to_owned();
    partial.push(".partial");
    let partial = Path::new(&partial);

    fs::copy(src, partial)?;
    if let Err(e) = fs::rename(partial, dst) {
        let _ = fs::remove_file(partial);
        return Err(e);
    }
    Ok(())
}

/// Returns whether anything was removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
