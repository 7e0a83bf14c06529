use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Starts processes that must outlive the current one.
pub trait Launcher: Send + Sync {
    fn launch_detached(&self, program: &Path, args: &[OsString]) -> io::Result<()>;
}

/// Spawns a detached child with null stdio in its own process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch_detached(&self, program: &Path, args: &[OsString]) -> io::Result<()> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = program.parent() {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            // DETACHED_PROCESS | CREATE_BREAKAWAY_FROM_JOB | CREATE_NEW_PROCESS_GROUP
            command.creation_flags(0x00000008 | 0x01000000 | 0x00000200);
        }

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        log::info!("Launched {} (pid {})", program.display(), child.id());
        Ok(())
    }
}
