//! Common test utilities for update integration tests.
//!
//! Every test gets its own temporary install: an application data directory,
//! an installation directory with `resources/` and `locales/`, and an
//! `AppContext` wired to both. Downloads are served by a throwaway HTTP server
//! bound to 127.0.0.1 on an ephemeral port.

#![allow(dead_code)]

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;

use statusboard::state::{AppContext, AppEvent, ConfigManager, EventReceiver};
use statusboard::update::{InstallLayout, Launcher, ReleaseInfo, ReleaseSource, UpdateConfig};
use statusboard::{Error, Result};

// =============================================================================
// Temporary installation
// =============================================================================

pub struct TestInstall {
    pub temp: TempDir,
    pub ctx: Arc<AppContext>,
}

impl TestInstall {
    /// Fresh install reporting `current_version`, with an installed `app.asar`.
    pub fn new(current_version: &str) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let config = ConfigManager::with_dir(temp.path().join("appdata")).expect("config manager");
        let layout = InstallLayout::from_install_dir(temp.path().join("install"));
        fs::create_dir_all(&layout.resources_dir).expect("resources dir");
        fs::create_dir_all(&layout.locales_dir).expect("locales dir");
        fs::write(layout.installed_package(), b"old package").expect("installed package");

        let update = UpdateConfig {
            progress_interval: Duration::from_millis(0),
            apply_delay: Duration::from_millis(0),
            ..UpdateConfig::default()
        }
        .with_current_version(current_version)
        .with_endpoint("http://127.0.0.1:9/unused");

        let ctx = AppContext::new(config, update, layout).expect("app context");
        Self { temp, ctx: Arc::new(ctx) }
    }

    pub fn config(&self) -> &ConfigManager {
        &self.ctx.config
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.ctx.layout
    }

    /// Build an extraction directory as staging would leave it.
    pub fn extraction(&self, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let root = self.temp.path().join("extract").join(name);
        for (relative, data) in files {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
            fs::write(&path, data).expect("write extracted file");
        }
        fs::create_dir_all(&root).expect("extract root");
        root
    }
}

// =============================================================================
// Release source
// =============================================================================

/// Release source returning whatever the test last configured.
#[derive(Clone)]
pub struct StaticReleaseSource {
    release: Arc<Mutex<std::result::Result<ReleaseInfo, String>>>,
}

impl StaticReleaseSource {
    pub fn new(release: ReleaseInfo) -> Self {
        Self { release: Arc::new(Mutex::new(Ok(release))) }
    }

    pub fn version(version: &str) -> Self {
        Self::new(ReleaseInfo { version: version.to_string(), ..Default::default() })
    }

    pub fn set(&self, release: ReleaseInfo) {
        *self.release.lock().expect("release lock") = Ok(release);
    }

    pub fn fail(&self, message: &str) {
        *self.release.lock().expect("release lock") = Err(message.to_string());
    }
}

impl ReleaseSource for StaticReleaseSource {
    async fn latest_release(&self) -> Result<ReleaseInfo> {
        let release = self.release.lock().expect("release lock").clone();
        release.map_err(Error::CheckFailed)
    }
}

pub fn release(version: &str, download_url: Option<String>) -> ReleaseInfo {
    ReleaseInfo { version: version.to_string(), download_url, ..Default::default() }
}

// =============================================================================
// Launcher
// =============================================================================

/// Records launches instead of spawning processes.
#[derive(Default)]
pub struct RecordingLauncher {
    calls: Mutex<Vec<(PathBuf, Vec<OsString>)>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn calls(&self) -> Vec<(PathBuf, Vec<OsString>)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn launched(&self) -> Vec<PathBuf> {
        self.calls().into_iter().map(|(program, _)| program).collect()
    }
}

impl Launcher for RecordingLauncher {
    fn launch_detached(&self, program: &Path, args: &[OsString]) -> std::io::Result<()> {
        self.calls.lock().expect("calls lock").push((program.to_path_buf(), args.to_vec()));
        if self.fail {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "launch refused"));
        }
        Ok(())
    }
}

// =============================================================================
// Artifacts
// =============================================================================

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).expect("start zip entry");
        zip.write_all(data).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    File::create(path).expect("create zip").write_all(&zip_bytes(entries)).expect("write zip");
}

/// Files whose names end in `.part` anywhere under `dir`.
pub fn partial_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "part"))
        .collect()
}

// =============================================================================
// HTTP server
// =============================================================================

#[derive(Clone)]
pub enum Reply {
    Body(Vec<u8>),
    /// Announce `declared` bytes, send `body`, close.
    Truncated { body: Vec<u8>, declared: usize },
    Status(u16),
    /// Announce `declared` bytes, send `prefix`, then hold the connection open.
    Stall { prefix: Vec<u8>, declared: usize },
}

/// Serve `reply` for every request; returns the URL for `path`.
pub async fn serve(path: &str, reply: Reply) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = reply.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let (status, body, declared, stall) = match reply {
                    Reply::Body(body) => {
                        let len = body.len();
                        (200, body, len, false)
                    }
                    Reply::Truncated { body, declared } => (200, body, declared, false),
                    Reply::Status(code) => (code, Vec::new(), 0, false),
                    Reply::Stall { prefix, declared } => (200, prefix, declared, true),
                };
                let head = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {declared}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n"
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.write_all(&body).await;
                let _ = socket.flush().await;
                if stall {
                    std::future::pending::<()>().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}{path}")
}

// =============================================================================
// Events
// =============================================================================

/// Drain events already sent.
pub fn drain(receiver: &mut EventReceiver) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = receiver.try_next() {
        events.push(event);
    }
    events
}
