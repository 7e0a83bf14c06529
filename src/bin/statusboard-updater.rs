//! statusboard-updater - applies a staged update after the application exits

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use statusboard::state::ConfigManager;
use statusboard::update::{Applier, ApplyOptions, DetachedLauncher, InstallLayout, Launcher};

#[derive(Parser)]
#[command(name = "statusboard-updater")]
#[command(version, about = "Apply a staged StatusBoard update and relaunch the application")]
struct Args {
    /// Application data directory holding staged-update.json
    #[arg(long, value_name = "DIR", env = "STATUSBOARD_APP_DIR")]
    app_dir: Option<PathBuf>,

    /// Installed resources directory (defaults to the one next to this executable)
    #[arg(long, value_name = "DIR")]
    resources_dir: Option<PathBuf>,

    /// Installed locales directory
    #[arg(long, value_name = "DIR")]
    locales_dir: Option<PathBuf>,

    /// Application executable to relaunch
    #[arg(long, value_name = "PATH")]
    executable: Option<PathBuf>,

    /// Wait this long for the application to exit
    #[arg(long, value_name = "MS", default_value_t = 1500)]
    delay_ms: u64,

    /// Apply only; do not start the application afterwards
    #[arg(long)]
    no_relaunch: bool,
}

/// Log to `<app_dir>/updater.log`, falling back to stderr.
fn init_logging(app_dir: &Path) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    let log_path = app_dir.join("updater.log");
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => eprintln!("Cannot open {}: {e}", log_path.display()),
    }
    builder.init();
}

fn resolve_layout(args: &Args) -> InstallLayout {
    let mut layout = match InstallLayout::detect() {
        Ok(layout) => layout,
        Err(e) => {
            log::warn!("Cannot detect installation layout: {e}");
            InstallLayout::from_install_dir(".")
        }
    };
    if let Some(dir) = &args.resources_dir {
        layout.resources_dir = dir.clone();
    }
    if let Some(dir) = &args.locales_dir {
        layout.locales_dir = dir.clone();
    }
    if let Some(exe) = &args.executable {
        layout.executable = exe.clone();
    }
    layout
}

fn main() {
    let args = Args::parse();

    let config = match &args.app_dir {
        Some(dir) => ConfigManager::with_dir(dir),
        None => ConfigManager::new(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            env_logger::init();
            log::error!("Cannot open application directory: {e:#}");
            if !args.no_relaunch {
                let layout = resolve_layout(&args);
                if let Err(e) = DetachedLauncher.launch_detached(&layout.executable, &[]) {
                    log::error!("Failed to relaunch {}: {e}", layout.executable.display());
                }
            }
            return;
        }
    };
    init_logging(config.config_dir());
    log::info!("statusboard-updater {} starting", env!("CARGO_PKG_VERSION"));

    let layout = resolve_layout(&args);
    log::info!(
        "Resources: {}, locales: {}, executable: {}",
        layout.resources_dir.display(),
        layout.locales_dir.display(),
        layout.executable.display()
    );

    let options = ApplyOptions { delay: Duration::from_millis(args.delay_ms), relaunch: !args.no_relaunch };
    let report = Applier::new(&config, &layout, &DetachedLauncher).run(&options);
    log::info!("statusboard-updater done: {report:?}");
}
