//! statusboard - status board desktop app, update lifecycle front end

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt as _;

use statusboard::state::events::channel;
use statusboard::state::{AppContext, AppEvent, ConfigManager, UpdatePhase};
use statusboard::update::{
    CheckTrigger, HttpReleaseSource, InstallLayout, UpdateConfig, UpdateController, UpdateStatus,
};
use statusboard::{Error, helpers};

#[derive(Parser)]
#[command(name = "statusboard")]
#[command(version, about = "Status board: check for, stage and apply application updates")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Application data directory (settings and update markers)
    #[arg(long, global = true, value_name = "DIR", env = "STATUSBOARD_APP_DIR")]
    app_dir: Option<PathBuf>,

    /// Installation directory (defaults to the running executable's)
    #[arg(long, global = true, value_name = "DIR")]
    install_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Report the last update and check for a new one if due (default)
    Run,
    /// Check for updates now
    Check,
    /// Download and stage the latest release
    Update {
        /// Hand off to the updater and exit once staged
        #[arg(long)]
        restart: bool,
    },
    /// Never offer this version again
    Dismiss { version: String },
    /// Hide this version from update checks for one check interval
    Postpone { version: String },
    /// Apply a staged update now
    Restart,
    /// Keep a staged update for the next restart
    Later,
    /// Show update state
    Status,
    /// Forget the recorded result of an update to this version
    Completed { version: String },
}

fn build_context(cli: &Cli) -> Result<AppContext> {
    let config = match &cli.app_dir {
        Some(dir) => ConfigManager::with_dir(dir)?,
        None => ConfigManager::new()?,
    };
    let layout = match &cli.install_dir {
        Some(dir) => InstallLayout::from_install_dir(dir),
        None => InstallLayout::detect()?,
    };
    AppContext::new(config, UpdateConfig::from_env(), layout)
}

fn describe(event: &AppEvent) -> String {
    match event {
        AppEvent::UpdateCheckStarted => "Checking for updates...".to_string(),
        AppEvent::UpToDate { version } => format!("StatusBoard {version} is up to date"),
        AppEvent::UpdateAvailable(result) => {
            let mut text = format!("Version {} is available (you have {})", result.latest_version, result.current_version);
            if let Some(date) = &result.release_date {
                text.push_str(&format!(", released {date}"));
            }
            if let Some(notes) = result.release_notes.as_deref().filter(|n| !n.trim().is_empty()) {
                text.push_str(&format!("\n\n{}", notes.trim()));
            }
            text
        }
        AppEvent::UpdateCheckFailed { code, message } => format!("Update check failed [{code}]: {message}"),
        AppEvent::DownloadProgress(progress) | AppEvent::InstallProgress(progress) => match progress.phase {
            UpdatePhase::Error => format!(
                "Error [{}]: {}",
                progress.code.as_deref().unwrap_or("unknown"),
                progress.message
            ),
            _ => format!("[{:>3}%] {}", progress.percent, progress.message),
        },
        AppEvent::OpenReleasePage { version, url } => {
            format!("Version {version} has no automatic download. Get it from {url}")
        }
        AppEvent::RestartDeferred { version } => format!("Version {version} will be applied on the next restart"),
        AppEvent::UpdateApplied { version, whats_new } => {
            let mut text = format!("Updated to {version}");
            for entry in whats_new {
                text.push_str(&format!("\n{}:", entry.category));
                for item in &entry.items {
                    text.push_str(&format!("\n  - {item}"));
                }
            }
            text
        }
        AppEvent::UpdateFailed { version } => {
            format!("The update to {version} could not be applied. You can retry or download it manually.")
        }
    }
}

fn print_status(controller: &UpdateController<HttpReleaseSource>) -> Result<()> {
    let ctx = controller.context();
    println!("Version:        {}", ctx.update.current_version);
    println!("Data directory: {}", ctx.config.config_dir().display());
    println!("Resources:      {}", ctx.layout.resources_dir.display());
    match ctx.settings.last_update_check().and_then(chrono::DateTime::from_timestamp_millis) {
        Some(at) => println!("Last check:     {}", at.to_rfc3339()),
        None => println!("Last check:     never"),
    }
    println!("Check due:      {}", controller.is_check_due());
    match controller.staged_update()? {
        Some(record) => {
            let size = dir_size(&record.extract_path);
            println!(
                "Staged:         {} at {} ({})",
                record.version,
                record.extract_path.display(),
                helpers::format_bytes(size)
            );
        }
        None => println!("Staged:         none"),
    }
    if let Some(state) = ctx.config.load_update_state()? {
        println!("Last apply:     {} (success: {})", state.version, state.success);
    }
    let dismissed = ctx.settings.dismissed_versions();
    if !dismissed.is_empty() {
        println!("Dismissed:      {}", dismissed.join(", "));
    }
    Ok(())
}

fn dir_size(path: &std::path::Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let ctx = Arc::new(build_context(&cli).context("Failed to initialise application context")?);
    let source = HttpReleaseSource::new(&ctx.update)?;
    let (events, mut receiver) = channel();
    let controller = UpdateController::new(ctx, source, events)?;

    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.next().await {
            println!("{}", describe(&event));
        }
    });

    let outcome = run(&cli, &controller).await;
    drop(controller);
    let _ = printer.await;
    outcome
}

async fn run(cli: &Cli, controller: &UpdateController<HttpReleaseSource>) -> Result<()> {
    match cli.command.as_ref().unwrap_or(&Command::Run) {
        Command::Run => {
            if let Err(e) = controller.check_update_state() {
                log::warn!("Ignoring unreadable update state: {e}");
            }
            match controller.check_if_due().await {
                Ok(_) | Err(Error::CheckFailed(_)) => {}
                Err(e) => return Err(e.into()),
            }
            if let UpdateStatus::RestartRequired { version } = controller.status() {
                println!("Version {version} is staged. Run `statusboard restart` to apply it.");
            }
        }
        Command::Check => {
            controller.check_for_updates(CheckTrigger::Manual).await?;
        }
        Command::Update { restart } => {
            if !matches!(controller.status(), UpdateStatus::RestartRequired { .. }) {
                let result = controller.check_for_updates(CheckTrigger::Manual).await?;
                if !result.has_update() {
                    return Ok(());
                }
                let cancel = controller.clone();
                let ctrl_c = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel_update();
                    }
                });
                let staged = controller
                    .download_and_install_update(result.download_url.as_deref(), &result.latest_version)
                    .await;
                ctrl_c.abort();
                match staged {
                    Ok(()) => {}
                    Err(Error::NoArtifact { .. } | Error::Cancelled) => return Ok(()),
                    Err(e) => return Err(e.into()),
                }
            }
            if *restart {
                controller.restart_app()?;
            } else {
                controller.restart_later();
            }
        }
        Command::Dismiss { version } => controller.dismiss_update(version)?,
        Command::Postpone { version } => controller.postpone_update(version)?,
        Command::Restart => {
            if !controller.has_staged_update() {
                log::info!("No staged update; restarting anyway");
            }
            controller.restart_now()?;
        }
        Command::Later => controller.restart_later(),
        Command::Status => print_status(controller)?,
        Command::Completed { version } => controller.mark_update_completed(version)?,
    }
    Ok(())
}
