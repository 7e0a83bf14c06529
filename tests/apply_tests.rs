//! Integration tests for the out-of-process apply step.
//!
//! Each test stages files by hand, runs the applier against a temporary
//! installation and inspects what it left on disk.

mod common;

use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{RecordingLauncher, TestInstall};
use statusboard::update::{Applier, ApplyOptions, ApplyReport, StagedUpdateRecord, UpdateStateRecord};

fn options() -> ApplyOptions {
    ApplyOptions { delay: Duration::ZERO, relaunch: true }
}

fn stage(install: &TestInstall, version: &str, extract_path: std::path::PathBuf) {
    install
        .config()
        .save_staged_update(&StagedUpdateRecord { version: version.to_string(), extract_path })
        .expect("save staged record");
}

// =============================================================================
// Full apply
// =============================================================================

#[test]
fn test_apply_replaces_package_and_records_success() {
    let install = TestInstall::new("1.3.2");
    let extract = install.extraction(
        "1.4.0",
        &[
            ("resources/app.package", b"new package 1.4.0"),
            ("resources/icons/tray.png", b"png"),
            ("locales/de.json", b"{\"hello\":\"hallo\"}"),
        ],
    );
    stage(&install, "1.4.0", extract.clone());

    let launcher = RecordingLauncher::default();
    let report = Applier::new(install.config(), install.layout(), &launcher).run(&options());

    assert_eq!(report, ApplyReport::Applied { version: "1.4.0".into(), success: true });

    let layout = install.layout();
    assert_eq!(fs::read(layout.installed_package()).unwrap(), b"new package 1.4.0");
    assert!(!layout.backup_package().exists());
    assert!(!layout.resources_dir.join("app.package").exists());
    assert_eq!(fs::read(layout.resources_dir.join("icons/tray.png")).unwrap(), b"png");
    assert!(layout.locales_dir.join("de.json").is_file());

    assert!(!extract.exists());
    assert_eq!(install.config().load_staged_update().unwrap(), None);

    let state = install.config().load_update_state().unwrap().expect("state record");
    assert!(state.applied);
    assert!(state.success);
    assert_eq!(state.version, "1.4.0");
    assert!(state.timestamp > 0);

    assert_eq!(launcher.launched(), vec![layout.executable.clone()]);
}

#[test]
fn test_apply_state_file_shape() {
    let install = TestInstall::new("1.3.2");
    let extract = install.extraction("1.4.0", &[("resources/app.package", b"pkg")]);
    stage(&install, "1.4.0", extract);

    Applier::new(install.config(), install.layout(), &RecordingLauncher::default()).run(&options());

    let raw = fs::read_to_string(install.config().file_path("update-state.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["applied"], true);
    assert_eq!(json["success"], true);
    assert_eq!(json["version"], "1.4.0");
    assert!(json["timestamp"].is_i64());
}

// =============================================================================
// Merge semantics
// =============================================================================

#[test]
fn test_copy_keeps_files_only_in_old_install() {
    let install = TestInstall::new("1.3.2");
    let layout = install.layout();
    fs::create_dir_all(layout.resources_dir.join("sounds")).unwrap();
    fs::write(layout.resources_dir.join("sounds/old.wav"), b"old").unwrap();
    fs::write(layout.resources_dir.join("sounds/chime.wav"), b"chime v1").unwrap();
    fs::write(layout.locales_dir.join("fr.json"), b"{}").unwrap();

    let extract = install.extraction(
        "1.4.0",
        &[
            ("resources/app.package", b"pkg"),
            ("resources/sounds/chime.wav", b"chime v2"),
            ("locales/de.json", b"{}"),
        ],
    );
    stage(&install, "1.4.0", extract);

    Applier::new(install.config(), layout, &RecordingLauncher::default()).run(&options());

    assert_eq!(fs::read(layout.resources_dir.join("sounds/old.wav")).unwrap(), b"old");
    assert_eq!(fs::read(layout.resources_dir.join("sounds/chime.wav")).unwrap(), b"chime v2");
    assert!(layout.locales_dir.join("fr.json").is_file());
    assert!(layout.locales_dir.join("de.json").is_file());
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn test_nothing_staged_still_relaunches() {
    let install = TestInstall::new("1.3.2");
    let launcher = RecordingLauncher::default();

    let report = Applier::new(install.config(), install.layout(), &launcher).run(&options());

    assert_eq!(report, ApplyReport::NothingStaged);
    assert_eq!(install.config().load_update_state().unwrap(), None);
    assert_eq!(launcher.launched().len(), 1);
}

#[test]
fn test_stale_extract_path_drops_record() {
    let install = TestInstall::new("1.3.2");
    stage(&install, "1.4.0", install.temp.path().join("vanished"));
    let launcher = RecordingLauncher::default();

    let report = Applier::new(install.config(), install.layout(), &launcher).run(&options());

    assert_eq!(report, ApplyReport::StaleRecord { version: "1.4.0".into() });
    assert_eq!(install.config().load_staged_update().unwrap(), None);
    assert_eq!(install.config().load_update_state().unwrap(), None);
    assert_eq!(fs::read(install.layout().installed_package()).unwrap(), b"old package");
    assert_eq!(launcher.launched().len(), 1);
}

#[test]
fn test_unreadable_record_is_discarded_and_relaunches() {
    let install = TestInstall::new("1.3.2");
    let record_path = install.config().file_path("staged-update.json");
    fs::write(&record_path, r#"{"version":"1.4.0"}"#).unwrap();
    let launcher = RecordingLauncher::default();

    let report = Applier::new(install.config(), install.layout(), &launcher).run(&options());

    assert_eq!(report, ApplyReport::NothingStaged);
    assert!(!record_path.exists());
    assert_eq!(install.config().load_update_state().unwrap(), None);
    assert_eq!(fs::read(install.layout().installed_package()).unwrap(), b"old package");
    assert_eq!(launcher.launched().len(), 1);
}

#[test]
fn test_missing_package_reports_failure_and_relaunches() {
    let install = TestInstall::new("1.3.2");
    let extract = install.extraction("1.4.0", &[("resources/icons/tray.png", b"png")]);
    stage(&install, "1.4.0", extract.clone());
    let launcher = RecordingLauncher::default();

    let report = Applier::new(install.config(), install.layout(), &launcher).run(&options());

    assert_eq!(report, ApplyReport::Applied { version: "1.4.0".into(), success: false });
    let state = install.config().load_update_state().unwrap().expect("state record");
    assert!(state.applied);
    assert!(!state.success);
    assert_eq!(fs::read(install.layout().installed_package()).unwrap(), b"old package");
    assert!(install.layout().resources_dir.join("icons/tray.png").is_file());
    assert!(!extract.exists());
    assert_eq!(launcher.launched().len(), 1);
}

#[test]
fn test_relaunch_failure_does_not_change_report() {
    let install = TestInstall::new("1.3.2");
    let extract = install.extraction("1.4.0", &[("resources/app.package", b"pkg")]);
    stage(&install, "1.4.0", extract);
    let launcher = RecordingLauncher::failing();

    let report = Applier::new(install.config(), install.layout(), &launcher).run(&options());

    assert_eq!(report, ApplyReport::Applied { version: "1.4.0".into(), success: true });
    assert_eq!(launcher.launched().len(), 1);
}

#[test]
fn test_no_relaunch_option() {
    let install = TestInstall::new("1.3.2");
    let launcher = RecordingLauncher::default();

    Applier::new(install.config(), install.layout(), &launcher)
        .run(&ApplyOptions { delay: Duration::ZERO, relaunch: false });

    assert!(launcher.launched().is_empty());
}

// =============================================================================
// Interrupted runs
// =============================================================================

#[test]
fn test_rerun_after_crash_between_rename_and_copy() {
    let install = TestInstall::new("1.3.2");
    let layout = install.layout();
    // Previous run moved the package aside and died before copying.
    fs::rename(layout.installed_package(), layout.backup_package()).unwrap();

    let extract = install.extraction("1.4.0", &[("resources/app.package", b"new")]);
    stage(&install, "1.4.0", extract);

    let report = Applier::new(install.config(), layout, &RecordingLauncher::default()).run(&options());

    assert_eq!(report, ApplyReport::Applied { version: "1.4.0".into(), success: true });
    assert_eq!(fs::read(layout.installed_package()).unwrap(), b"new");
    assert!(!layout.backup_package().exists());
}

#[test]
fn test_rerun_after_crash_before_backup_removal() {
    let install = TestInstall::new("1.3.2");
    let layout = install.layout();
    // Previous run installed the new package but left the backup.
    fs::rename(layout.installed_package(), layout.backup_package()).unwrap();
    fs::write(layout.installed_package(), b"new").unwrap();

    let extract = install.extraction("1.4.0", &[("resources/app.package", b"new")]);
    stage(&install, "1.4.0", extract);

    let report = Applier::new(install.config(), layout, &RecordingLauncher::default()).run(&options());

    assert_eq!(report, ApplyReport::Applied { version: "1.4.0".into(), success: true });
    assert_eq!(fs::read(layout.installed_package()).unwrap(), b"new");
    assert!(!layout.backup_package().exists());
}

#[test]
fn test_fresh_install_without_existing_package() {
    let install = TestInstall::new("1.3.2");
    let layout = install.layout();
    fs::remove_dir_all(&layout.resources_dir).unwrap();

    let extract = install.extraction("1.4.0", &[("resources/app.package", b"pkg")]);
    stage(&install, "1.4.0", extract);

    let report = Applier::new(install.config(), layout, &RecordingLauncher::default()).run(&options());

    assert_eq!(report, ApplyReport::Applied { version: "1.4.0".into(), success: true });
    assert_eq!(fs::read(layout.installed_package()).unwrap(), b"pkg");
}

#[test]
fn test_state_record_is_consumed_once() {
    let install = TestInstall::new("1.3.2");
    install.config().save_update_state(&UpdateStateRecord::now("1.4.0", true)).unwrap();

    let first = install.config().take_update_state().unwrap();
    let second = install.config().take_update_state().unwrap();

    assert_eq!(first.map(|r| r.version), Some("1.4.0".to_string()));
    assert_eq!(second, None);
}
