//! Integration tests for on-disk log files
//!
//! Runs the pipeline against real files in a temporary directory and checks
//! the folder layout, the entry format and the sealed (read-only) state.

#![cfg(feature = "mock-source")]

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::fast_mock;
use common::*;
use port_logger::pipeline::PipelineEvent;
use port_logger::PipelineController;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn read_entries(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Path components below the base directory
fn relative_components(base: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(base)
        .unwrap()
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_run_writes_sealed_file_in_dated_folder() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new()
        .log_dir(dir.path())
        .log_file("sensor.txt")
        .build();
    let source = fast_mock("mock0").with_lines(["23.4", "-1.2", "OK"]);
    let (mut controller, _handle) =
        PipelineController::with_source(config, Box::new(source)).unwrap();

    controller.start().unwrap();
    let location = PathBuf::from(controller.log_location().unwrap());
    assert!(wait_until(test_timeout(), || {
        controller.stats().lines_written == 3
    }));
    let report = controller.stop();

    assert_eq!(report.sealed_log, Some(location.display().to_string()));
    assert!(location.exists());
    assert!(std::fs::metadata(&location).unwrap().permissions().readonly());

    // <yyyy>/<MM_Mon>/<MM_dd>/<HH_mm_ss>/sensor.txt
    let parts = relative_components(dir.path(), &location);
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0].len(), 4);
    assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
    assert_eq!(parts[1].len(), 6);
    assert_eq!(&parts[2][..2], &parts[1][..2]);
    assert!(parts[3].starts_with(|c: char| c.is_ascii_digit()));
    assert_eq!(parts[4], "sensor.txt");

    let (timestamps, texts) = split_entries(&read_entries(&location));
    assert_eq!(texts, vec!["23.4", "-1.2", "OK"]);
    assert_monotonic(&timestamps);
}

#[test]
fn test_rotation_creates_new_file_and_seals_old_one() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new().log_dir(dir.path()).build();
    let source = fast_mock("mock0").with_lines(["before"]);
    let probe = source.probe();
    let (mut controller, handle) =
        PipelineController::with_source(config, Box::new(source)).unwrap();

    controller.start().unwrap();
    assert!(wait_until(test_timeout(), || {
        controller.stats().lines_written == 1
    }));

    let first = PathBuf::from(controller.rotate().unwrap());
    let second = PathBuf::from(controller.log_location().unwrap());
    assert_ne!(first, second);
    assert!(std::fs::metadata(&first).unwrap().permissions().readonly());
    assert!(handle
        .drain()
        .iter()
        .any(|e| matches!(e, PipelineEvent::Rotated { .. })));

    probe.push_lines(["after"]);
    assert!(wait_until(test_timeout(), || {
        controller.stats().lines_written == 2
    }));
    controller.stop();

    assert_eq!(split_entries(&read_entries(&first)).1, vec!["before"]);
    assert_eq!(split_entries(&read_entries(&second)).1, vec!["after"]);
    assert!(std::fs::metadata(&second).unwrap().permissions().readonly());

    // Same second gives a suffixed run folder, otherwise a new time folder
    let first_run = first.parent().unwrap();
    let second_run = second.parent().unwrap();
    assert_ne!(first_run, second_run);
    if first_run.parent() == second_run.parent() {
        let first_name = first_run.file_name().unwrap().to_string_lossy().into_owned();
        let second_name = second_run.file_name().unwrap().to_string_lossy().into_owned();
        assert!(second_name == format!("{first_name}_2") || second_name > first_name);
    }
}

#[test]
fn test_unwritable_log_directory_fails_start() {
    let dir = TempDir::new().unwrap();
    // A regular file where the base directory should be
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    let config = ConfigBuilder::new().log_dir(&blocker).build();
    let source = fast_mock("mock0");
    let probe = source.probe();
    let (mut controller, _handle) =
        PipelineController::with_source(config, Box::new(source)).unwrap();

    let err = controller.start().unwrap_err();
    assert!(matches!(err, port_logger::PortLogError::WriteFailure { .. }));
    // The source opened for the attempt is closed again
    assert!(!probe.is_open());
}
