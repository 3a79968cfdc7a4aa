//! Tests for the file-backed fallback store

use std::fs;

use camtrap_core::{FileScheduleStore, ScheduleError, ScheduleState};
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> FileScheduleStore {
    FileScheduleStore::new(dir.path().join("rtc.txt"), dir.path().join("time_interval.txt"))
}

#[test]
fn test_round_trip_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let state = ScheduleState::parse("24/01/15,09:00:00", "6").unwrap();

    store.save(&state).unwrap();

    assert_eq!(fs::read_to_string(store.rtc_path()).unwrap(), "24/01/15,09:00:00");
    assert_eq!(fs::read_to_string(store.interval_path()).unwrap(), "6");

    let loaded = store.load().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.last_wake.as_str(), state.last_wake.as_str());
    assert_eq!(loaded.interval.to_string(), state.interval.to_string());
}

#[test]
fn test_save_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.save(&ScheduleState::parse("24/01/15,09:00:00", "6").unwrap()).unwrap();
    store.save(&ScheduleState::parse("24/01/15,15:00:00", "1").unwrap()).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.last_wake.as_str(), "24/01/15,15:00:00");
    assert_eq!(loaded.interval.hours(), 1);
}

#[test]
fn test_load_tolerates_trailing_newline() {
    // Files edited by hand on the device usually end in a newline
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::write(store.rtc_path(), "24/01/15,09:00:00\n").unwrap();
    fs::write(store.interval_path(), "2\n").unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.last_wake.as_str(), "24/01/15,09:00:00");
    assert_eq!(loaded.interval.hours(), 2);
}

#[test]
fn test_missing_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::write(store.rtc_path(), "24/01/15,09:00:00").unwrap();

    match store.load() {
        Err(ScheduleError::PersistenceMissing { path, .. }) => {
            assert_eq!(path, store.interval_path());
        }
        other => panic!("Expected PersistenceMissing, got {other:?}"),
    }
}

#[test]
fn test_garbage_is_treated_as_missing() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::write(store.rtc_path(), "not a time").unwrap();
    fs::write(store.interval_path(), "2").unwrap();

    match store.load() {
        Err(ScheduleError::PersistenceMissing { path, .. }) => {
            assert_eq!(path, store.rtc_path());
        }
        other => panic!("Expected PersistenceMissing, got {other:?}"),
    }
}

#[test]
fn test_unwritable_location() {
    let dir = TempDir::new().unwrap();
    let store = FileScheduleStore::new(
        dir.path().join("missing-dir").join("rtc.txt"),
        dir.path().join("time_interval.txt"),
    );
    let state = ScheduleState::parse("24/01/15,09:00:00", "6").unwrap();

    assert!(matches!(
        store.save(&state),
        Err(ScheduleError::PersistenceWrite { .. })
    ));
}
