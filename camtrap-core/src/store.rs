//! Persisted fallback schedule
//!
//! Two plain-text files, one value each: the last-wake timestamp and the
//! interval in hours. Read only when the time channel came back
//! incomplete; overwritten after every reconciliation.
//!
//! Writes are not transactional. A crash between the two writes can
//! leave a mismatched pair, which the next successful cycle repairs.
//!
//! ```rust,no_run
//! use camtrap_core::FileScheduleStore;
//!
//! let store = FileScheduleStore::new("/home/pi/rtc.txt", "/home/pi/time_interval.txt");
//! let schedule = store.load()?;
//! store.save(&schedule)?;
//! # Ok::<(), camtrap_core::ScheduleError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{ScheduleError, ScheduleResult};
use crate::schedule::{Interval, ScheduleState};
use crate::timestamp::Timestamp;

/// File-backed (timestamp, interval) pair
#[derive(Debug, Clone)]
pub struct FileScheduleStore {
    rtc_path: PathBuf,
    interval_path: PathBuf,
}

impl FileScheduleStore {
    /// Store backed by the two given files
    pub fn new(rtc_path: impl Into<PathBuf>, interval_path: impl Into<PathBuf>) -> Self {
        Self {
            rtc_path: rtc_path.into(),
            interval_path: interval_path.into(),
        }
    }

    /// Path of the timestamp file
    pub fn rtc_path(&self) -> &Path {
        &self.rtc_path
    }

    /// Path of the interval file
    pub fn interval_path(&self) -> &Path {
        &self.interval_path
    }

    /// Load both values. Either file missing or malformed is fatal.
    pub fn load(&self) -> ScheduleResult<ScheduleState> {
        let rtc = read_value(&self.rtc_path)?;
        let interval = read_value(&self.interval_path)?;

        let last_wake = Timestamp::parse(&rtc).map_err(|e| missing(&self.rtc_path, e))?;
        let interval = interval
            .parse::<Interval>()
            .map_err(|e| missing(&self.interval_path, e))?;

        log::debug!("Loaded fallback schedule {last_wake} every {interval}h");
        Ok(ScheduleState { last_wake, interval })
    }

    /// Overwrite both files
    pub fn save(&self, state: &ScheduleState) -> ScheduleResult<()> {
        write_value(&self.rtc_path, state.last_wake.as_str())?;
        write_value(&self.interval_path, &state.interval.to_string())?;
        log::debug!(
            "Persisted schedule {} every {}h",
            state.last_wake,
            state.interval
        );
        Ok(())
    }
}

fn missing(path: &Path, reason: impl ToString) -> ScheduleError {
    ScheduleError::PersistenceMissing {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_value(path: &Path) -> ScheduleResult<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_owned())
        .map_err(|e| missing(path, e))
}

fn write_value(path: &Path, value: &str) -> ScheduleResult<()> {
    fs::write(path, value).map_err(|source| ScheduleError::PersistenceWrite {
        path: path.to_path_buf(),
        source,
    })
}
