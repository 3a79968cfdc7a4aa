//! Error Types for Schedule Reconciliation
//!
//! ## Error Categories
//!
//! ### Bad input
//! - `InvalidTimestamp`: text does not follow `YY/MM/DD,HH:MM:SS`
//! - `InvalidInterval`: interval is not a positive whole number of hours
//!
//! ### Recoverable
//! - `ScheduleIncomplete`: the time channel delivered only part of the
//!   schedule within the observation window. The caller falls back to
//!   the persisted store.
//!
//! ### Fatal
//! - `PersistenceMissing`: neither the channel nor the store produced a
//!   schedule, so no safe sleep duration exists.
//! - `PersistenceWrite`: the store could not be overwritten.
//!
//! ```
//! use camtrap_core::{ScheduleError, ScheduleObservation};
//!
//! let partial = ScheduleObservation { rtc: Some("24/01/15,09:00:00".into()), interval: None };
//! match partial.resolve() {
//!     Err(ScheduleError::ScheduleIncomplete { .. }) => { /* load the store */ }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schedule operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Schedule errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Timestamp text did not parse
    #[error("Invalid timestamp {text:?}")]
    InvalidTimestamp {
        /// The rejected text
        text: String,
    },

    /// Interval text was not a positive integer
    #[error("Invalid interval {text:?}: expected a positive number of hours")]
    InvalidInterval {
        /// The rejected text
        text: String,
    },

    /// Only part of the schedule was observed
    #[error("Schedule incomplete: rtc {rtc}, interval {interval}")]
    ScheduleIncomplete {
        /// Whether a last-wake timestamp arrived
        rtc: bool,
        /// Whether an interval arrived
        interval: bool,
    },

    /// Fallback file absent or unreadable
    #[error("Persisted schedule missing at {path}: {reason}")]
    PersistenceMissing {
        /// File that could not be used
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// Fallback file could not be written
    #[error("Failed to persist schedule to {path}: {source}")]
    PersistenceWrite {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
