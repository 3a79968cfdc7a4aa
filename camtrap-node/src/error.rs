//! Cycle errors and process exit codes

use camtrap_connectors::ConnectorError;
use camtrap_core::ScheduleError;
use thiserror::Error;

/// Exit status for a completed cycle, whether it captured or slept
pub const EXIT_OK: i32 = 0;

/// Errors that end a wake cycle early
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Failed to open {what} at {path}: {source}")]
    Open {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CycleError {
    /// Process exit code for this failure
    ///
    /// | code | meaning                         |
    /// |------|---------------------------------|
    /// | 1    | network never became reachable  |
    /// | 3    | no usable fallback schedule     |
    /// | 4    | power controller write failed   |
    /// | 5    | modem stopped answering         |
    /// | 6    | any other I/O failure           |
    pub fn exit_code(&self) -> i32 {
        match self {
            CycleError::Connector(ConnectorError::ReachabilityExhausted { .. }) => 1,
            CycleError::Schedule(ScheduleError::PersistenceMissing { .. }) => 3,
            CycleError::Connector(ConnectorError::PeripheralWrite { .. }) => 4,
            CycleError::Connector(ConnectorError::TransportTimeout { .. }) => 5,
            _ => 6,
        }
    }
}
