//! Core scheduling engine for camtrap
//!
//! Decides when a solar camera trap may sleep and for how long.
//! Everything here is pure apart from the file-backed fallback store;
//! modem, bus and broker access live in `camtrap-connectors`.
//!
//! Key constraints:
//! - The modem RTC is the only trustworthy clock
//! - The fleet schedule arrives asynchronously and may not arrive at all
//! - A wrong sleep duration is only corrected on the next wake
//!
//! ```
//! use camtrap_core::{decide, ScheduleState, Timestamp, WakeDecision};
//!
//! let now = Timestamp::parse("24/01/15,09:59:30").unwrap();
//! let schedule = ScheduleState::parse("24/01/15,09:00:00", "1").unwrap();
//!
//! assert_eq!(decide(&now, &schedule), WakeDecision::CaptureNow);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod constants;
pub mod decision;
pub mod errors;
pub mod modem;
pub mod power;
pub mod schedule;
pub mod sensor;
pub mod store;
pub mod timestamp;
pub mod traits;

// Public API
pub use decision::{decide, remaining_seconds, WakeDecision};
pub use errors::{ScheduleError, ScheduleResult};
pub use modem::{
    classify_response, CommandResult, ReachabilityPolicy, ReachabilityStatus, ResponseClass,
};
pub use power::PowerCommand;
pub use schedule::{Interval, ScheduleObservation, ScheduleState};
pub use sensor::SensorQuery;
pub use store::FileScheduleStore;
pub use timestamp::Timestamp;
pub use traits::{CommandLink, EnvironmentSensor, PeripheralBus, ReconnectHook};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
