//! Wake decision
//!
//! Pure function of the clock reading and the reconciled schedule:
//!
//! ```text
//! elapsed   = now - last_wake
//! remaining = interval_hours * 3600 - elapsed
//! remaining > 60  => SleepFor(remaining)
//! otherwise       => CaptureNow
//! ```
//!
//! A negative `remaining` (skewed clock, shortened interval) lands in the
//! capture branch, which reschedules a full interval afterwards.

use std::time::Duration;

use crate::constants::time::{CAPTURE_THRESHOLD_SECS, US_PER_SECOND};
use crate::schedule::ScheduleState;
use crate::timestamp::Timestamp;

/// What to do with the rest of this wake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeDecision {
    /// Too early: power down for this long
    SleepFor(Duration),
    /// Within a minute of (or past) the scheduled wake
    CaptureNow,
}

impl WakeDecision {
    /// Sleep length in microseconds, as the power controller wants it
    pub fn sleep_micros(&self) -> Option<u64> {
        match self {
            WakeDecision::SleepFor(d) => Some(d.as_secs().saturating_mul(US_PER_SECOND)),
            WakeDecision::CaptureNow => None,
        }
    }
}

/// Seconds left until the next scheduled wake. May be negative.
pub fn remaining_seconds(now: &Timestamp, schedule: &ScheduleState) -> i64 {
    let elapsed = now.seconds_since(&schedule.last_wake);
    (schedule.interval.as_secs() as i64).saturating_sub(elapsed)
}

/// Decide between sleeping and capturing
pub fn decide(now: &Timestamp, schedule: &ScheduleState) -> WakeDecision {
    let remaining = remaining_seconds(now, schedule);
    if remaining > CAPTURE_THRESHOLD_SECS {
        WakeDecision::SleepFor(Duration::from_secs(remaining as u64))
    } else {
        WakeDecision::CaptureNow
    }
}
