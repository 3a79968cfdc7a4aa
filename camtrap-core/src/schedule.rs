//! Fleet schedule: last wake time plus wake interval
//!
//! A `ScheduleState` is the unit of agreement between the device, the
//! coordinator and the fallback store. The time channel only ever yields
//! a `ScheduleObservation`, which may be missing either half.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::time::SECONDS_PER_HOUR;
use crate::errors::{ScheduleError, ScheduleResult};
use crate::timestamp::Timestamp;

/// Hours between two scheduled wakes. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(NonZeroU32);

impl Interval {
    /// Interval of `hours`, or `None` for zero
    pub fn from_hours(hours: u32) -> Option<Self> {
        NonZeroU32::new(hours).map(Self)
    }

    /// Hours as configured
    pub fn hours(self) -> u32 {
        self.0.get()
    }

    /// Interval length in seconds
    pub fn as_secs(self) -> u64 {
        u64::from(self.hours()) * SECONDS_PER_HOUR
    }

    /// Interval length as a duration
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl FromStr for Interval {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidInterval { text: s.to_owned() };
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        trimmed
            .parse::<u32>()
            .ok()
            .and_then(Self::from_hours)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hours())
    }
}

/// The reconciled schedule for one wake cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    /// When the fleet last woke this device to capture
    pub last_wake: Timestamp,
    /// Hours between captures
    pub interval: Interval,
}

impl ScheduleState {
    /// Build from the two wire strings
    pub fn parse(last_wake: &str, interval: &str) -> ScheduleResult<Self> {
        Ok(Self {
            last_wake: Timestamp::parse(last_wake.trim())?,
            interval: interval.parse()?,
        })
    }

    /// Same interval, with the last wake moved to `now`
    pub fn advanced_to(&self, now: Timestamp) -> Self {
        Self {
            last_wake: now,
            interval: self.interval,
        }
    }
}

/// Whatever the time channel delivered inside the observation window
///
/// Fields are raw payloads. Later messages on the same topic replace
/// earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleObservation {
    /// Payload of the last message on the rtc topic
    pub rtc: Option<String>,
    /// Payload of the last message on the interval topic
    pub interval: Option<String>,
}

impl ScheduleObservation {
    /// Both halves arrived
    pub fn is_complete(&self) -> bool {
        self.rtc.is_some() && self.interval.is_some()
    }

    /// Turn a complete observation into a schedule
    ///
    /// Partial observations fail with `ScheduleIncomplete` so the caller
    /// can replace *both* halves from the store instead of mixing a live
    /// value with a stale one.
    pub fn resolve(self) -> ScheduleResult<ScheduleState> {
        match (self.rtc, self.interval) {
            (Some(rtc), Some(interval)) => ScheduleState::parse(&rtc, &interval),
            (rtc, interval) => Err(ScheduleError::ScheduleIncomplete {
                rtc: rtc.is_some(),
                interval: interval.is_some(),
            }),
        }
    }
}
