//! Modem clock timestamps
//!
//! The modem reports its RTC as `YY/MM/DD,HH:MM:SS`, usually wrapped in a
//! `+CCLK: "..."` reply with a timezone suffix. The same string travels
//! unchanged over the time channel and into the fallback store, so the
//! canonical form is the text itself; the parsed instant is derived.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::constants::modem::{TIMESTAMP_FORMAT, TIMESTAMP_LEN, TIMESTAMP_PATTERN};
use crate::errors::{ScheduleError, ScheduleResult};

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern is valid"))
}

fn exact_pattern() -> &'static Regex {
    static EXACT: OnceLock<Regex> = OnceLock::new();
    EXACT.get_or_init(|| {
        Regex::new(&format!("^{TIMESTAMP_PATTERN}$")).expect("timestamp pattern is valid")
    })
}

/// A two-digit-year calendar timestamp as reported by the modem RTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    text: heapless::String<TIMESTAMP_LEN>,
    instant: NaiveDateTime,
}

impl Timestamp {
    /// Parse text that is exactly one timestamp, nothing before or after
    pub fn parse(text: &str) -> ScheduleResult<Self> {
        let invalid = || ScheduleError::InvalidTimestamp { text: text.to_owned() };

        if !exact_pattern().is_match(text) {
            return Err(invalid());
        }
        let instant = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|_| invalid())?;

        let mut canonical = heapless::String::new();
        canonical.push_str(text).map_err(|_| invalid())?;

        Ok(Self { text: canonical, instant })
    }

    /// Pull the timestamp out of free-form modem output
    ///
    /// Returns `None` unless the text contains exactly one match. Two
    /// matches are ambiguous and treated the same as none.
    pub fn extract(text: &str) -> Option<Self> {
        let mut matches = pattern().find_iter(text);
        let first = matches.next()?;
        if matches.next().is_some() {
            log::warn!("Ambiguous clock reply, more than one timestamp in {text:?}");
            return None;
        }

        match Self::parse(first.as_str()) {
            Ok(ts) => Some(ts),
            Err(e) => {
                log::warn!("Clock reply matched the pattern but is not a date: {e}");
                None
            }
        }
    }

    /// Canonical text, byte-identical to what was parsed
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    /// Parsed calendar instant
    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    /// Whole seconds from `earlier` to `self`. Negative if `earlier` is later.
    pub fn seconds_since(&self, earlier: &Timestamp) -> i64 {
        (self.instant - earlier.instant).num_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        let ts = Timestamp::parse("24/01/15,10:00:00").unwrap();
        assert_eq!(ts.as_str(), "24/01/15,10:00:00");
        assert_eq!(ts.instant().to_string(), "2024-01-15 10:00:00");
    }

    #[test]
    fn test_parse_rejects_surrounding_text() {
        assert!(Timestamp::parse(" 24/01/15,10:00:00").is_err());
        assert!(Timestamp::parse("24/01/15,10:00:00+08").is_err());
        assert!(Timestamp::parse("24/1/15,10:00:00").is_err());
    }

    #[test]
    fn test_parse_rejects_impossible_date() {
        let err = Timestamp::parse("24/13/40,10:00:00").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_extract_from_cclk_reply() {
        let reply = "\r\n+CCLK: \"24/01/15,10:00:00+32\"\r\n\r\nOK\r\n";
        let ts = Timestamp::extract(reply).unwrap();
        assert_eq!(ts.as_str(), "24/01/15,10:00:00");
    }

    #[test]
    fn test_extract_none() {
        assert!(Timestamp::extract("\r\nERROR\r\n").is_none());
        assert!(Timestamp::extract("").is_none());
    }

    #[test]
    fn test_extract_ambiguous() {
        let reply = "+CCLK: \"24/01/15,10:00:00\" +CCLK: \"24/01/15,11:00:00\"";
        assert!(Timestamp::extract(reply).is_none());
    }

    #[test]
    fn test_seconds_since_crosses_midnight() {
        let before = Timestamp::parse("23/12/31,23:59:00").unwrap();
        let after = Timestamp::parse("24/01/01,00:01:00").unwrap();
        assert_eq!(after.seconds_since(&before), 120);
        assert_eq!(before.seconds_since(&after), -120);
    }
}
