//! Power-controller commands
//!
//! The controller sits on the peripheral bus and owns the supply rail.
//! Writing a sleep duration is the point of no return: power drops
//! shortly afterwards and comes back when the duration has elapsed.

use crate::constants::power::{REG_SLEEP_DURATION, REG_SLEEP_NOW};

/// A command the power controller understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCommand {
    /// Enter low power immediately
    SleepNow,
    /// Hold power off for this many microseconds
    SleepFor {
        /// Duration in microseconds
        micros: u64,
    },
}

impl PowerCommand {
    /// Register the command is written to
    pub fn register(&self) -> u8 {
        match self {
            PowerCommand::SleepNow => REG_SLEEP_NOW,
            PowerCommand::SleepFor { .. } => REG_SLEEP_DURATION,
        }
    }

    /// Bytes following the register, most significant first
    pub fn payload(&self) -> heapless::Vec<u8, 8> {
        match self {
            PowerCommand::SleepNow => heapless::Vec::new(),
            PowerCommand::SleepFor { micros } => {
                heapless::Vec::from_slice(&micros.to_be_bytes()).unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_now_has_no_payload() {
        let cmd = PowerCommand::SleepNow;
        assert_eq!(cmd.register(), 0x01);
        assert!(cmd.payload().is_empty());
    }

    #[test]
    fn test_duration_is_big_endian() {
        let cmd = PowerCommand::SleepFor { micros: 3_540_000_000 };
        assert_eq!(cmd.register(), 0x02);
        assert_eq!(
            cmd.payload().as_slice(),
            &[0x00, 0x00, 0x00, 0x00, 0xD3, 0x00, 0x1D, 0x00]
        );
    }

    #[test]
    fn test_full_width() {
        let cmd = PowerCommand::SleepFor { micros: 0x0102_0304_0506_0708 };
        assert_eq!(cmd.payload().as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
