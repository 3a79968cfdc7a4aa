//! Power Controller Constants

use core::time::Duration;

/// Default bus address of the power controller.
pub const DEFAULT_POWER_ADDRESS: u16 = 0x42;

/// Register that cuts power immediately. Takes no payload.
pub const REG_SLEEP_NOW: u8 = 0x01;

/// Register that takes a 64-bit big-endian sleep duration in microseconds.
pub const REG_SLEEP_DURATION: u8 = 0x02;

/// Delay after a write before the controller is assumed to have latched it.
pub const POWER_SETTLE: Duration = Duration::from_millis(100);
