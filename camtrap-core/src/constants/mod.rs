//! Constants for camtrap
//!
//! Every protocol timing, wire constant and threshold lives here so the
//! rest of the code never carries a magic number.
//!
//! ## Organization
//!
//! - **Time**: unit conversions and protocol timings
//! - **Modem**: AT command strings and reply markers
//! - **Power**: power-controller bus address and registers

/// Time unit conversions, protocol delays and the capture threshold.
pub mod time;

/// AT commands, reply markers and registration codes.
pub mod modem;

/// Power-controller bus address, registers and settle delay.
pub mod power;
