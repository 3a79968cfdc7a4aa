//! Modem Constants
//!
//! The AT command subset spoken to the cellular modem and the markers
//! used to classify its replies.

/// Disable command echo. Sent once at start-up.
pub const CMD_ECHO_OFF: &str = "ATE0";

/// Packet-domain registration status query.
pub const CMD_REGISTRATION: &str = "AT+CGREG?";

/// Signal quality query.
pub const CMD_SIGNAL_QUALITY: &str = "AT+CSQ";

/// Real-time clock query.
pub const CMD_CLOCK: &str = "AT+CCLK?";

/// Line terminator appended to every command.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Reply fragment for "registered, roaming", the only accepted state.
pub const REGISTERED_MARKER: &str = "+CGREG: 0,5";

/// Prefix of a signal quality reply.
pub const SIGNAL_PREFIX: &str = "+CSQ: ";

/// Lowest RSSI index that counts as a usable signal.
pub const SIGNAL_MIN: u8 = 1;

/// Highest valid RSSI index. 99 means "not known or not detectable".
pub const SIGNAL_MAX: u8 = 31;

/// Unsolicited result code emitted when the modem's broker session drops.
pub const CONNECTION_LOST_MARKER: &str = "CMQTTCONNLOST";

/// Marker for a rejected command.
pub const ERROR_MARKER: &str = "ERROR";

/// Pattern of the timestamp embedded in a `+CCLK` reply.
pub const TIMESTAMP_PATTERN: &str = r"\d{2}/\d{2}/\d{2},\d{2}:\d{2}:\d{2}";

/// chrono format of [`TIMESTAMP_PATTERN`].
pub const TIMESTAMP_FORMAT: &str = "%y/%m/%d,%H:%M:%S";

/// Length of a canonical timestamp string.
pub const TIMESTAMP_LEN: usize = 17;
