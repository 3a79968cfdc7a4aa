//! AT reply classification and parsing
//!
//! The modem answers with free text. These helpers turn that text into
//! typed outcomes; sending and waiting is the transport's job.

use crate::constants::modem::{
    CONNECTION_LOST_MARKER, ERROR_MARKER, REGISTERED_MARKER, SIGNAL_MAX, SIGNAL_MIN, SIGNAL_PREFIX,
};

/// How a raw reply is classified, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The broker session dropped. The command itself still ran.
    ConnectionLost,
    /// The modem rejected the command
    Error,
    /// Anything else
    Ok,
}

/// Classify a reply. Connection loss wins over `ERROR`.
pub fn classify_response(response: &str) -> ResponseClass {
    if response.contains(CONNECTION_LOST_MARKER) {
        ResponseClass::ConnectionLost
    } else if response.contains(ERROR_MARKER) {
        ResponseClass::Error
    } else {
        ResponseClass::Ok
    }
}

/// Outcome of one AT exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command executed
    pub success: bool,
    /// Raw decoded reply
    pub response: String,
    /// The reply carried a connection-lost marker and a reconnect was triggered
    pub reconnected: bool,
}

impl CommandResult {
    /// Build from a decoded reply
    pub fn from_response(response: String) -> Self {
        let class = classify_response(&response);
        Self {
            success: class != ResponseClass::Error,
            reconnected: class == ResponseClass::ConnectionLost,
            response,
        }
    }
}

/// Result of one reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityStatus {
    /// Registered (and signal acceptable, if required)
    Reachable,
    /// The modem answered but is not usable yet
    Unreachable,
    /// The exchange itself failed
    TransportError,
}

impl ReachabilityStatus {
    /// Only `Reachable` lets the cycle continue
    pub fn is_reachable(self) -> bool {
        self == ReachabilityStatus::Reachable
    }
}

/// Which checks must pass for a probe to count as reachable
///
/// Both checks always run and are logged; the policy only decides how
/// they combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReachabilityPolicy {
    /// Registration alone decides
    #[default]
    RegistrationOnly,
    /// Registration and a signal index in range
    RegistrationAndSignal,
}

impl ReachabilityPolicy {
    /// Combine the two check results
    pub fn combine(self, registered: bool, signal: Option<u8>) -> bool {
        match self {
            ReachabilityPolicy::RegistrationOnly => registered,
            ReachabilityPolicy::RegistrationAndSignal => {
                registered && signal.map_or(false, signal_in_range)
            }
        }
    }
}

/// `AT+CGREG?` reply shows full registration
pub fn is_registered(response: &str) -> bool {
    response.contains(REGISTERED_MARKER)
}

/// RSSI index from an `AT+CSQ` reply (`+CSQ: <n>,<m>`)
pub fn parse_signal_quality(response: &str) -> Option<u8> {
    let start = response.find(SIGNAL_PREFIX)? + SIGNAL_PREFIX.len();
    let rest = &response[start..];
    let end = rest.find(',')?;
    rest[..end].trim().parse().ok()
}

/// Index is a detectable signal
pub fn signal_in_range(rssi: u8) -> bool {
    (SIGNAL_MIN..=SIGNAL_MAX).contains(&rssi)
}
