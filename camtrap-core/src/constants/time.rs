//! Time-Related Constants
//!
//! Unit conversions plus the fixed delays that make up one wake cycle.
//! None of these are adaptive; the cycle has no global deadline.

use core::time::Duration;

// ===== TIME UNIT CONVERSIONS =====

/// Seconds per hour.
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Microseconds per second.
pub const US_PER_SECOND: u64 = 1_000_000;

// ===== WAKE DECISION =====

/// Sleeps at or below this many seconds are not scheduled.
///
/// The power controller cannot reliably execute a sub-minute power cycle,
/// so anything this close to the scheduled wake captures immediately.
pub const CAPTURE_THRESHOLD_SECS: i64 = 60;

// ===== COMMAND TRANSPORT =====

/// How often the transport checks the serial line for buffered bytes.
pub const COMMAND_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on a single AT exchange before `TransportTimeout`.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between sending `AT+CCLK?` and reading the buffered reply.
pub const CLOCK_SETTLE: Duration = Duration::from_secs(2);

// ===== REACHABILITY =====

/// Default number of registration probes before giving up.
pub const DEFAULT_MAX_PROBES: u32 = 10;

/// Backoff between two failed registration probes.
pub const PROBE_BACKOFF: Duration = Duration::from_secs(3);

/// Pause after registration before any broker traffic.
pub const REGISTRATION_SETTLE: Duration = Duration::from_secs(10);

// ===== TIME CHANNEL =====

/// How long retained schedule messages are accepted after subscribing.
///
/// Hard bound: anything arriving later is ignored for this cycle.
pub const OBSERVATION_WINDOW: Duration = Duration::from_secs(5);

/// MQTT keep-alive announced to the broker.
pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Pause before polling the broker again after a connection error.
pub const BROKER_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Pause after the last publish so QoS 1 acknowledgements can drain.
pub const PUBLISH_FLUSH: Duration = Duration::from_secs(5);

// ===== CAPTURE =====

/// Pause between the detector finishing and telemetry publication.
pub const CAPTURE_SETTLE: Duration = Duration::from_secs(5);
