//! Modem, Broker and Bus Connectors for the Wake Cycle
//!
//! ## Overview
//!
//! A camera trap talks to three things besides its own sensors:
//!
//! ### Cellular modem (serial, AT commands)
//!
//! **Used for:**
//! - Confirming network registration before any broker traffic
//! - Reading the battery-backed RTC, the only trustworthy clock
//!
//! **Characteristics:**
//! - One outstanding command at a time, replies correlated by order only
//! - Replies are free text; classification lives in `camtrap_core::modem`
//! - Unsolicited `CMQTTCONNLOST` codes can ride along with any reply
//!
//! ### MQTT broker (schedule agreement and telemetry)
//!
//! **Used for:**
//! - Receiving the retained last-wake time and interval
//! - Publishing the reconciled schedule back, retained
//! - One-way telemetry and detection results
//!
//! **Characteristics:**
//! - No session is opened until the modem reports the network reachable
//! - Network I/O runs on a background task
//! - The latest value per schedule topic is kept and read once, after a
//!   fixed observation window
//!
//! ### Power controller (I2C)
//!
//! **Used for:**
//! - Handing over the sleep duration. Power drops shortly after.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # async fn example() -> Result<(), camtrap_connectors::ConnectorError> {
//! use camtrap_connectors::{AtTransport, Modem, ReachabilityMonitor, SerialLink};
//!
//! let link = SerialLink::open("/dev/ttyUSB1", 9600)?;
//! let mut modem = Modem::new(AtTransport::new(link));
//!
//! modem.init().await?;
//! ReachabilityMonitor::default().wait_until_reachable(&mut modem).await?;
//! let now = modem.read_clock().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod modem;
pub mod power;
pub mod transport;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "linux")]
pub mod bme280;

#[cfg(feature = "linux")]
pub mod i2c;

// Re-export common types
pub use modem::{Modem, Probe, ReachabilityMonitor};
pub use power::PowerController;
pub use transport::AtTransport;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConfig, MqttTimeChannel, ReconnectHandle, ScheduleTopics};

#[cfg(feature = "serial")]
pub use serial::SerialLink;

#[cfg(feature = "linux")]
pub use bme280::IoctlSensor;

#[cfg(feature = "linux")]
pub use i2c::LinuxI2cBus;

use std::time::Duration;

use camtrap_core::{ScheduleObservation, ScheduleState, SensorQuery, Timestamp};
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("No reply to {command:?} within {waited:?}")]
    TransportTimeout { command: String, waited: Duration },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Command {command:?} rejected: {response:?}")]
    CommandRejected { command: String, response: String },

    #[error("Network unreachable after {attempts} probes")]
    ReachabilityExhausted { attempts: u32 },

    #[error("Write to device {address:#04x} register {register:#04x} failed: {source}")]
    PeripheralWrite {
        address: u16,
        register: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

/// Async publish-only connector
#[async_trait::async_trait]
pub trait AsyncConnector: Send {
    type Error;

    /// Publish one non-retained message
    async fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Get connection statistics
    fn stats(&self) -> ConnectionStats;
}

/// Connection statistics common to all connectors
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total messages failed to send
    pub messages_failed: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Number of reconnections
    pub reconnections: u32,
    /// Last error message
    pub last_error: Option<String>,
}

/// The broker side of schedule agreement
///
/// Implemented by [`MqttTimeChannel`]; the wake cycle only sees this
/// trait so it can run against an in-memory channel in tests.
#[async_trait::async_trait]
pub trait ScheduleChannel: Send {
    /// Open the session. Called once the network is reachable.
    async fn connect(&mut self) -> Result<(), ConnectorError>;

    /// Accept schedule messages for `window`, then stop listening
    ///
    /// Nothing that arrives after the window closes is returned. Fails
    /// with [`ConnectorError::NotConnected`] before `connect`.
    async fn observe(&mut self, window: Duration) -> Result<ScheduleObservation, ConnectorError>;

    /// Publish both halves of the schedule, retained
    async fn publish_schedule(&mut self, state: &ScheduleState) -> Result<(), ConnectorError>;

    /// Publish a new last-wake time, retained
    async fn publish_last_wake(&mut self, at: &Timestamp) -> Result<(), ConnectorError>;

    /// Publish one sensor value. `None` goes out as `null`.
    async fn publish_telemetry(
        &mut self,
        query: SensorQuery,
        value: Option<f32>,
    ) -> Result<(), ConnectorError>;

    /// Publish the detector output verbatim
    async fn publish_detections(&mut self, payload: &str) -> Result<(), ConnectorError>;

    /// Flush outstanding publishes and disconnect
    async fn shutdown(&mut self) -> Result<(), ConnectorError>;
}

/// Wire form of an optional reading
pub fn telemetry_payload(value: Option<f32>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "null".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_payload() {
        assert_eq!(telemetry_payload(Some(23.45)), "23.45");
        assert_eq!(telemetry_payload(None), "null");
        assert_eq!(telemetry_payload(Some(f32::NAN)), "null");
    }
}
