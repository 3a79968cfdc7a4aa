//! Node configuration
//!
//! Every setting can be given as a flag or through the environment, so a
//! systemd unit with an `EnvironmentFile` works unchanged.

use std::path::PathBuf;

use camtrap_connectors::{MqttConfig, ScheduleTopics};
use camtrap_core::{FileScheduleStore, ReachabilityPolicy};
use clap::Parser;

/// Default still capture: one 1280x960 frame to the detector's input path
pub const DEFAULT_CAPTURE_COMMAND: &str =
    "libcamera-still --nopreview --width 1280 --height 960 -t 1000 -o /tmp/img.jpg";

/// Settings for one wake cycle
#[derive(Debug, Clone, Parser)]
#[command(name = "camtrap", version, about = "Solar camera trap wake scheduler")]
pub struct NodeConfig {
    /// Device identity, the second topic level
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// Owner identity, the first topic level
    #[arg(long = "owner", env = "MY_NAME")]
    pub owner: String,

    /// MQTT broker host
    #[arg(long, env = "BROKER_ADDRESS")]
    pub broker_address: String,

    /// MQTT broker port
    #[arg(long, env = "BROKER_PORT")]
    pub broker_port: u16,

    /// Modem AT command port
    #[arg(long, env = "SERIAL_PORT", default_value = "/dev/ttyUSB1")]
    pub serial_port: String,

    /// Modem baud rate
    #[arg(long, env = "BAUD_RATE", default_value_t = 9600)]
    pub baud_rate: u32,

    /// I2C bus the power controller sits on
    #[arg(long, env = "I2C_BUS", default_value = "/dev/i2c-1")]
    pub i2c_bus: PathBuf,

    /// Power controller address, decimal or 0x-prefixed hex
    #[arg(
        long = "power-address",
        env = "POWER_CONTROLLER_ADDR",
        default_value = "0x42",
        value_parser = parse_address
    )]
    pub power_address: u16,

    /// Fallback last-wake file
    #[arg(long, env = "RTC_FILE", default_value = "/home/pi/rtc.txt")]
    pub rtc_file: PathBuf,

    /// Fallback interval file
    #[arg(long, env = "INTERVAL_FILE", default_value = "/home/pi/time_interval.txt")]
    pub interval_file: PathBuf,

    /// Environmental sensor driver node
    #[arg(long, env = "SENSOR_DEVICE", default_value = "/dev/bme280")]
    pub sensor_device: PathBuf,

    /// Shell command that takes the picture
    #[arg(long, env = "CAPTURE_COMMAND", default_value = DEFAULT_CAPTURE_COMMAND)]
    pub capture_command: String,

    /// Shell command whose stdout is published as detection data
    #[arg(long, env = "DETECTOR_COMMAND", default_value = "/home/pi/onnx/build/main")]
    pub detector_command: String,

    /// Registration probes before giving up
    #[arg(long, env = "MAX_TRIES", default_value_t = 10)]
    pub max_tries: u32,

    /// Also require a usable signal-quality reading to count as reachable
    #[arg(long, env = "REQUIRE_SIGNAL")]
    pub require_signal: bool,
}

impl NodeConfig {
    /// Topics for this device
    pub fn topics(&self) -> ScheduleTopics {
        ScheduleTopics::new(&self.owner, &self.client_id)
    }

    /// Broker connection settings
    pub fn mqtt(&self) -> MqttConfig {
        MqttConfig::new(&self.broker_address, self.broker_port, &self.client_id)
    }

    /// How probe results are combined
    pub fn policy(&self) -> ReachabilityPolicy {
        if self.require_signal {
            ReachabilityPolicy::RegistrationAndSignal
        } else {
            ReachabilityPolicy::RegistrationOnly
        }
    }

    /// Fallback schedule files
    pub fn store(&self) -> FileScheduleStore {
        FileScheduleStore::new(&self.rtc_file, &self.interval_file)
    }
}

fn parse_address(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid bus address {s:?}: {e}"))
}
