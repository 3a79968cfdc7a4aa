use std::io;
use std::process;
use std::sync::Arc;

use camtrap_connectors::{
    AtTransport, IoctlSensor, LinuxI2cBus, Modem, MqttTimeChannel, PowerController,
    ReachabilityMonitor, SerialLink,
};
use camtrap_core::constants::time::PROBE_BACKOFF;
use camtrap_core::{EnvironmentSensor, SensorQuery};
use camtrap_node::{CycleError, CycleReport, NodeConfig, ShellCapture, WakeCycle, EXIT_OK};
use clap::Parser;

/// Stand-in when the sensor driver is missing; every read publishes `null`
struct UnavailableSensor;

impl EnvironmentSensor for UnavailableSensor {
    fn read(&self, _query: SensorQuery) -> io::Result<f32> {
        Err(io::Error::new(io::ErrorKind::NotFound, "sensor not available"))
    }
}

fn main() {
    let config = NodeConfig::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start runtime: {e}");
            process::exit(6);
        }
    };

    let code = match runtime.block_on(run(&config)) {
        Ok(report) => {
            log::info!(
                "Cycle complete: {:?}, power off for {}us",
                report.decision,
                report.sleep_micros
            );
            EXIT_OK
        }
        Err(e) => {
            log::error!("Cycle aborted: {e}");
            e.exit_code()
        }
    };

    drop(runtime);
    process::exit(code);
}

async fn run(config: &NodeConfig) -> Result<CycleReport, CycleError> {
    let link = SerialLink::open(&config.serial_port, config.baud_rate).map_err(|source| {
        CycleError::Open {
            what: "modem serial port",
            path: config.serial_port.clone(),
            source,
        }
    })?;
    let bus = LinuxI2cBus::open(&config.i2c_bus).map_err(|source| CycleError::Open {
        what: "I2C bus",
        path: config.i2c_bus.display().to_string(),
        source,
    })?;
    let sensor: Box<dyn EnvironmentSensor> = match IoctlSensor::open(&config.sensor_device) {
        Ok(sensor) => Box::new(sensor),
        Err(e) => {
            log::warn!(
                "Sensor {} unavailable, telemetry will be null: {e}",
                config.sensor_device.display()
            );
            Box::new(UnavailableSensor)
        }
    };

    let channel = MqttTimeChannel::new(&config.mqtt(), config.topics());
    let mut transport = AtTransport::new(link);
    transport.set_reconnect_hook(Arc::new(channel.reconnect_handle()));
    let modem = Modem::new(transport).with_policy(config.policy());

    let mut cycle = WakeCycle::new(
        modem,
        channel,
        PowerController::with_address(bus, config.power_address),
        config.store(),
        sensor,
        Box::new(ShellCapture::new(
            &config.capture_command,
            &config.detector_command,
        )),
    )
    .with_monitor(ReachabilityMonitor::new(config.max_tries, PROBE_BACKOFF));

    cycle.run().await
}
