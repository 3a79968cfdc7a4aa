//! Power scheduler client
//!
//! Fire-and-forget: nothing is read back from the controller. Once a
//! sleep duration has been written the supply can drop at any moment,
//! so callers should have finished everything else first.

use std::time::Duration;

use camtrap_core::constants::power::{DEFAULT_POWER_ADDRESS, POWER_SETTLE};
use camtrap_core::{PeripheralBus, PowerCommand};
use tokio::time::sleep;

use crate::ConnectorError;

/// Client for the power controller on a peripheral bus
pub struct PowerController<B> {
    bus: B,
    address: u16,
    settle: Duration,
}

impl<B: PeripheralBus> PowerController<B> {
    /// Controller at the default address
    pub fn new(bus: B) -> Self {
        Self::with_address(bus, DEFAULT_POWER_ADDRESS)
    }

    /// Controller at `address`
    pub fn with_address(bus: B, address: u16) -> Self {
        Self {
            bus,
            address,
            settle: POWER_SETTLE,
        }
    }

    /// Device address
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Write one command, then wait the settle delay
    pub async fn send(&mut self, command: PowerCommand) -> Result<(), ConnectorError> {
        let register = command.register();
        let result = match command {
            PowerCommand::SleepNow => self.bus.write_byte(self.address, register),
            PowerCommand::SleepFor { .. } => {
                self.bus
                    .write_block(self.address, register, command.payload().as_slice())
            }
        };
        result.map_err(|source| {
            log::error!("Power controller write failed: {command:?}: {source}");
            ConnectorError::PeripheralWrite {
                address: self.address,
                register,
                source,
            }
        })?;

        log::info!("Power controller accepted {command:?}");
        sleep(self.settle).await;
        Ok(())
    }

    /// Hold power off for `micros` microseconds
    pub async fn schedule_sleep(&mut self, micros: u64) -> Result<(), ConnectorError> {
        self.send(PowerCommand::SleepFor { micros }).await
    }
}
