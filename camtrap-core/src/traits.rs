//! Seams between the scheduler and the hardware
//!
//! Each device handle is opened once at start-up and handed to exactly
//! one component. Keep these small: anything smarter than raw bytes
//! belongs in the component, not the handle.

use std::io;

use crate::sensor::SensorQuery;

/// Byte-level serial line to the modem
pub trait CommandLink: Send {
    /// Write all bytes
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Take whatever is buffered
    ///
    /// Returns `nb::Error::WouldBlock` when nothing has arrived yet.
    fn read_available(&mut self) -> nb::Result<Vec<u8>, io::Error>;
}

/// Write-only access to devices on the peripheral bus
pub trait PeripheralBus: Send {
    /// Single-transaction block write of `data` to `register`
    fn write_block(&mut self, address: u16, register: u8, data: &[u8]) -> io::Result<()>;

    /// Write one byte with no register
    fn write_byte(&mut self, address: u16, byte: u8) -> io::Result<()>;
}

/// Environmental readout, already scaled to engineering units
pub trait EnvironmentSensor: Send + Sync {
    /// Read one quantity
    fn read(&self, query: SensorQuery) -> io::Result<f32>;
}

/// Out-of-band action run when the modem reports a dropped broker session
pub trait ReconnectHook: Send + Sync {
    /// Re-establish the session. Must not block.
    fn reconnect(&self);
}

impl<F> ReconnectHook for F
where
    F: Fn() + Send + Sync,
{
    fn reconnect(&self) {
        self()
    }
}
