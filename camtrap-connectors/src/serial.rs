//! Serial line to the modem

use std::io::{self, Read, Write};
use std::time::Duration;

use camtrap_core::CommandLink;
use serialport::SerialPort;

/// Read timeout for draining bytes that are already buffered
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// [`CommandLink`] over a serial port
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open `path` at `baud_rate`, 8N1
    pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                log::error!("Failed to open serial port {path}: {e}");
                io::Error::from(e)
            })?;
        log::info!("Serial port opened: {path} at {baud_rate} baud");
        Ok(Self { port })
    }
}

impl CommandLink for SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_available(&mut self) -> nb::Result<Vec<u8>, io::Error> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if waiting == 0 {
            return Err(nb::Error::WouldBlock);
        }
        let mut buf = vec![0u8; waiting];
        self.port.read_exact(&mut buf)?;
        Ok(buf)
    }
}
