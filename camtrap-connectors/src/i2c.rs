//! Linux i2c-dev bus

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use camtrap_core::PeripheralBus;

/// i2c-dev: select the target address for subsequent reads and writes
const I2C_SLAVE: u64 = 0x0703;

/// Peripheral bus backed by `/dev/i2c-N`
pub struct LinuxI2cBus {
    file: File,
    selected: Option<u16>,
}

impl LinuxI2cBus {
    /// Open the bus device node
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        log::info!("I2C bus opened: {}", path.display());
        Ok(Self {
            file,
            selected: None,
        })
    }

    fn select(&mut self, address: u16) -> io::Result<()> {
        if self.selected == Some(address) {
            return Ok(());
        }
        // SAFETY: I2C_SLAVE takes the address by value and the fd is owned
        // by `self.file` for the duration of the call.
        #[allow(unsafe_code)]
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            self.selected = None;
            return Err(io::Error::last_os_error());
        }
        self.selected = Some(address);
        Ok(())
    }
}

impl PeripheralBus for LinuxI2cBus {
    fn write_block(&mut self, address: u16, register: u8, data: &[u8]) -> io::Result<()> {
        self.select(address)?;
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.file.write_all(&frame)
    }

    fn write_byte(&mut self, address: u16, byte: u8) -> io::Result<()> {
        self.select(address)?;
        self.file.write_all(&[byte])
    }
}
