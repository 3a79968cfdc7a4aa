//! BME280 readout through its character-device driver

use std::ffi::c_long;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use camtrap_core::{EnvironmentSensor, SensorQuery};

/// [`EnvironmentSensor`] over the driver's per-quantity ioctls
pub struct IoctlSensor {
    file: File,
}

impl IoctlSensor {
    /// Open the driver node, usually `/dev/bme280`
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    fn read_raw(&self, query: SensorQuery) -> io::Result<c_long> {
        let mut raw: c_long = 0;
        // SAFETY: each opcode is an _IOR of size_of::<c_long>(), so the
        // driver writes exactly one c_long through the pointer.
        #[allow(unsafe_code)]
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                query.opcode() as _,
                &mut raw as *mut c_long,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(raw)
    }
}

impl EnvironmentSensor for IoctlSensor {
    fn read(&self, query: SensorQuery) -> io::Result<f32> {
        let raw = self.read_raw(query).map_err(|e| {
            log::warn!("ioctl error with command {:#x}: {e}", query.opcode());
            e
        })?;
        Ok(query.scale(i64::from(raw)))
    }
}
