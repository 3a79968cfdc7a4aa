//! Environmental sensor queries
//!
//! The BME280 kernel driver exposes one read-only ioctl per quantity,
//! each returning a C `long` in fixed-point units. The opcodes follow the
//! Linux `_IOR(type, nr, size)` layout and are computed once here, so
//! callers only ever name the quantity.

use std::ffi::c_long;
use std::mem::size_of;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;
const IOC_READ: u32 = 2;

const fn ior(kind: u8, nr: u8, size: usize) -> u32 {
    (IOC_READ << IOC_DIRSHIFT)
        | ((kind as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
}

const GET_TEMPERATURE: u32 = ior(b't', 1, size_of::<c_long>());
const GET_HUMIDITY: u32 = ior(b'h', 2, size_of::<c_long>());
const GET_PRESSURE: u32 = ior(b'p', 3, size_of::<c_long>());

/// A quantity the environmental sensor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorQuery {
    /// Degrees Celsius
    Temperature,
    /// Percent relative humidity
    Humidity,
    /// Pascal
    Pressure,
}

impl SensorQuery {
    /// All queries, in publication order
    pub const ALL: [SensorQuery; 3] = [
        SensorQuery::Temperature,
        SensorQuery::Humidity,
        SensorQuery::Pressure,
    ];

    /// ioctl request number
    pub const fn opcode(self) -> u32 {
        match self {
            SensorQuery::Temperature => GET_TEMPERATURE,
            SensorQuery::Humidity => GET_HUMIDITY,
            SensorQuery::Pressure => GET_PRESSURE,
        }
    }

    /// Driver fixed-point divisor
    pub const fn divisor(self) -> f32 {
        match self {
            SensorQuery::Temperature => 100.0,
            SensorQuery::Humidity => 1024.0,
            SensorQuery::Pressure => 256.0,
        }
    }

    /// Convert a raw driver value to engineering units
    pub fn scale(self, raw: i64) -> f32 {
        raw as f32 / self.divisor()
    }

    /// Telemetry topic suffix
    pub const fn topic_suffix(self) -> &'static str {
        match self {
            SensorQuery::Temperature => "temp",
            SensorQuery::Humidity => "humid",
            SensorQuery::Pressure => "pressure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes_on_lp64() {
        if size_of::<c_long>() == 8 {
            assert_eq!(SensorQuery::Temperature.opcode(), 0x8008_7401);
            assert_eq!(SensorQuery::Humidity.opcode(), 0x8008_6802);
            assert_eq!(SensorQuery::Pressure.opcode(), 0x8008_7003);
        }
    }

    #[test]
    fn test_opcodes_distinct() {
        let codes: Vec<u32> = SensorQuery::ALL.iter().map(|q| q.opcode()).collect();
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[2]);
    }

    #[test]
    fn test_scaling() {
        assert_eq!(SensorQuery::Temperature.scale(2345), 23.45);
        assert_eq!(SensorQuery::Humidity.scale(51200), 50.0);
        assert_eq!(SensorQuery::Pressure.scale(25_932_800), 101_300.0);
    }
}
