//! Sunglasses producer: a Hall-effect magnetometer behind an I2C ADC.
//!
//! The converter runs in continuous 12-bit mode and is sampled once per
//! second; each reading is sign-extended and stored as two little-endian
//! bytes.

use crate::buffer::{BufferPair, FrameCursor};
use anyhow::{Context, Result};
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use std::time::{Duration, Instant};

pub const BUS: &str = "/dev/i2c-1";
pub const ADDRESS: u8 = 0x6B;

/// Continuous conversion, 12-bit resolution.
const CONFIG: u8 = 0x10;
/// Register the conversion result is read back from.
const READ_REGISTER: u8 = 0x00;

/// Reconstruct the signed 12-bit conversion from the raw register pair.
pub fn decode_reading(b0: u8, b1: u8) -> i16 {
    let raw = (((b0 & 0x0F) as i16) << 8) | b1 as i16;
    if raw > 2047 {
        raw - 4096
    } else {
        raw
    }
}

/// Producer body: samples at 1 Hz until the recording ends and returns
/// the number of captured readings.
pub fn run(duration: Duration, pair: &BufferPair) -> Result<u64> {
    tracing::info!("Sunglasses | initializing");

    let mut bus = LinuxI2CDevice::new(BUS, ADDRESS as u16)
        .with_context(|| format!("could not open I2C bus {BUS}"))?;
    bus.write(&[CONFIG])
        .context("could not configure the sunglasses ADC")?;
    bus.write(&[READ_REGISTER])
        .context("could not select the sunglasses read register")?;

    let mut cursor = FrameCursor::new(pair);
    tracing::info!("Sunglasses | recording");
    let start = Instant::now();
    while start.elapsed() < duration {
        let mut raw = [0u8; 2];
        bus.read(&mut raw)
            .context("could not read from the sunglasses ADC")?;

        let value = decode_reading(raw[0], raw[1]);
        cursor.append(&value.to_le_bytes())?;

        // High sample rates are pointless for a sunglasses position.
        std::thread::sleep(Duration::from_secs(1));
    }

    tracing::info!("Sunglasses | captured {} frames", cursor.frames());
    Ok(cursor.frames())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_extension_bounds() {
        assert_eq!(decode_reading(0x07, 0xFF), 2047);
        assert_eq!(decode_reading(0x08, 0x00), -2048);
    }

    #[test]
    fn test_small_values() {
        assert_eq!(decode_reading(0x00, 0x00), 0);
        assert_eq!(decode_reading(0x00, 0x01), 1);
        assert_eq!(decode_reading(0x0F, 0xFF), -1);
    }

    #[test]
    fn test_status_nibble_ignored() {
        // The top four bits of the first byte are not part of the sample.
        assert_eq!(decode_reading(0xF7, 0xFF), decode_reading(0x07, 0xFF));
        assert_eq!(decode_reading(0xA0, 0x10), decode_reading(0x00, 0x10));
    }

    #[test]
    fn test_storage_is_little_endian() {
        let bytes = decode_reading(0x08, 0x00).to_le_bytes();
        assert_eq!(bytes, [0x00, 0xF8]); // -2048
        let bytes = decode_reading(0x07, 0xFF).to_le_bytes();
        assert_eq!(bytes, [0xFF, 0x07]); // 2047
    }
}
