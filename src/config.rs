//! Run configuration and per-sensor capture descriptors.
//!
//! Every buffer capacity in the firmware derives from the constants here: a
//! sensor's buffer holds exactly [`BUFFER_WINDOW_S`] seconds of frames at
//! its nominal rate, and the writer's flush cadence is phase-locked to the
//! same window.

use std::path::PathBuf;

/// Seconds of data each buffer of a double-buffer pair holds.
pub const BUFFER_WINDOW_S: u64 = 10;

/// Payload bytes of one spectrometer packet (delimiters excluded).
pub const MS_PAYLOAD_BYTES: usize = 148;
/// Nominal spectrometer packet rate.
pub const MS_FPS: u32 = 1;

/// World camera sensor geometry: 640x480 raw 8-bit Bayer.
pub const WORLD_COLS: usize = 640;
pub const WORLD_ROWS: usize = 480;
pub const WORLD_FPS: u32 = 200;
/// Power-of-two downsample applied to every world frame (3 = 8x8 pooling).
pub const WORLD_DOWNSAMPLE_FACTOR: u32 = 3;
/// Row stride the driver negotiates for the 640-wide raw mode. The plane
/// is consumed as a `rows x stride` byte grid; the runtime re-derives this
/// from the validated stream configuration and refuses to start on a
/// mismatch, because the buffers below are sized from it.
pub const WORLD_NOMINAL_STRIDE: usize = WORLD_COLS * 2;
/// Bytes of one world frame as stored, after downsampling.
pub const WORLD_FRAME_BYTES: usize = (WORLD_ROWS >> WORLD_DOWNSAMPLE_FACTOR)
    * (WORLD_NOMINAL_STRIDE >> WORLD_DOWNSAMPLE_FACTOR);

/// Pupil camera geometry: 400x400 MJPEG decoded to 8-bit grayscale.
pub const PUPIL_COLS: usize = 400;
pub const PUPIL_ROWS: usize = 400;
pub const PUPIL_FPS: u32 = 120;
/// Bytes of one pupil frame as stored (grayscale, one byte per pixel).
pub const PUPIL_FRAME_BYTES: usize = PUPIL_ROWS * PUPIL_COLS;

/// Bytes of one sunglasses reading: a signed 12-bit sample stored as two
/// little-endian bytes.
pub const SUNGLASSES_READING_BYTES: usize = 2;
pub const SUNGLASSES_FPS: u32 = 1;

/// One of the four capture sources.
///
/// The discriminant doubles as the sensor's slot index in the chunk
/// archive and in the buffer arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sensor {
    Minispect = 0,
    World = 1,
    Pupil = 2,
    Sunglasses = 3,
}

impl Sensor {
    pub const ALL: [Sensor; 4] = [
        Sensor::Minispect,
        Sensor::World,
        Sensor::Pupil,
        Sensor::Sunglasses,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// One-character tag used in logs and the performance record.
    pub fn tag(self) -> char {
        match self {
            Sensor::Minispect => 'M',
            Sensor::World => 'W',
            Sensor::Pupil => 'P',
            Sensor::Sunglasses => 'S',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Sensor::Minispect => "MS",
            Sensor::World => "World",
            Sensor::Pupil => "Pupil",
            Sensor::Sunglasses => "Sunglasses",
        }
    }

    /// Nominal frame rate in Hz.
    pub fn fps(self) -> u32 {
        match self {
            Sensor::Minispect => MS_FPS,
            Sensor::World => WORLD_FPS,
            Sensor::Pupil => PUPIL_FPS,
            Sensor::Sunglasses => SUNGLASSES_FPS,
        }
    }

    /// Bytes one frame occupies in the capture buffer, after any
    /// in-producer transformation (downsample, JPEG decode, byte split).
    pub fn frame_bytes(self) -> usize {
        match self {
            Sensor::Minispect => MS_PAYLOAD_BYTES,
            Sensor::World => WORLD_FRAME_BYTES,
            Sensor::Pupil => PUPIL_FRAME_BYTES,
            Sensor::Sunglasses => SUNGLASSES_READING_BYTES,
        }
    }

    /// Capacity of one buffer of this sensor's pair.
    pub fn bytes_per_window(self) -> usize {
        BUFFER_WINDOW_S as usize * self.fps() as usize * self.frame_bytes()
    }
}

/// Immutable per-run settings, fixed before any thread is spawned.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    /// Recording length in whole seconds, 1..=86400.
    pub duration_s: u64,
    /// Enable flag per sensor, indexed by [`Sensor::index`].
    pub enabled: [bool; 4],
}

impl RunConfig {
    pub fn enabled_sensors(&self) -> impl Iterator<Item = Sensor> + '_ {
        Sensor::ALL
            .into_iter()
            .filter(|s| self.enabled[s.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sizing() {
        // One window holds exactly fps * frame_bytes * window seconds.
        assert_eq!(Sensor::Minispect.bytes_per_window(), 10 * 1 * 148);
        assert_eq!(Sensor::World.bytes_per_window(), 10 * 200 * 9600);
        assert_eq!(Sensor::Pupil.bytes_per_window(), 10 * 120 * 160_000);
        assert_eq!(Sensor::Sunglasses.bytes_per_window(), 10 * 1 * 2);
    }

    #[test]
    fn test_world_frame_bytes_follow_stride() {
        // 480x1280 plane pooled 8x8 stores 60x160 bytes per frame.
        assert_eq!(WORLD_FRAME_BYTES, 60 * 160);
    }

    #[test]
    fn test_enabled_sensor_iteration() {
        let config = RunConfig {
            output_dir: PathBuf::from("/tmp/run"),
            duration_s: 30,
            enabled: [true, false, false, true],
        };
        let enabled: Vec<Sensor> = config.enabled_sensors().collect();
        assert_eq!(enabled, vec![Sensor::Minispect, Sensor::Sunglasses]);
    }
}
