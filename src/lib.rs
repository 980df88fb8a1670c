//! On-device capture firmware for a wearable light logger.
//!
//! Four heterogeneous sensors record concurrently for the length of a
//! run: a spectrometer on a serial line, a high-rate raw Bayer world
//! camera, an MJPEG pupil camera and an I2C magnetometer. Each producer
//! fills one half of a double-buffer pair while the writer serializes
//! the other half into time-sliced chunk files, so a whole recording
//! streams to disk without the producers ever waiting on I/O.

pub mod agc;
pub mod buffer;
pub mod chunk;
pub mod config;
pub mod downsample;
pub mod minispect;
pub mod performance;
pub mod pupil;
pub mod sunglasses;
pub mod world;
