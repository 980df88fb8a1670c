//! Per-run capture performance record.
//!
//! Offline analysis compares each sensor's captured-frame count against
//! its nominal rate to judge whether the recording kept up.

use crate::config::Sensor;
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug)]
pub struct PerformanceRecord {
    pub duration_s: u64,
    /// Captured frames per sensor, indexed by [`Sensor::index`].
    pub frames: [u64; 4],
}

impl PerformanceRecord {
    pub fn new(duration_s: u64) -> Self {
        Self {
            duration_s,
            frames: [0; 4],
        }
    }

    pub fn set_frames(&mut self, sensor: Sensor, frames: u64) {
        self.frames[sensor.index()] = frames;
    }

    fn to_csv(&self) -> String {
        format!(
            "duration,M_frames,W_frames,P_frames,S_frames\n{},{},{},{},{}\n",
            self.duration_s, self.frames[0], self.frames[1], self.frames[2], self.frames[3]
        )
    }

    pub fn write_csv(&self, output_dir: &Path) -> Result<()> {
        let path = output_dir.join("performance.csv");
        std::fs::write(&path, self.to_csv())
            .with_context(|| format!("could not write {}", path.display()))
    }
}
