//! Time-sliced chunk files and the writer thread.
//!
//! The writer serializes every sensor's inactive buffer into a numbered
//! `chunk_<n>.bin` file once per buffer window, trailing the producers'
//! fill schedule by a fixed grace period so it never touches a buffer
//! that is still being filled. Chunk `n` drains the first slot of every
//! pair when `n` is odd and the second when `n` is even, mirroring the
//! producers' own swap parity.
//!
//! Each file is a little-endian archive: a u64 element count (always 4),
//! then for each sensor slot a u64 byte length followed by the payload.
//! Disabled sensors contribute zero-length slots.

use crate::buffer::BufferPair;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seconds the flush schedule trails the fill schedule, giving producers
/// room to finish the final frame of a window.
pub const FLUSH_GRACE_S: u64 = 2;

/// Poll interval of the writer loop, far below the buffer window.
const TICK: Duration = Duration::from_millis(100);

/// Serialize the four sensor slots as one length-prefixed archive.
pub fn write_archive<W: Write>(out: &mut W, slots: [&[u8]; 4]) -> Result<()> {
    out.write_all(&(slots.len() as u64).to_le_bytes())?;
    for slot in slots {
        out.write_all(&(slot.len() as u64).to_le_bytes())?;
        out.write_all(slot)?;
    }
    Ok(())
}

/// What the writer loop should do on a given poll tick.
#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    /// Create the file for the named chunk.
    OpenChunk(u32),
    /// Serialize the parity-selected slot into the open file and close it.
    Flush { chunk: u32, slot: usize },
    Idle,
}

/// Pure decision core of the writer: tracks the chunk counter, the
/// open-file state and the flush timer, leaving all I/O and clocks to
/// the caller.
pub struct WriterSchedule {
    flush_after: Duration,
    chunk: u32,
    file_open: bool,
}

impl WriterSchedule {
    pub fn new(window_s: u64) -> Self {
        Self {
            flush_after: Duration::from_secs(window_s + FLUSH_GRACE_S),
            chunk: 1,
            file_open: false,
        }
    }

    /// The buffer slot chunk `n` drains: odd chunks the first, even
    /// chunks the second.
    fn slot(chunk: u32) -> usize {
        ((chunk + 1) % 2) as usize
    }

    pub fn tick(&mut self, since_last_flush: Duration) -> Tick {
        if since_last_flush >= self.flush_after {
            let tick = Tick::Flush {
                chunk: self.chunk,
                slot: Self::slot(self.chunk),
            };
            self.chunk += 1;
            self.file_open = false;
            return tick;
        }
        if !self.file_open {
            self.file_open = true;
            return Tick::OpenChunk(self.chunk);
        }
        Tick::Idle
    }

    /// The single trailing flush after the poll loop exits: the buffer
    /// that was still being filled at shutdown, into a file that may or
    /// may not have been opened yet.
    pub fn finish(&self) -> (bool, u32, usize) {
        (!self.file_open, self.chunk, Self::slot(self.chunk))
    }
}

fn open_chunk(dir: &Path, chunk: u32) -> Result<BufWriter<File>> {
    let path = dir.join(format!("chunk_{chunk}.bin"));
    let file = File::create(&path)
        .with_context(|| format!("could not open chunk file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_chunk(
    out: &mut BufWriter<File>,
    pairs: &[Arc<BufferPair>; 4],
    slot: usize,
    chunk: u32,
) -> Result<()> {
    let started = Instant::now();
    let guards: Vec<_> = pairs.iter().map(|pair| pair.lock(slot)).collect();
    write_archive(
        out,
        [&guards[0][..], &guards[1][..], &guards[2][..], &guards[3][..]],
    )?;
    drop(guards);
    out.flush()
        .with_context(|| format!("short write on chunk {chunk}"))?;
    tracing::info!(
        "Write | chunk {} written in {} ms",
        chunk,
        started.elapsed().as_millis()
    );
    Ok(())
}

/// Writer thread body: poll until the recording ends, then perform the
/// trailing flush of the window in flight.
pub fn run(
    output_dir: &Path,
    duration: Duration,
    window_s: u64,
    pairs: &[Arc<BufferPair>; 4],
) -> Result<()> {
    tracing::info!("Write | initialized");
    let start = Instant::now();
    let mut last_flush = start;
    let mut schedule = WriterSchedule::new(window_s);
    let mut file: Option<BufWriter<File>> = None;

    while start.elapsed() < duration {
        match schedule.tick(last_flush.elapsed()) {
            Tick::OpenChunk(chunk) => file = Some(open_chunk(output_dir, chunk)?),
            Tick::Flush { chunk, slot } => {
                let mut out = file
                    .take()
                    .context("flush fired before the chunk file was opened")?;
                write_chunk(&mut out, pairs, slot, chunk)?;
                last_flush = Instant::now();
            }
            Tick::Idle => std::thread::sleep(TICK),
        }
    }

    let (needs_open, chunk, slot) = schedule.finish();
    let mut out = match (needs_open, file.take()) {
        (false, Some(out)) => out,
        _ => open_chunk(output_dir, chunk)?,
    };
    write_chunk(&mut out, pairs, slot, chunk)?;
    tracing::info!("Write | closed after {} chunks", chunk);
    Ok(())
}
