//! Double-buffer pairs shared between one producer and the writer.
//!
//! Each sensor owns a pair of fixed-size byte buffers. The producer fills
//! one while the writer serializes the other; ownership alternates once
//! per buffer window. The schedule alone keeps the two sides apart (the
//! writer trails the producer by a grace period), but the hand-off is made
//! memory-safe with one mutex per slot. The producer acquires a slot's
//! lock once per window at swap time and holds it while filling, so the
//! capture path itself never takes a lock per frame.

use anyhow::{bail, Result};
use std::sync::{Mutex, MutexGuard};

/// A pair of equally sized byte buffers, allocated once and never resized.
pub struct BufferPair {
    slots: [Mutex<Vec<u8>>; 2],
}

impl BufferPair {
    /// Allocate both slots at `len` bytes, zero-initialized.
    pub fn new(len: usize) -> Self {
        Self {
            slots: [Mutex::new(vec![0; len]), Mutex::new(vec![0; len])],
        }
    }

    /// A pair for a disabled sensor; both slots serialize as zero-length.
    pub fn empty() -> Self {
        Self::new(0)
    }

    pub fn lock(&self, slot: usize) -> MutexGuard<'_, Vec<u8>> {
        self.slots[slot].lock().unwrap()
    }
}

/// Producer-side view of a [`BufferPair`], enforcing the append protocol
/// shared by all four producers: swap when the active buffer is exactly
/// full, fail loudly if a frame would ever straddle the end.
pub struct FrameCursor<'a> {
    pair: &'a BufferPair,
    guard: MutexGuard<'a, Vec<u8>>,
    active: usize,
    offset: usize,
    frames: u64,
}

impl<'a> FrameCursor<'a> {
    /// Take ownership of the first slot and start appending at offset 0.
    pub fn new(pair: &'a BufferPair) -> Self {
        Self {
            pair,
            guard: pair.lock(0),
            active: 0,
            offset: 0,
            frames: 0,
        }
    }

    /// Hand out the next `len`-byte window of the active buffer and count
    /// it as one captured frame.
    ///
    /// Swaps to the other slot first when the active buffer is full. A
    /// frame that would overrun the buffer is an error: buffers are sized
    /// for a whole number of frames, so an overrun means the caller's
    /// frame size disagrees with the allocation.
    pub fn frame_mut(&mut self, len: usize) -> Result<&mut [u8]> {
        if self.offset == self.guard.len() {
            self.active ^= 1;
            self.guard = self.pair.lock(self.active);
            self.offset = 0;
        }
        if self.offset + len > self.guard.len() {
            bail!(
                "buffer overrun: frame of {} bytes at offset {} in a {}-byte buffer",
                len,
                self.offset,
                self.guard.len()
            );
        }
        let start = self.offset;
        self.offset += len;
        self.frames += 1;
        Ok(&mut self.guard[start..start + len])
    }

    /// Copy a complete frame into the buffer.
    pub fn append(&mut self, frame: &[u8]) -> Result<()> {
        self.frame_mut(frame.len())?.copy_from_slice(frame);
        Ok(())
    }

    /// Frames appended since the cursor was created.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Current write offset into the active buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }
}
