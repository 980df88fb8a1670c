//! Pupil camera producer: a UVC eye camera streaming MJPEG.
//!
//! The camera compresses on-board, so frame sizes on the wire vary; the
//! producer decodes every frame back to 8-bit grayscale so the capture
//! buffer stays fixed-stride. Frames arrive on a USB-driver thread and
//! are handed to the producer thread through a bounded channel, keeping
//! the decode work off the driver's callback.

use crate::buffer::{BufferPair, FrameCursor};
use crate::config::{PUPIL_COLS, PUPIL_FPS, PUPIL_FRAME_BYTES, PUPIL_ROWS};
use anyhow::{bail, Context, Result};
use image::ImageReader;
use std::io::Cursor;
use std::sync::mpsc;
use std::time::{Duration, Instant};

pub const VENDOR_ID: i32 = 0x0C45;
pub const PRODUCT_ID: i32 = 0x64AB;

/// Frames the USB thread may buffer ahead of the decoder.
const FRAME_QUEUE: usize = 8;

/// Decode one MJPEG frame to tightly packed 8-bit grayscale.
pub fn decode_grayscale(jpeg: &[u8]) -> Result<Vec<u8>> {
    let img = ImageReader::with_format(Cursor::new(jpeg), image::ImageFormat::Jpeg)
        .decode()
        .context("MJPEG decode failed")?;
    Ok(img.into_luma8().into_raw())
}

/// Producer body: streams for the whole recording and returns the number
/// of captured frames.
pub fn run(duration: Duration, pair: &BufferPair) -> Result<u64> {
    tracing::info!("Pupil | initializing");

    let ctx = uvc::Context::new().context("could not initialize UVC")?;
    let dev = ctx
        .find_device(Some(VENDOR_ID), Some(PRODUCT_ID), None)
        .with_context(|| {
            format!("pupil camera {VENDOR_ID:04x}:{PRODUCT_ID:04x} not found")
        })?;
    let devh = dev.open().context("could not open pupil camera")?;

    let format = uvc::StreamFormat {
        width: PUPIL_COLS as u32,
        height: PUPIL_ROWS as u32,
        fps: PUPIL_FPS,
        format: uvc::FrameFormat::MJPEG,
    };
    let mut streamh = devh
        .get_stream_handle_with_format(format)
        .context("pupil camera does not support 400x400 MJPEG at 120 fps")?;

    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(FRAME_QUEUE);
    tracing::info!("Pupil | recording");
    let stream = streamh
        .start_stream(
            |frame, tx: &mut mpsc::SyncSender<Vec<u8>>| {
                // A full queue means the decoder has fallen a whole queue
                // behind; dropping here is the only non-blocking option.
                let _ = tx.try_send(frame.to_bytes().to_vec());
            },
            tx,
        )
        .context("could not start pupil stream")?;

    let mut cursor = FrameCursor::new(pair);
    let start = Instant::now();
    while start.elapsed() < duration {
        let jpeg = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(jpeg) => jpeg,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => bail!("pupil stream ended early"),
        };

        let gray = match decode_grayscale(&jpeg) {
            Ok(gray) => gray,
            Err(e) => {
                tracing::warn!("Pupil | dropping undecodable frame: {e:#}");
                continue;
            }
        };
        if gray.len() != PUPIL_FRAME_BYTES {
            bail!(
                "decoded pupil frame is {} bytes, expected {}",
                gray.len(),
                PUPIL_FRAME_BYTES
            );
        }
        cursor.append(&gray)?;
    }

    stream.stop();
    tracing::info!("Pupil | captured {} frames", cursor.frames());
    Ok(cursor.frames())
}
