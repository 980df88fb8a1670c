//! Spectrometer (MS) producer: framed packets over a serial line.
//!
//! The MS streams one 148-byte reading per second, framed as `<` +
//! payload + `>`. The producer scans byte-by-byte for the start
//! delimiter, so inter-frame noise and partial packets at connect time
//! are skipped; a missing end delimiter means the stream lost framing
//! and is fatal.

use crate::buffer::{BufferPair, FrameCursor};
use crate::config::MS_PAYLOAD_BYTES;
use anyhow::{bail, Context, Result};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialPortBuilderExt;

pub const DEVICE: &str = "/dev/ttyACM0";
pub const BAUD: u32 = 115_200;

const START_DELIM: u8 = b'<';
const END_DELIM: u8 = b'>';

/// Read the next framed packet, skipping anything before the start
/// delimiter and insisting on the end delimiter after the payload.
pub async fn read_packet<R: AsyncRead + Unpin>(port: &mut R) -> Result<[u8; MS_PAYLOAD_BYTES]> {
    let mut byte = [0u8; 1];
    loop {
        port.read_exact(&mut byte).await?;
        if byte[0] != START_DELIM {
            continue;
        }

        let mut payload = [0u8; MS_PAYLOAD_BYTES];
        port.read_exact(&mut payload).await?;

        port.read_exact(&mut byte).await?;
        if byte[0] != END_DELIM {
            bail!(
                "MS packet not closed by end delimiter (got 0x{:02X})",
                byte[0]
            );
        }
        return Ok(payload);
    }
}

/// Producer body: runs on its own thread for the whole recording and
/// returns the number of captured packets.
pub fn run(duration: Duration, pair: &BufferPair) -> Result<u64> {
    tracing::info!("MS | initializing");

    // The serial stack is async; a single-threaded runtime on this
    // producer's thread drives it, the same way the serial bridge does.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("could not build MS runtime")?;

    rt.block_on(async {
        let mut port = tokio_serial::new(DEVICE, BAUD)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| format!("could not open MS serial line at {DEVICE}"))?;

        let mut cursor = FrameCursor::new(pair);
        tracing::info!("MS | recording");
        let start = Instant::now();
        while start.elapsed() < duration {
            let payload = read_packet(&mut port).await?;
            cursor.append(&payload)?;
        }

        tracing::info!("MS | captured {} frames", cursor.frames());
        Ok(cursor.frames())
        // The port closes when it drops, on success and error alike.
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(fill: u8) -> Vec<u8> {
        let mut bytes = vec![START_DELIM];
        bytes.extend_from_slice(&[fill; MS_PAYLOAD_BYTES]);
        bytes.push(END_DELIM);
        bytes
    }

    #[tokio::test]
    async fn test_packets_extracted_in_order_through_noise() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"boot noise");
        stream.extend_from_slice(&packet(0x11));
        stream.extend_from_slice(&[0x00, 0xFF, 0x42]);
        stream.extend_from_slice(&packet(0x22));

        let mut reader = &stream[..];
        let first = read_packet(&mut reader).await.unwrap();
        assert_eq!(first, [0x11; MS_PAYLOAD_BYTES]);
        let second = read_packet(&mut reader).await.unwrap();
        assert_eq!(second, [0x22; MS_PAYLOAD_BYTES]);
    }

    #[tokio::test]
    async fn test_payload_bytes_may_contain_delimiters() {
        // A payload full of '<' and '>' must not confuse the scanner.
        let mut stream = vec![START_DELIM];
        stream.extend_from_slice(&[b'<'; MS_PAYLOAD_BYTES / 2]);
        stream.extend_from_slice(&[b'>'; MS_PAYLOAD_BYTES - MS_PAYLOAD_BYTES / 2]);
        stream.push(END_DELIM);

        let mut reader = &stream[..];
        let payload = read_packet(&mut reader).await.unwrap();
        assert_eq!(payload[0], b'<');
        assert_eq!(payload[MS_PAYLOAD_BYTES - 1], b'>');
    }

    #[tokio::test]
    async fn test_wrong_end_delimiter_is_fatal() {
        let mut stream = vec![START_DELIM];
        stream.extend_from_slice(&[0u8; MS_PAYLOAD_BYTES]);
        stream.push(0x00);

        let mut reader = &stream[..];
        let err = read_packet(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("end delimiter"));
    }

    #[tokio::test]
    async fn test_truncated_stream_errors() {
        let mut stream = vec![START_DELIM];
        stream.extend_from_slice(&[0u8; 10]);

        let mut reader = &stream[..];
        assert!(read_packet(&mut reader).await.is_err());
    }
}
