//! World camera producer: raw Bayer capture with closed-loop exposure.
//!
//! The sensor runs at 640x480 SRGGB8 and exactly 200 fps, with both auto
//! controls disabled so the gain and exposure applied to every request
//! come from our own feedback loop. Completed requests arrive on a
//! libcamera thread and are forwarded through a channel to this
//! producer's thread, which downsamples the frame straight into the
//! capture buffer, steps the controller and re-queues the request with
//! fresh controls.

use crate::agc::{self, AgcSettings};
use crate::buffer::{BufferPair, FrameCursor};
use crate::config::{
    WORLD_COLS, WORLD_DOWNSAMPLE_FACTOR, WORLD_FPS, WORLD_FRAME_BYTES, WORLD_ROWS,
};
use crate::downsample::downsample_bayer;
use anyhow::{bail, Context, Result};
use libcamera::{
    camera::CameraConfigurationStatus,
    camera_manager::CameraManager,
    controls::{AeEnable, AnalogueGain, AwbEnable, ExposureTime, FrameDurationLimits},
    framebuffer::AsFrameBuffer,
    framebuffer_allocator::{FrameBuffer, FrameBufferAllocator},
    framebuffer_map::MemoryMappedFrameBuffer,
    geometry::Size,
    pixel_format::PixelFormat,
    request::{Request, RequestStatus, ReuseFlag},
    stream::StreamRole,
};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// DRM fourcc for 8-bit RGGB Bayer.
const PIXEL_FORMAT_SRGGB8: PixelFormat =
    PixelFormat::new(u32::from_le_bytes([b'R', b'G', b'G', b'B']), 0);

/// Both frame-duration limits pin the sensor to exactly 200 fps.
const FRAME_DURATION_US: i64 = 1_000_000 / WORLD_FPS as i64;

/// How often the exposure controller runs.
const AGC_INTERVAL: Duration = Duration::from_millis(250);

fn apply_controls(request: &mut Request, settings: AgcSettings) -> Result<()> {
    let controls = request.controls_mut();
    controls.set(AeEnable(false))?;
    controls.set(AwbEnable(false))?;
    controls.set(AnalogueGain(settings.gain))?;
    controls.set(ExposureTime(settings.exposure_us))?;
    controls.set(FrameDurationLimits([FRAME_DURATION_US, FRAME_DURATION_US]))?;
    Ok(())
}

/// Producer body: captures for the whole recording and returns the
/// number of stored frames.
pub fn run(duration: Duration, pair: &BufferPair) -> Result<u64> {
    tracing::info!("World | initializing");

    let mgr = CameraManager::new().context("could not start the camera manager")?;
    let cameras = mgr.cameras();
    let cam = cameras.get(0).context("world camera not found")?;
    let mut active = cam
        .acquire()
        .context("could not acquire world camera (missing privileges?)")?;

    let mut cfgs = cam
        .generate_configuration(&[StreamRole::Raw])
        .context("world camera offers no raw stream")?;
    {
        let mut cfg = cfgs.get_mut(0).context("raw stream has no configuration")?;
        cfg.set_pixel_format(PIXEL_FORMAT_SRGGB8);
        cfg.set_size(Size {
            width: WORLD_COLS as u32,
            height: WORLD_ROWS as u32,
        });
    }
    match cfgs.validate() {
        CameraConfigurationStatus::Valid => {}
        CameraConfigurationStatus::Adjusted => {
            tracing::warn!("World | stream configuration adjusted: {:?}", cfgs);
        }
        CameraConfigurationStatus::Invalid => bail!("world camera rejected 640x480 SRGGB8"),
    }
    active
        .configure(&mut cfgs)
        .context("could not configure world camera")?;

    let cfg = cfgs.get(0).context("raw stream has no configuration")?;
    let stride = cfg.get_stride() as usize;
    let plane_len = WORLD_ROWS * stride;
    // The stored frame size was fixed at allocation time from the nominal
    // stride; a different negotiated stride would overrun the buffers.
    let frame_bytes =
        (WORLD_ROWS >> WORLD_DOWNSAMPLE_FACTOR) * (stride >> WORLD_DOWNSAMPLE_FACTOR);
    if frame_bytes != WORLD_FRAME_BYTES {
        bail!(
            "negotiated stride {stride} yields {frame_bytes}-byte frames, buffers were sized \
             for {WORLD_FRAME_BYTES}"
        );
    }
    let stream = cfg.stream().context("raw stream not attached")?;

    // Completed requests come back on a libcamera thread; a channel hands
    // them to this thread for the real work.
    let (tx, rx) = mpsc::channel();
    active.on_request_completed(move |request| {
        let _ = tx.send(request);
    });

    let mut alloc = FrameBufferAllocator::new(&cam);
    let buffers = alloc
        .alloc(&stream)
        .context("could not allocate frame buffers")?;
    tracing::debug!("World | allocated {} frame buffers", buffers.len());

    let mut settings = AgcSettings::initial();
    let mut requests = Vec::new();
    for buffer in buffers {
        let buffer = MemoryMappedFrameBuffer::new(buffer)
            .context("could not map frame buffer")?;
        let mut request = active
            .create_request(None)
            .context("could not create capture request")?;
        request
            .add_buffer(&stream, buffer)
            .context("could not attach buffer to request")?;
        apply_controls(&mut request, settings)?;
        requests.push(request);
    }

    active.start(None).context("could not start world stream")?;
    for request in requests {
        active.queue_request(request)?;
    }
    tracing::info!("World | recording");

    let mut cursor = FrameCursor::new(pair);
    let mut last_agc = Instant::now();
    let mut last_sequence: Option<u32> = None;
    let start = Instant::now();

    while start.elapsed() < duration {
        let mut request = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(request) => request,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => bail!("world stream ended early"),
        };
        // Cancelled requests surface during shutdown and are not re-queued.
        if request.status() == RequestStatus::Cancelled {
            continue;
        }

        consume_frame(
            &request,
            &stream,
            stride,
            plane_len,
            &mut cursor,
            &mut settings,
            &mut last_agc,
            &mut last_sequence,
        )?;

        request.reuse(ReuseFlag::REUSE_BUFFERS);
        apply_controls(&mut request, settings)?;
        active.queue_request(request)?;
    }

    let frames = cursor.frames();
    tracing::info!("World | captured {} frames", frames);
    if let Err(e) = active.stop() {
        tracing::warn!("World | error stopping stream: {e}");
    }
    Ok(frames)
}

/// Store one completed frame. Per-frame faults (bad metadata, short
/// plane) are logged and skipped; only a capture-buffer fault is fatal.
#[allow(clippy::too_many_arguments)]
fn consume_frame(
    request: &Request,
    stream: &libcamera::stream::Stream,
    stride: usize,
    plane_len: usize,
    cursor: &mut FrameCursor<'_>,
    settings: &mut AgcSettings,
    last_agc: &mut Instant,
    last_sequence: &mut Option<u32>,
) -> Result<()> {
    let framebuffer: &MemoryMappedFrameBuffer<FrameBuffer> = request
        .buffer(stream)
        .context("completed request carries no buffer")?;

    let metadata = framebuffer
        .metadata()
        .context("completed buffer carries no metadata")?;
    if metadata.status() != libcamera::framebuffer::FrameMetadataStatus::Success {
        tracing::warn!("World | frame unsuccessful: {:?}", metadata.status());
        return Ok(());
    }

    // Gaps in the sequence counter are frames the driver dropped.
    let sequence = metadata.sequence();
    if let Some(previous) = *last_sequence {
        let gap = sequence.wrapping_sub(previous);
        if gap > 1 {
            tracing::warn!("World | dropped {} frames", gap - 1);
        }
    }
    *last_sequence = Some(sequence);

    let planes = framebuffer.data();
    let plane = planes.first().copied().context("raw frame has no plane")?;
    if plane.len() != plane_len {
        tracing::warn!(
            "World | plane is {} bytes, expected {}",
            plane.len(),
            plane_len
        );
        return Ok(());
    }

    // The stride check at startup guarantees this is the size one stored
    // frame was allocated for.
    let dst = cursor.frame_mut(WORLD_FRAME_BYTES)?;
    downsample_bayer(plane, WORLD_ROWS, stride, WORLD_DOWNSAMPLE_FACTOR, dst)?;

    if last_agc.elapsed() >= AGC_INTERVAL {
        let sum: u64 = plane.iter().map(|&b| b as u64).sum();
        let mean = sum as f64 / plane.len() as f64;
        *settings = agc::adjust(*settings, mean, agc::SPEED);
        *last_agc = Instant::now();
    }
    Ok(())
}
