//! Video pump: owns the capture and encoder devices for one session and
//! drives frames from HDMI capture through hardware encode to the
//! broadcast hub.
//!
//! Runs as the sole blocking thread that touches the V4L2 devices or
//! their bound DMABUF fds after initialization, per the single-threaded
//! pump model: no cooperative runtime, just a loop of blocking ioctls.

use std::{
    path::Path,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
    thread,
    time::Duration,
};

use kvmd_broadcast::Hub;
use kvmd_capture::Capture;
use kvmd_dmaheap::{DmaBuffer, DmaHeap};
use kvmd_encoder::{Encoder, Params};

use crate::config::Config;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);
const ENCODER_TIMEOUT: Duration = Duration::from_secs(5);
const CAPTURE_TIMEOUTS_BEFORE_RECOVERY: u32 = 3;
const RECOVERY_SLEEP: Duration = Duration::from_secs(2);

/// The appliance's input format, matching what the HDMI bridge and the
/// M2M encoder's OUTPUT queue agree on.
const INPUT_FOURCC: u32 = v4l2_sys::V4L2_PIX_FMT_NV12;

/// Errors that can end a session outright (vs. looping back to
/// probing).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DMA-BUF heap allocation failed.
    #[error(transparent)]
    DmaHeap(#[from] kvmd_dmaheap::Error),
    /// Capture device initialization, or a non-timeout capture error.
    #[error(transparent)]
    Capture(#[from] kvmd_capture::Error),
    /// Encoder device initialization failed.
    #[error(transparent)]
    Encoder(#[from] kvmd_encoder::Error),
}

/// Runs sessions forever: Probing -> Running -> (Recovering -> Probing)*,
/// until a fatal error on the first session, or `shutdown` is observed.
///
/// On the first session, any initialization failure propagates to the
/// caller as fatal. On later sessions the same failure instead logs and
/// loops back through a recovery sleep.
pub fn run(config: &Config, hub: Arc<Hub>, shutdown: &AtomicBool) -> Result<(), Error> {
    let mut first_session = true;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        match probe_and_run(config, &hub, shutdown) {
            Ok(()) => {}
            Err(err) if first_session => return Err(err),
            Err(err) => log::warn!("session failed, recovering: {err}"),
        }
        first_session = false;

        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }
        log::info!("recovering: sleeping {RECOVERY_SLEEP:?} before re-probing");
        thread::sleep(RECOVERY_SLEEP);
    }
}

fn probe_and_run(config: &Config, hub: &Hub, shutdown: &AtomicBool) -> Result<(), Error> {
    let (dmabufs, mut capture, mut encoder) = probe(
        &config.device,
        &config.encoder,
        config.bitrate,
        config.gop_size,
        config.dmabuf_count,
    )?;
    log::info!("session probed: {} DMABUFs, format {:?}", dmabufs.len(), capture.format());

    let fds: Vec<_> = dmabufs.iter().map(DmaBuffer::fd).collect();
    pump(&mut capture, &mut encoder, &fds, hub, shutdown);

    drain(capture, encoder, dmabufs);
    Ok(())
}

fn probe(
    device: &Path,
    encoder_device: &Path,
    bitrate: u32,
    gop_size: u32,
    dmabuf_count: u32,
) -> Result<(Vec<DmaBuffer>, Capture, Encoder), Error> {
    let format = Capture::query_format(device, INPUT_FOURCC)?;

    let heap = DmaHeap::open(kvmd_dmaheap::DEFAULT_HEAP)?;
    let dmabufs: Vec<DmaBuffer> =
        (0..dmabuf_count).map(|_| heap.alloc(format.size_image as usize)).collect::<Result<_, _>>()?;
    let fds: Vec<_> = dmabufs.iter().map(DmaBuffer::fd).collect();

    let params = Params {
        width: format.width,
        height: format.height,
        input_fourcc: format.pixel_format,
        bytes_per_line: format.bytes_per_line,
        size_image: format.size_image,
        bitrate,
        gop_size,
    };
    // Order between encoder and capture init doesn't matter; both bind
    // independently to the same DMABUF fds before either streams.
    let encoder = Encoder::init(encoder_device, params, &fds)?;
    let capture = Capture::init(device, format.pixel_format, &fds)?;

    Ok((dmabufs, capture, encoder))
}

/// Runs the blocking pump loop until a non-timeout capture error, three
/// consecutive capture timeouts, or `shutdown` is observed.
///
/// Every DMABUF index is, at any instant, either queued on the capture
/// device, queued on the encoder's OUTPUT queue, or about to be
/// requeued in the lines below — it is never left idle in user space
/// across loop iterations.
fn pump(capture: &mut Capture, encoder: &mut Encoder, fds: &[std::os::raw::c_int], hub: &Hub, shutdown: &AtomicBool) {
    let mut consecutive_timeouts = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        let dequeued = match capture.dequeue(CAPTURE_TIMEOUT) {
            Ok(dequeued) => {
                consecutive_timeouts = 0;
                dequeued
            }
            Err(kvmd_capture::Error::Timeout) => {
                consecutive_timeouts += 1;
                if consecutive_timeouts >= CAPTURE_TIMEOUTS_BEFORE_RECOVERY {
                    log::warn!("{CAPTURE_TIMEOUTS_BEFORE_RECOVERY} consecutive capture timeouts, ending session");
                    return;
                }
                continue;
            }
            Err(err) => {
                log::warn!("capture error, ending session: {err}");
                return;
            }
        };

        match encoder.encode(dequeued.index, dequeued.bytesused, ENCODER_TIMEOUT) {
            Ok((encoded, reclaimed)) => {
                hub.broadcast(encoded);
                if let Some(index) = reclaimed {
                    if let Err(err) = capture.queue(index, fds[index as usize]) {
                        log::warn!("failed to requeue reclaimed capture slot {index}: {err}");
                    }
                }
            }
            Err(err) => {
                log::warn!("encode error, returning capture slot: {err}");
                if let Err(err) = capture.queue(dequeued.index, fds[dequeued.index as usize]) {
                    log::warn!("failed to return capture slot {}: {err}", dequeued.index);
                }
            }
        }
    }
}

fn drain(capture: Capture, encoder: Encoder, dmabufs: Vec<DmaBuffer>) {
    log::info!("draining session");
    drop(encoder);
    drop(capture);
    drop(dmabufs);
}
