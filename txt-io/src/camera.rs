//! Camera frame receiver
//!
//! The camera streams over its own connection once started with the
//! session command. A dedicated thread reads header + JPEG payload,
//! acknowledges each frame and keeps only the newest one:
//!
//! ```text
//! device ──header(20)──payload(n)──▶ receiver ──ack──▶ device
//!                                       │
//!                                       ▼ force_push
//!                               ArrayQueue (capacity 1) ──▶ take_frame()
//! ```
//!
//! Image bytes are opaque here; decoding is left to the application.

use crate::constants::{CAMERA_HEADER_SIZE, MAX_CAMERA_FRAME_SIZE};
use crate::error::{Error, Result};
use crate::exchange::ErrorCallback;
use crate::protocol::camera::{encode_frame_ack, FrameHeader};
use crate::transport::{read_frame, write_all, Connector, Transport};
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One received camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrame {
    pub frames_ready: i32,
    pub width: i16,
    pub height: i16,
    pub raw_size: i32,
    /// Encoded image (JPEG)
    pub data: Vec<u8>,
}

/// Connection retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

/// Handle to the camera receiver thread
pub struct CameraReceiver {
    shutdown: Arc<AtomicBool>,
    latest: Arc<ArrayQueue<CameraFrame>>,
    handle: Option<JoinHandle<()>>,
}

impl CameraReceiver {
    /// Spawn the receiver; `connector` is retried per `retry` until it succeeds
    pub fn spawn(connector: Connector, retry: RetryPolicy, on_error: ErrorCallback) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(ArrayQueue::new(1));

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_latest = Arc::clone(&latest);
        let handle = thread::Builder::new()
            .name("txt-camera".to_string())
            .spawn(move || {
                receiver_loop(connector, retry, &thread_shutdown, &thread_latest, &on_error);
                thread_shutdown.store(true, Ordering::Relaxed);
            })
            .map_err(|e| Error::Other(format!("Failed to spawn camera thread: {}", e)))?;

        Ok(Self {
            shutdown,
            latest,
            handle: Some(handle),
        })
    }

    /// Newest frame not yet taken, if any
    pub fn take_frame(&self) -> Option<CameraFrame> {
        self.latest.pop()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        Ok(())
    }
}

impl Drop for CameraReceiver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Camera receiver did not stop cleanly: {}", e);
        }
    }
}

fn connect(
    connector: &mut Connector,
    retry: RetryPolicy,
    shutdown: &AtomicBool,
) -> Option<Box<dyn Transport>> {
    for attempt in 1..=retry.attempts {
        thread::sleep(retry.interval);
        if shutdown.load(Ordering::Relaxed) {
            return None;
        }
        match connector() {
            Ok(io) => {
                log::info!("Camera connected after {} attempt(s)", attempt);
                return Some(io);
            }
            Err(e) => log::trace!("Camera connect attempt {} failed: {}", attempt, e),
        }
    }
    None
}

fn receiver_loop(
    mut connector: Connector,
    retry: RetryPolicy,
    shutdown: &AtomicBool,
    latest: &ArrayQueue<CameraFrame>,
    on_error: &ErrorCallback,
) {
    let Some(mut io) = connect(&mut connector, retry, shutdown) else {
        if !shutdown.load(Ordering::Relaxed) {
            on_error("Camera not connected", None);
        }
        return;
    };

    while !shutdown.load(Ordering::Relaxed) {
        match receive_frame(&mut *io) {
            Ok(Some(frame)) => {
                log::trace!(
                    "Camera frame {}x{}, {} bytes",
                    frame.width,
                    frame.height,
                    frame.data.len()
                );
                // Only the newest frame is kept
                latest.force_push(frame);
            }
            Ok(None) => thread::sleep(retry.interval),
            Err(e) => {
                on_error("Connection to camera lost", Some(&e));
                break;
            }
        }
    }
    log::info!("Camera receiver stopped");
}

/// Read one frame and acknowledge it. `Ok(None)` when nothing arrived.
fn receive_frame(io: &mut dyn Transport) -> Result<Option<CameraFrame>> {
    let head = read_frame(io, CAMERA_HEADER_SIZE)?;
    if head.is_empty() {
        return Ok(None);
    }
    let header = FrameHeader::decode(&head)?;
    if !header.id_matches() {
        log::warn!("Camera frame id {:#010x} does not match", header.id);
    }

    let size = usize::try_from(header.compressed_size)
        .ok()
        .filter(|n| *n <= MAX_CAMERA_FRAME_SIZE)
        .ok_or_else(|| {
            Error::Other(format!("invalid camera frame size {}", header.compressed_size))
        })?;
    let data = read_frame(io, size)?;
    if data.len() != size {
        return Err(Error::ShortRead {
            expected: size,
            actual: data.len(),
        });
    }
    write_all(io, &encode_frame_ack())?;

    Ok(Some(CameraFrame {
        frames_ready: header.frames_ready,
        width: header.width,
        height: header.height,
        raw_size: header.raw_size,
        data,
    }))
}
