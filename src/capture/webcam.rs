//! Webcam capture using nokhwa
//!
//! The camera is opened on a dedicated thread that decodes frames to RGBA
//! and broadcasts them. Both the live preview and the encoding session
//! subscribe to the same broadcast; neither mutates the stream.

use super::{devices, CaptureError};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;

/// Frames buffered per subscriber before older frames are dropped
const FRAME_CHANNEL_CAPACITY: usize = 8;

/// How long to wait for the camera thread to report its format
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// A single decoded RGBA frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// RGBA pixel data, `width * height * 4` bytes
    pub data: Vec<u8>,
}

/// Negotiated camera format, reported once the device is streaming
#[derive(Debug, Clone)]
struct CameraOpened {
    label: String,
    width: u32,
    height: u32,
    frame_rate: u32,
}

/// Handle to the running camera capture thread
pub struct CameraTrack {
    label: String,
    width: u32,
    height: u32,
    frame_rate: u32,
    frames: broadcast::Sender<Arc<VideoFrame>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CameraTrack {
    /// Open the default camera and start streaming frames.
    ///
    /// Blocks until the device reports its negotiated format or fails.
    pub fn open() -> Result<Self, CaptureError> {
        let info = devices::default_camera().ok_or(CaptureError::NoCamera)?;
        let index = devices::camera_index_from_id(&info.id);

        let running = Arc::new(AtomicBool::new(true));
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = {
            let running = running.clone();
            let frames = frames.clone();
            let name = info.name.clone();
            std::thread::spawn(move || capture_loop(index, name, running, frames, ready_tx))
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(opened)) => {
                tracing::info!(
                    "Camera opened: {} ({}x{} @ {}fps)",
                    opened.label,
                    opened.width,
                    opened.height,
                    opened.frame_rate
                );
                Ok(Self {
                    label: opened.label,
                    width: opened.width,
                    height: opened.height,
                    frame_rate: opened.frame_rate,
                    frames,
                    running,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                Err(CaptureError::Backend(
                    "camera did not start streaming in time".to_string(),
                ))
            }
        }
    }

    /// Human-readable device name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Negotiated frame rate
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Whether the capture thread is still delivering frames
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to decoded frames
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<VideoFrame>> {
        self.frames.subscribe()
    }

    /// Sender half of the frame broadcast, for handing to an encoder
    pub(crate) fn frames(&self) -> broadcast::Sender<Arc<VideoFrame>> {
        self.frames.clone()
    }

    /// Stop the capture thread and release the device
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    index: CameraIndex,
    label: String,
    running: Arc<AtomicBool>,
    frames: broadcast::Sender<Arc<VideoFrame>>,
    ready_tx: mpsc::Sender<Result<CameraOpened, CaptureError>>,
) {
    let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);

    let mut camera = match Camera::new(index.clone(), format) {
        Ok(c) => c,
        Err(e) => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(CaptureError::Backend(format!(
                "failed to open camera {index:?}: {e}"
            ))));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        running.store(false, Ordering::SeqCst);
        let _ = ready_tx.send(Err(CaptureError::Backend(format!(
            "failed to open camera stream: {e}"
        ))));
        return;
    }

    let camera_format = camera.camera_format();
    let opened = CameraOpened {
        label,
        width: camera_format.resolution().width(),
        height: camera_format.resolution().height(),
        frame_rate: camera_format.frame_rate(),
    };
    let frame_size = (opened.width * opened.height * 4) as usize;
    let _ = ready_tx.send(Ok(opened.clone()));

    let mut delivered: u64 = 0;
    while running.load(Ordering::SeqCst) {
        // frame() blocks until the camera delivers; the device drives timing
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                Ok(decoded) => {
                    let data = decoded.into_raw();
                    if data.len() != frame_size {
                        tracing::debug!(
                            "Dropping frame with unexpected size {} (expected {})",
                            data.len(),
                            frame_size
                        );
                        continue;
                    }
                    let _ = frames.send(Arc::new(VideoFrame {
                        width: opened.width,
                        height: opened.height,
                        data,
                    }));
                    delivered += 1;
                }
                Err(e) => {
                    tracing::debug!("Failed to decode camera frame: {:?}", e);
                }
            },
            Err(e) => {
                tracing::debug!("Failed to capture frame: {:?}", e);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    running.store(false, Ordering::SeqCst);
    tracing::info!("Camera capture thread stopped ({} frames delivered)", delivered);
}
