//! The acquired capture stream
//!
//! `CaptureStream` owns the camera and microphone tracks for the app's
//! lifetime. Acquisition happens exactly once at startup; dropping the
//! stream stops both capture threads and releases the devices.

use super::{devices, CameraTrack, CaptureError, MicrophoneTrack, VideoFrame};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Live audio+video stream obtained from the local devices
pub struct CaptureStream {
    video: CameraTrack,
    audio: MicrophoneTrack,
}

impl CaptureStream {
    /// Request the default camera and microphone simultaneously.
    ///
    /// Both tracks must open for acquisition to succeed; a failure of either
    /// releases the other and surfaces the error to the caller. This is the
    /// single acquisition attempt of the app lifetime; no retry happens here
    /// or anywhere above.
    pub fn acquire() -> Result<Self, CaptureError> {
        let cameras = devices::list_cameras();
        let inputs = devices::list_input_devices();
        tracing::debug!(
            "Acquiring capture devices ({} cameras, {} audio inputs visible)",
            cameras.len(),
            inputs.len()
        );

        let video = CameraTrack::open()?;
        let audio = MicrophoneTrack::open()?;

        Ok(Self { video, audio })
    }

    /// The video track
    pub fn video(&self) -> &CameraTrack {
        &self.video
    }

    /// The audio track
    pub fn audio(&self) -> &MicrophoneTrack {
        &self.audio
    }

    /// Whether both tracks are still delivering
    pub fn is_active(&self) -> bool {
        self.video.is_active() && self.audio.is_active()
    }

    /// A cheap handle bundle an encoding session can subscribe through
    pub fn source(&self) -> StreamSource {
        StreamSource {
            width: self.video.width(),
            height: self.video.height(),
            frame_rate: self.video.frame_rate(),
            sample_rate: self.audio.sample_rate(),
            frames: self.video.frames(),
            samples: self.audio.samples(),
        }
    }
}

/// Subscription endpoints and negotiated formats of a `CaptureStream`.
///
/// Carries no device ownership; an encoder holds one of these while the
/// stream itself stays in app state.
#[derive(Clone)]
pub struct StreamSource {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub sample_rate: u32,
    frames: broadcast::Sender<Arc<VideoFrame>>,
    samples: broadcast::Sender<Arc<Vec<i16>>>,
}

impl StreamSource {
    /// Subscribe to decoded RGBA frames
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Arc<VideoFrame>> {
        self.frames.subscribe()
    }

    /// Subscribe to mono i16 sample blocks
    pub fn subscribe_samples(&self) -> broadcast::Receiver<Arc<Vec<i16>>> {
        self.samples.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn detached(width: u32, height: u32, frame_rate: u32, sample_rate: u32) -> Self {
        let (frames, _) = broadcast::channel(4);
        let (samples, _) = broadcast::channel(4);
        Self {
            width,
            height,
            frame_rate,
            sample_rate,
            frames,
            samples,
        }
    }
}
