//! Device capture
//!
//! This module acquires the local camera and microphone and fans their
//! output out to the live preview and the recorder.

pub mod devices;
pub mod microphone;
pub mod preview;
pub mod stream;
pub mod webcam;

use thiserror::Error;

pub use devices::{AudioDeviceInfo, CameraInfo};
pub use microphone::MicrophoneTrack;
pub use stream::{CaptureStream, StreamSource};
pub use webcam::{CameraTrack, VideoFrame};

/// Errors raised while acquiring or running capture devices
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no camera device available")]
    NoCamera,

    #[error("no audio input device available")]
    NoMicrophone,

    #[error("capture backend error: {0}")]
    Backend(String),
}
