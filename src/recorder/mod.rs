//! Recording system module
//!
//! Implements the Idle/Recording state machine around a single encoding
//! session: chunks accumulate in arrival order while recording and are
//! concatenated into a playable artifact when the session stops.

pub mod artifact;
pub mod chunks;
pub mod controller;
pub mod encoder;
pub mod ffmpeg;
pub mod state;

pub use artifact::{ArtifactInfo, ArtifactStore, RecordingArtifact};
pub use chunks::ChunkBuffer;
pub use controller::RecorderController;
pub use encoder::{
    EncoderFactory, EncoderSession, MediaProfile, RecorderError, SessionEvent,
};
pub use ffmpeg::FfmpegFactory;
pub use state::{ControlSurface, RecorderSnapshot, RecordingState};
