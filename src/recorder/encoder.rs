//! The encoding boundary
//!
//! An encoding session turns the live stream into containerized fragments,
//! delivered as events on a channel: zero or more `Data` events in emission
//! order, then exactly one `Stopped` once the encoder has flushed. The
//! trait seam lets tests script sessions without devices or child
//! processes.

use crate::capture::StreamSource;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Mime profile recordings are encoded with
pub const RECORDING_MIME_TYPE: &str = "video/webm; codecs=vp9";

/// Errors raised by the recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("unsupported media profile: {0}")]
    UnsupportedProfile(String),

    #[error("failed to start encoder: {0}")]
    EncoderStart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RecorderError> for String {
    fn from(e: RecorderError) -> String {
        e.to_string()
    }
}

/// Events emitted by an encoding session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A fragment of encoded output, in emission order
    Data(Bytes),
    /// The session has flushed everything it will ever emit
    Stopped,
}

/// A running encoding session
pub trait EncoderSession: Send {
    /// Media type the finished recording is tagged with
    fn media_type(&self) -> &str;

    /// Signal the session to stop.
    ///
    /// Returns immediately; fragments still in flight are delivered before
    /// the final `Stopped` event. Safe to call more than once.
    fn stop(&mut self);
}

/// Opens encoding sessions against a capture stream
pub trait EncoderFactory: Send + Sync {
    fn open_session(
        &self,
        source: &StreamSource,
        profile: &MediaProfile,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Box<dyn EncoderSession>, RecorderError>;
}

/// Container formats a session can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Webm,
    Mp4,
}

impl Container {
    /// Media type of the finished object
    pub fn media_type(&self) -> &'static str {
        match self {
            Container::Webm => "video/webm",
            Container::Mp4 => "video/mp4",
        }
    }

    /// File extension for minted artifacts
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
        }
    }

    /// FFmpeg muxer name
    pub fn ffmpeg_muxer(&self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
        }
    }

    fn default_video_codec(&self) -> VideoCodec {
        match self {
            Container::Webm => VideoCodec::Vp9,
            Container::Mp4 => VideoCodec::H264,
        }
    }

    fn supports(&self, codec: VideoCodec) -> bool {
        match self {
            Container::Webm => matches!(codec, VideoCodec::Vp9 | VideoCodec::Vp8),
            Container::Mp4 => matches!(codec, VideoCodec::H264),
        }
    }
}

/// Video codecs a session can encode with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

impl VideoCodec {
    /// FFmpeg encoder name
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Vp8 => "libvpx",
            VideoCodec::H264 => "libx264",
        }
    }
}

/// Parsed and validated container/codec pair for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProfile {
    container: Container,
    video_codec: VideoCodec,
}

impl MediaProfile {
    /// Parse a `container; codecs=...` mime string.
    ///
    /// Fails closed with `UnsupportedProfile` for unknown containers,
    /// unknown codecs, and pairs the container cannot carry. A missing
    /// `codecs` parameter selects the container's default codec.
    pub fn parse(mime: &str) -> Result<Self, RecorderError> {
        let mut parts = mime.split(';').map(str::trim);

        let container = match parts.next().map(|c| c.to_ascii_lowercase()).as_deref() {
            Some("video/webm") => Container::Webm,
            Some("video/mp4") => Container::Mp4,
            _ => return Err(RecorderError::UnsupportedProfile(mime.to_string())),
        };

        let mut video_codec = container.default_video_codec();
        for param in parts {
            let Some(value) = param.strip_prefix("codecs=") else {
                continue;
            };
            video_codec = match value.trim_matches('"').to_ascii_lowercase().as_str() {
                "vp9" => VideoCodec::Vp9,
                "vp8" => VideoCodec::Vp8,
                "h264" | "avc1" => VideoCodec::H264,
                _ => return Err(RecorderError::UnsupportedProfile(mime.to_string())),
            };
        }

        if !container.supports(video_codec) {
            return Err(RecorderError::UnsupportedProfile(mime.to_string()));
        }

        Ok(Self {
            container,
            video_codec,
        })
    }

    /// The fixed profile recordings are made with
    pub fn recording_default() -> Self {
        Self {
            container: Container::Webm,
            video_codec: VideoCodec::Vp9,
        }
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn video_codec(&self) -> VideoCodec {
        self.video_codec
    }

    /// Media type of the finished object
    pub fn media_type(&self) -> &'static str {
        self.container.media_type()
    }

    /// File extension for minted artifacts
    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_webm_vp9() {
        let profile = MediaProfile::parse("video/webm; codecs=vp9").expect("should parse");
        assert_eq!(profile.container(), Container::Webm);
        assert_eq!(profile.video_codec(), VideoCodec::Vp9);
        assert_eq!(profile.media_type(), "video/webm");
        assert_eq!(profile.extension(), "webm");
    }

    #[test]
    fn test_parse_is_case_and_space_tolerant() {
        let profile = MediaProfile::parse("VIDEO/WebM;codecs=VP8").expect("should parse");
        assert_eq!(profile.video_codec(), VideoCodec::Vp8);
    }

    #[test]
    fn test_parse_defaults_codec_per_container() {
        assert_eq!(
            MediaProfile::parse("video/webm").expect("should parse").video_codec(),
            VideoCodec::Vp9
        );
        assert_eq!(
            MediaProfile::parse("video/mp4").expect("should parse").video_codec(),
            VideoCodec::H264
        );
    }

    #[test]
    fn test_parse_rejects_unknown_container() {
        assert!(matches!(
            MediaProfile::parse("audio/ogg; codecs=opus"),
            Err(RecorderError::UnsupportedProfile(_))
        ));
    }

    #[test]
    fn test_parse_rejects_codec_the_container_cannot_carry() {
        assert!(matches!(
            MediaProfile::parse("video/mp4; codecs=vp9"),
            Err(RecorderError::UnsupportedProfile(_))
        ));
    }

    #[test]
    fn test_recording_default_matches_fixed_mime_type() {
        let parsed = MediaProfile::parse(RECORDING_MIME_TYPE).expect("should parse");
        assert_eq!(parsed, MediaProfile::recording_default());
    }
}
