//! Recorder controller
//!
//! The Idle/Recording state machine. Start opens an encoding session
//! against the capture stream after resetting the chunk buffer; session
//! data events append in arrival order; stop signals the session and the
//! artifact is minted when its stop event arrives. Operator misuse (start
//! without a stream, redundant stops) is absorbed as a no-op.

use super::artifact::{ArtifactInfo, ArtifactStore, RecordingArtifact};
use super::chunks::ChunkBuffer;
use super::encoder::{EncoderFactory, EncoderSession, MediaProfile, RecorderError, SessionEvent};
use super::state::{ControlSurface, RecorderSnapshot, RecordingState};
use crate::capture::StreamSource;
use tokio::sync::mpsc;

/// Drives a single encoding session at a time against the capture stream
pub struct RecorderController {
    state: RecordingState,
    chunks: ChunkBuffer,
    session: Option<Box<dyn EncoderSession>>,
    artifact: Option<RecordingArtifact>,
    store: ArtifactStore,
    profile: MediaProfile,
    factory: Box<dyn EncoderFactory>,
}

impl RecorderController {
    /// Create a controller recording with the fixed default profile.
    pub fn new(store: ArtifactStore, factory: Box<dyn EncoderFactory>) -> Self {
        Self {
            state: RecordingState::Idle,
            chunks: ChunkBuffer::default(),
            session: None,
            artifact: None,
            store,
            profile: MediaProfile::recording_default(),
            factory,
        }
    }

    /// Current state of the machine
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// The finished recording, if one exists
    pub fn artifact(&self) -> Option<&RecordingArtifact> {
        self.artifact.as_ref()
    }

    /// Button enablement for the widget
    pub fn controls(&self) -> ControlSurface {
        ControlSurface::derive(self.state, self.artifact.is_some())
    }

    /// Full snapshot for the widget
    pub fn snapshot(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            state: self.state,
            controls: self.controls(),
            artifact: self.artifact.as_ref().map(RecordingArtifact::info),
        }
    }

    /// Start a recording session.
    ///
    /// A no-op without a capture stream, and while a session already exists
    /// (including one still flushing after a stop). On success the chunk
    /// buffer has been reset and the returned receiver carries the
    /// session's events; feed them back through
    /// [`handle_session_event`](Self::handle_session_event).
    pub fn start(
        &mut self,
        source: Option<&StreamSource>,
    ) -> Result<Option<mpsc::UnboundedReceiver<SessionEvent>>, RecorderError> {
        let Some(source) = source else {
            tracing::debug!("Start requested with no capture stream");
            return Ok(None);
        };
        if self.session.is_some() {
            tracing::debug!("Start requested while a session is active");
            return Ok(None);
        }

        self.chunks.reset();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = self
            .factory
            .open_session(source, &self.profile, events_tx)
            .map_err(|e| {
                tracing::error!("Failed to open encoding session: {e}");
                e
            })?;

        self.session = Some(session);
        self.state = RecordingState::Recording;
        tracing::info!("Recording started ({})", self.profile.media_type());
        Ok(Some(events_rx))
    }

    /// Stop the active session.
    ///
    /// A no-op without one. The state returns to Idle immediately; the
    /// artifact is minted once the session's stop event arrives.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Stop requested with no active session");
            return;
        };
        session.stop();
        self.state = RecordingState::Idle;
        tracing::info!("Recording stopping, waiting for encoder to flush");
    }

    /// Feed one session event through the machine.
    ///
    /// Returns the new artifact's description when the event finalized the
    /// session, so the caller can notify the widget.
    pub fn handle_session_event(
        &mut self,
        event: SessionEvent,
    ) -> Result<Option<ArtifactInfo>, RecorderError> {
        match event {
            SessionEvent::Data(chunk) => {
                if self.session.is_some() && !chunk.is_empty() {
                    self.chunks.push(chunk);
                }
                Ok(None)
            }
            SessionEvent::Stopped => {
                if self.session.take().is_none() {
                    return Ok(None);
                }
                self.state = RecordingState::Idle;

                let bytes = self.chunks.concat();
                tracing::info!(
                    "Encoding session finished: {} chunks, {} bytes",
                    self.chunks.len(),
                    bytes.len()
                );

                // Release the previous artifact's file and URL before
                // minting the replacement.
                self.artifact = None;
                let artifact = self.store.mint(&bytes, &self.profile)?;
                let info = artifact.info();
                self.artifact = Some(artifact);
                Ok(Some(info))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Session whose only behavior is remembering it was told to stop.
    struct ScriptedSession {
        stopped: Arc<Mutex<bool>>,
    }

    impl EncoderSession for ScriptedSession {
        fn media_type(&self) -> &str {
            "video/webm"
        }

        fn stop(&mut self) {
            *self.stopped.lock() = true;
        }
    }

    /// Factory recording every open and handing out scripted sessions.
    #[derive(Default)]
    struct ScriptedFactory {
        opens: Arc<Mutex<usize>>,
        stopped: Arc<Mutex<bool>>,
        fail_open: bool,
    }

    impl EncoderFactory for ScriptedFactory {
        fn open_session(
            &self,
            _source: &StreamSource,
            profile: &MediaProfile,
            _events: mpsc::UnboundedSender<SessionEvent>,
        ) -> Result<Box<dyn EncoderSession>, RecorderError> {
            if self.fail_open {
                return Err(RecorderError::UnsupportedProfile(
                    profile.media_type().to_string(),
                ));
            }
            *self.opens.lock() += 1;
            Ok(Box::new(ScriptedSession {
                stopped: self.stopped.clone(),
            }))
        }
    }

    struct Rig {
        _dir: tempfile::TempDir,
        controller: RecorderController,
        opens: Arc<Mutex<usize>>,
        stopped: Arc<Mutex<bool>>,
        source: StreamSource,
    }

    fn rig() -> Rig {
        rig_with(false)
    }

    fn rig_with(fail_open: bool) -> Rig {
        let dir = tempfile::tempdir().expect("tempdir");
        let factory = ScriptedFactory {
            fail_open,
            ..ScriptedFactory::default()
        };
        let opens = factory.opens.clone();
        let stopped = factory.stopped.clone();
        let controller = RecorderController::new(
            ArtifactStore::new(dir.path().join("artifacts")),
            Box::new(factory),
        );
        Rig {
            _dir: dir,
            controller,
            opens,
            stopped,
            source: StreamSource::detached(640, 480, 30, 48000),
        }
    }

    fn data(bytes: &'static [u8]) -> SessionEvent {
        SessionEvent::Data(Bytes::from_static(bytes))
    }

    fn artifact_bytes(controller: &RecorderController) -> Vec<u8> {
        let artifact = controller.artifact().expect("artifact should exist");
        std::fs::read(artifact.path()).expect("artifact file should be readable")
    }

    #[test]
    fn test_artifact_is_ordered_concatenation_of_chunks() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        for event in [data(b"A"), data(b"B"), data(b"C")] {
            r.controller.handle_session_event(event).expect("event failed");
        }
        r.controller.stop();
        let info = r
            .controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed")
            .expect("should produce an artifact");

        assert_eq!(artifact_bytes(&r.controller), b"ABC");
        assert_eq!(info.byte_len, 3);
        assert_eq!(info.media_type, "video/webm");
        assert!(*r.stopped.lock());
    }

    #[test]
    fn test_empty_chunks_are_dropped() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        for event in [data(b""), data(b"A"), data(b""), data(b"B")] {
            r.controller.handle_session_event(event).expect("event failed");
        }
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        assert_eq!(artifact_bytes(&r.controller), b"AB");
    }

    #[test]
    fn test_stop_with_zero_chunks_yields_empty_artifact() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.stop();
        let info = r
            .controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed")
            .expect("should produce an artifact");

        assert_eq!(info.byte_len, 0);
        assert!(artifact_bytes(&r.controller).is_empty());
        // A zero-length recording is still savable
        assert!(r.controller.controls().save_enabled);
    }

    #[test]
    fn test_new_session_resets_leftover_chunks() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"old")).expect("event failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"new")).expect("event failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        assert_eq!(artifact_bytes(&r.controller), b"new");
    }

    #[test]
    fn test_replacing_artifact_releases_previous_file() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"first")).expect("event failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");
        let first_path = r
            .controller
            .artifact()
            .expect("artifact should exist")
            .path()
            .to_path_buf();

        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        assert!(!first_path.exists());
        assert!(r.controller.artifact().expect("artifact should exist").path().exists());
    }

    #[test]
    fn test_start_without_stream_is_a_no_op() {
        let mut r = rig();
        let receiver = r.controller.start(None).expect("start failed");

        assert!(receiver.is_none());
        assert_eq!(r.controller.state(), RecordingState::Idle);
        assert_eq!(*r.opens.lock(), 0);
    }

    #[test]
    fn test_start_while_recording_is_a_no_op() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        let second = r.controller.start(Some(&r.source)).expect("start failed");

        assert!(second.is_none());
        assert_eq!(*r.opens.lock(), 1);
    }

    #[test]
    fn test_start_while_session_flushes_is_a_no_op() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"tail")).expect("event failed");
        r.controller.stop();

        // Idle again, but the session has not delivered its stop event yet
        assert_eq!(r.controller.state(), RecordingState::Idle);
        let second = r.controller.start(Some(&r.source)).expect("start failed");
        assert!(second.is_none());
        assert_eq!(*r.opens.lock(), 1);

        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");
        assert_eq!(artifact_bytes(&r.controller), b"tail");
    }

    #[test]
    fn test_stop_while_idle_is_a_no_op() {
        let mut r = rig();
        r.controller.stop();

        assert_eq!(r.controller.state(), RecordingState::Idle);
        assert!(!*r.stopped.lock());
    }

    #[test]
    fn test_chunks_arriving_after_stop_signal_still_append() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"live")).expect("event failed");
        r.controller.stop();
        // The platform drains pending data before the stop event
        r.controller.handle_session_event(data(b"-drain")).expect("event failed");
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        assert_eq!(artifact_bytes(&r.controller), b"live-drain");
    }

    #[test]
    fn test_data_after_session_stop_event_is_ignored() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"kept")).expect("event failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");
        r.controller.handle_session_event(data(b"late")).expect("event failed");

        assert_eq!(artifact_bytes(&r.controller), b"kept");
    }

    #[test]
    fn test_failed_session_open_stays_idle() {
        let mut r = rig_with(true);
        let result = r.controller.start(Some(&r.source));

        assert!(matches!(result, Err(RecorderError::UnsupportedProfile(_))));
        assert_eq!(r.controller.state(), RecordingState::Idle);
        assert!(r.controller.controls().start_enabled);
        assert!(r.controller.artifact().is_none());
    }

    #[test]
    fn test_session_ending_on_its_own_returns_to_idle() {
        let mut r = rig();
        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"crashout")).expect("event failed");
        // Encoder died without a stop request
        let info = r
            .controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        assert!(info.is_some());
        assert_eq!(r.controller.state(), RecordingState::Idle);
    }

    #[test]
    fn test_enablement_through_a_full_session() {
        let mut r = rig();
        assert_eq!(
            r.controller.controls(),
            ControlSurface {
                start_enabled: true,
                stop_enabled: false,
                save_enabled: false
            }
        );

        r.controller.start(Some(&r.source)).expect("start failed");
        assert_eq!(
            r.controller.controls(),
            ControlSurface {
                start_enabled: false,
                stop_enabled: true,
                save_enabled: false
            }
        );

        r.controller.handle_session_event(data(b"A")).expect("event failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");
        assert_eq!(
            r.controller.controls(),
            ControlSurface {
                start_enabled: true,
                stop_enabled: false,
                save_enabled: true
            }
        );
    }

    #[test]
    fn test_failed_acquisition_leaves_controls_inert() {
        let mut r = rig();
        // No stream ever arrives: start never creates a session, stop and
        // save have nothing to act on.
        for _ in 0..3 {
            assert!(r.controller.start(None).expect("start failed").is_none());
            r.controller.stop();
        }
        assert_eq!(r.controller.state(), RecordingState::Idle);
        assert_eq!(*r.opens.lock(), 0);
        assert!(r.controller.artifact().is_none());
        assert!(!r.controller.controls().save_enabled);
    }

    #[test]
    fn test_snapshot_reflects_artifact() {
        let mut r = rig();
        assert!(r.controller.snapshot().artifact.is_none());

        r.controller.start(Some(&r.source)).expect("start failed");
        r.controller.handle_session_event(data(b"snap")).expect("event failed");
        r.controller.stop();
        r.controller
            .handle_session_event(SessionEvent::Stopped)
            .expect("finalize failed");

        let snapshot = r.controller.snapshot();
        assert_eq!(snapshot.state, RecordingState::Idle);
        let artifact = snapshot.artifact.expect("artifact should exist");
        assert_eq!(artifact.byte_len, 4);
    }
}
