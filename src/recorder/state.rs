//! Recording state management
//!
//! Defines the recording state machine and the control enablement the
//! widget binds its buttons to.

use super::artifact::ArtifactInfo;
use serde::{Deserialize, Serialize};

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    Idle,
    /// Currently recording
    Recording,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Button enablement derived from recorder state.
///
/// Invariants: start is enabled exactly when idle, stop exactly when
/// recording, save exactly when a finished recording exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSurface {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub save_enabled: bool,
}

impl ControlSurface {
    /// Derive enablement from the state machine
    pub fn derive(state: RecordingState, has_artifact: bool) -> Self {
        Self {
            start_enabled: state == RecordingState::Idle,
            stop_enabled: state == RecordingState::Recording,
            save_enabled: has_artifact,
        }
    }
}

/// Snapshot of the recorder for the widget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub state: RecordingState,
    pub controls: ControlSurface,
    pub artifact: Option<ArtifactInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_enables_start_only() {
        let controls = ControlSurface::derive(RecordingState::Idle, false);
        assert!(controls.start_enabled);
        assert!(!controls.stop_enabled);
        assert!(!controls.save_enabled);
    }

    #[test]
    fn test_recording_enables_stop_only() {
        let controls = ControlSurface::derive(RecordingState::Recording, false);
        assert!(!controls.start_enabled);
        assert!(controls.stop_enabled);
    }

    #[test]
    fn test_save_tracks_artifact_existence_only() {
        for state in [RecordingState::Idle, RecordingState::Recording] {
            assert!(ControlSurface::derive(state, true).save_enabled);
            assert!(!ControlSurface::derive(state, false).save_enabled);
        }
    }

    #[test]
    fn test_exactly_one_of_start_stop_enabled() {
        for state in [RecordingState::Idle, RecordingState::Recording] {
            for has_artifact in [false, true] {
                let controls = ControlSurface::derive(state, has_artifact);
                assert_ne!(controls.start_enabled, controls.stop_enabled);
            }
        }
    }
}
