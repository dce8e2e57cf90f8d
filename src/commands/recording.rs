//! Recording-related Tauri commands

use super::capture::CaptureState;
use crate::recorder::{
    ArtifactStore, FfmpegFactory, RecorderController, RecorderSnapshot, SessionEvent,
};
use std::sync::Arc;
use tauri::{AppHandle, Emitter, State};
use tokio::sync::{mpsc, Mutex};

/// Application state for recording
pub struct RecorderState {
    pub controller: Arc<Mutex<RecorderController>>,
}

impl Default for RecorderState {
    fn default() -> Self {
        let store = ArtifactStore::new(std::env::temp_dir().join("camclip"));
        Self {
            controller: Arc::new(Mutex::new(RecorderController::new(
                store,
                Box::new(FfmpegFactory),
            ))),
        }
    }
}

/// Start recording
#[tauri::command]
pub async fn start_recording(
    app: AppHandle,
    capture: State<'_, CaptureState>,
    recorder: State<'_, RecorderState>,
) -> Result<(), String> {
    let events = {
        let mut controller = recorder.controller.lock().await;
        let stream = capture.stream.read();
        let source = stream.as_ref().map(|s| s.source());
        controller.start(source.as_ref()).map_err(String::from)?
    };

    if let Some(events) = events {
        drive_session(app, recorder.controller.clone(), events);
    }
    Ok(())
}

/// Stop recording
#[tauri::command]
pub async fn stop_recording(recorder: State<'_, RecorderState>) -> Result<(), String> {
    let mut controller = recorder.controller.lock().await;
    controller.stop();
    Ok(())
}

/// Get the recorder's state, control enablement, and artifact
#[tauri::command]
pub async fn recorder_snapshot(
    recorder: State<'_, RecorderState>,
) -> Result<RecorderSnapshot, String> {
    let controller = recorder.controller.lock().await;
    Ok(controller.snapshot())
}

/// Pump one session's events through the controller until it finalizes,
/// then tell the widget where the recording landed.
fn drive_session(
    app: AppHandle,
    controller: Arc<Mutex<RecorderController>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    tauri::async_runtime::spawn(async move {
        while let Some(event) = events.recv().await {
            let finalized = {
                let mut controller = controller.lock().await;
                controller.handle_session_event(event)
            };
            match finalized {
                Ok(Some(info)) => {
                    if let Err(e) = app.emit("recording-finished", &info) {
                        tracing::warn!("Failed to emit recording-finished: {}", e);
                    }
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Failed to finalize recording: {e}");
                    break;
                }
            }
        }
    });
}
