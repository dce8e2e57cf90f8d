//! Capture-related Tauri commands
//!
//! Holds the acquired stream in managed state and runs the single
//! acquisition attempt of the app lifetime.

use crate::capture::{preview, CaptureStream};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tauri::{AppHandle, Manager, State};

/// Application state for the capture stream
#[derive(Default)]
pub struct CaptureState {
    pub stream: Arc<RwLock<Option<CaptureStream>>>,
}

/// What the widget sees of the capture stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    /// Whether acquisition has succeeded
    pub acquired: bool,

    /// Whether both tracks are still delivering
    pub active: bool,

    /// Camera device name, if acquired
    pub camera: Option<String>,

    /// Microphone device name, if acquired
    pub microphone: Option<String>,
}

/// Get the state of the capture stream
#[tauri::command]
pub fn capture_status(state: State<'_, CaptureState>) -> CaptureStatus {
    let stream = state.stream.read();
    match stream.as_ref() {
        Some(stream) => CaptureStatus {
            acquired: true,
            active: stream.is_active(),
            camera: Some(stream.video().label().to_string()),
            microphone: Some(stream.audio().label().to_string()),
        },
        None => CaptureStatus {
            acquired: false,
            active: false,
            camera: None,
            microphone: None,
        },
    }
}

/// Run the one acquisition attempt of the app lifetime.
///
/// On success the stream lands in managed state and the preview pump
/// starts. On failure the error goes to the log and the app keeps running
/// with no live feed; nothing retries.
pub fn spawn_acquisition(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        let acquired = tauri::async_runtime::spawn_blocking(CaptureStream::acquire).await;

        match acquired {
            Ok(Ok(stream)) => {
                tracing::info!(
                    "Capture stream acquired (camera: {}, microphone: {})",
                    stream.video().label(),
                    stream.audio().label()
                );
                preview::spawn_preview_pump(app.clone(), &stream);
                let state: State<'_, CaptureState> = app.state();
                *state.stream.write() = Some(stream);
            }
            Ok(Err(e)) => {
                tracing::error!("Camera/microphone acquisition failed: {e}");
            }
            Err(e) => {
                tracing::error!("Acquisition task failed: {e}");
            }
        }
    });
}
