//! Export command handlers
//!
//! Saving is fire-and-forget: a native save dialog seeded with the fixed
//! file name, then a byte copy of the artifact. The widget gets no result
//! back; outcomes go to the log.

use super::recording::RecorderState;
use tauri::{AppHandle, State};
use tauri_plugin_dialog::DialogExt;

/// Default file name offered for a saved recording
pub const EXPORT_FILE_NAME: &str = "녹화본.webm";

/// Save the finished recording to a user-chosen path
#[tauri::command]
pub async fn save_recording(
    app: AppHandle,
    recorder: State<'_, RecorderState>,
) -> Result<(), String> {
    let source = {
        let controller = recorder.controller.lock().await;
        match controller.artifact() {
            Some(artifact) => artifact.path().to_path_buf(),
            None => {
                tracing::debug!("Save requested with no recording");
                return Ok(());
            }
        }
    };

    app.dialog()
        .file()
        .set_file_name(EXPORT_FILE_NAME)
        .add_filter("WebM video", &["webm"])
        .save_file(move |picked| {
            let Some(picked) = picked else {
                tracing::debug!("Save dialog dismissed");
                return;
            };
            let dest = match picked.into_path() {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Save dialog returned an unusable path: {}", e);
                    return;
                }
            };
            match std::fs::copy(&source, &dest) {
                Ok(bytes) => {
                    tracing::info!("Recording saved: {} ({} bytes)", dest.display(), bytes);
                }
                Err(e) => {
                    tracing::error!("Failed to save recording to {}: {}", dest.display(), e);
                }
            }
        });

    Ok(())
}
