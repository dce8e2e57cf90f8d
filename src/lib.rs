//! CamClip - Webcam capture and local recording, made simple.
//!
//! This is the main library crate for the CamClip application. It wires
//! the capture stream, the recorder state machine, and the widget's
//! command surface into the Tauri application.

pub mod capture;
pub mod commands;
pub mod recorder;

use commands::capture::CaptureState;
use commands::recording::RecorderState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the application
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camclip=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CamClip v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(CaptureState::default())
        .manage(RecorderState::default())
        .invoke_handler(tauri::generate_handler![
            // Capture commands
            commands::capture::capture_status,
            // Recording commands
            commands::recording::start_recording,
            commands::recording::stop_recording,
            commands::recording::recorder_snapshot,
            // Export commands
            commands::export::save_recording,
        ])
        .setup(|app| {
            use tauri::Manager;
            commands::capture::spawn_acquisition(app.handle().clone());
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
