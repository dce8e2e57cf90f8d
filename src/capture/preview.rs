//! Live preview pump
//!
//! Forwards camera frames to the widget as PNG data URLs over the
//! `preview-frame` event, throttled well below the camera rate. The live
//! view is video-only; microphone samples never reach the widget.

use super::{CaptureStream, VideoFrame};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::time::{Duration, Instant};
use tauri::{AppHandle, Emitter};
use tokio::sync::broadcast::error::RecvError;

/// Frames per second pushed to the widget
const PREVIEW_FPS: u32 = 10;

/// Payload of the `preview-frame` event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFrame {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

/// Start forwarding frames from the stream to the widget.
pub fn spawn_preview_pump(app: AppHandle, stream: &CaptureStream) {
    let mut frames = stream.video().subscribe();

    tauri::async_runtime::spawn(async move {
        let interval = Duration::from_secs(1) / PREVIEW_FPS;
        let mut last_emit = Instant::now() - interval;

        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if last_emit.elapsed() < interval {
                        continue;
                    }
                    last_emit = Instant::now();
                    match encode_png(&frame) {
                        Ok(png) => {
                            let payload = PreviewFrame {
                                data_url: format!("data:image/png;base64,{}", STANDARD.encode(png)),
                                width: frame.width,
                                height: frame.height,
                            };
                            if let Err(e) = app.emit("preview-frame", &payload) {
                                tracing::warn!("Failed to emit preview frame: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Failed to encode preview frame: {}", e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::trace!("Preview pump lagged, skipped {} frames", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        tracing::debug!("Preview pump stopped");
    });
}

fn encode_png(frame: &VideoFrame) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&frame.data)?;
        writer.finish()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_png_produces_png_signature() {
        let frame = VideoFrame {
            width: 2,
            height: 2,
            data: vec![255; 16],
        };
        let png = encode_png(&frame).expect("encoding failed");
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }
}
