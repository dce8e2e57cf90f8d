//! Capture device enumeration
//!
//! Lists cameras and audio input devices so the acquirer can pick defaults
//! and report what it opened. There is no device-selection UI; the first
//! camera and the system default microphone are used.

use cpal::traits::{DeviceTrait, HostTrait};
use nokhwa::utils::{ApiBackend, CameraIndex};
use serde::{Deserialize, Serialize};

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,
}

/// Information about an audio input device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Device name
    pub name: String,

    /// Whether this is the default input device
    pub is_default: bool,
}

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Get the camera the acquirer will open, if any
pub fn default_camera() -> Option<CameraInfo> {
    list_cameras().into_iter().next()
}

/// Get list of available audio input devices (microphones)
pub fn list_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .filter_map(|device| device.name().ok())
            .map(|name| AudioDeviceInfo {
                is_default: Some(&name) == default_name.as_ref(),
                name,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate audio input devices: {:?}", e);
            Vec::new()
        }
    }
}

/// Resolve a camera index from a device ID string
pub(crate) fn camera_index_from_id(id: &str) -> CameraIndex {
    if let Ok(idx) = id.parse::<u32>() {
        CameraIndex::Index(idx)
    } else {
        CameraIndex::String(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_index_numeric_id() {
        assert_eq!(camera_index_from_id("2"), CameraIndex::Index(2));
    }

    #[test]
    fn test_camera_index_named_id() {
        assert_eq!(
            camera_index_from_id("/dev/video0"),
            CameraIndex::String("/dev/video0".to_string())
        );
    }
}
