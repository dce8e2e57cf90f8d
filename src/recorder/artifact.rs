//! Finished recording artifacts
//!
//! A stop event turns the chunk buffer into exactly one artifact: a file
//! in the app's scratch directory plus an asset URL the widget can bind a
//! `<video>` element to. Dropping an artifact removes its file, so
//! replacing it releases the previous URL instead of leaking it.

use super::encoder::{MediaProfile, RecorderError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Artifact description handed to the widget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    /// Dereferenceable URL for the recorded view
    pub url: String,

    /// Media type of the object
    pub media_type: String,

    /// Size in bytes
    pub byte_len: u64,
}

/// Writes finished recordings into a scratch directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// first mint.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Write `bytes` as a fresh artifact and mint its URL.
    ///
    /// Zero bytes is a valid recording; the file is simply empty.
    pub fn mint(
        &self,
        bytes: &[u8],
        profile: &MediaProfile,
    ) -> Result<RecordingArtifact, RecorderError> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self
            .dir
            .join(format!("recording-{}.{}", Uuid::new_v4(), profile.extension()));
        std::fs::write(&path, bytes)?;

        let artifact = RecordingArtifact {
            url: asset_url(&path),
            media_type: profile.media_type().to_string(),
            byte_len: bytes.len() as u64,
            path,
        };
        tracing::info!(
            "Recording artifact minted: {} ({} bytes)",
            artifact.path.display(),
            artifact.byte_len
        );
        Ok(artifact)
    }
}

/// One completed recording: bytes on disk plus a dereferenceable URL
#[derive(Debug)]
pub struct RecordingArtifact {
    path: PathBuf,
    url: String,
    media_type: String,
    byte_len: u64,
}

impl RecordingArtifact {
    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dereferenceable URL for the widget
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Media type of the object
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Size in bytes
    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    /// Description for the widget
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            url: self.url.clone(),
            media_type: self.media_type.clone(),
            byte_len: self.byte_len,
        }
    }
}

impl Drop for RecordingArtifact {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(
                "Failed to remove artifact file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Mint the webview asset-protocol URL for a file path.
fn asset_url(path: &Path) -> String {
    let encoded = urlencoding::encode(&path.to_string_lossy()).into_owned();
    #[cfg(windows)]
    {
        format!("http://asset.localhost/{encoded}")
    }
    #[cfg(not(windows))]
    {
        format!("asset://localhost/{encoded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        (dir, store)
    }

    #[test]
    fn test_mint_writes_bytes_and_reports_length() {
        let (_dir, store) = store();
        let artifact = store
            .mint(b"webm-bytes", &MediaProfile::recording_default())
            .expect("mint failed");

        assert_eq!(artifact.byte_len(), 10);
        assert_eq!(artifact.media_type(), "video/webm");
        assert_eq!(std::fs::read(artifact.path()).expect("read failed"), b"webm-bytes");
    }

    #[test]
    fn test_mint_accepts_zero_bytes() {
        let (_dir, store) = store();
        let artifact = store
            .mint(b"", &MediaProfile::recording_default())
            .expect("mint failed");

        assert_eq!(artifact.byte_len(), 0);
        assert_eq!(std::fs::metadata(artifact.path()).expect("stat failed").len(), 0);
    }

    #[test]
    fn test_drop_removes_backing_file() {
        let (_dir, store) = store();
        let artifact = store
            .mint(b"short-lived", &MediaProfile::recording_default())
            .expect("mint failed");
        let path = artifact.path().to_path_buf();

        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_url_points_into_asset_protocol() {
        let (_dir, store) = store();
        let artifact = store
            .mint(b"x", &MediaProfile::recording_default())
            .expect("mint failed");

        #[cfg(not(windows))]
        assert!(artifact.url().starts_with("asset://localhost/"));
        #[cfg(windows)]
        assert!(artifact.url().starts_with("http://asset.localhost/"));
        assert!(artifact.url().ends_with(".webm"));
    }
}
