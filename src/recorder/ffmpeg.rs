//! FFmpeg-backed encoding sessions
//!
//! One ffmpeg child per session: raw RGBA frames are piped in on stdin,
//! microphone PCM through a FIFO (unix; elsewhere the session is
//! video-only), and the containerized stream comes back on stdout in
//! fragments. Feeder threads drain the capture broadcasts; the reader
//! thread forwards stdout fragments as session events and reports the
//! final stop once the child exits.

use super::encoder::{
    Container, EncoderFactory, EncoderSession, MediaProfile, RecorderError, SessionEvent,
    VideoCodec,
};
use crate::capture::StreamSource;
use bytes::Bytes;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

/// Size of stdout reads, and therefore the rough fragment granularity
const FRAGMENT_READ_SIZE: usize = 32 * 1024;

/// Opens `FfmpegSession`s
pub struct FfmpegFactory;

impl EncoderFactory for FfmpegFactory {
    fn open_session(
        &self,
        source: &StreamSource,
        profile: &MediaProfile,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Box<dyn EncoderSession>, RecorderError> {
        Ok(Box::new(FfmpegSession::open(source, profile, events)?))
    }
}

/// A live ffmpeg encoding session
pub struct FfmpegSession {
    media_type: String,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    // Holds the FIFO until the session is done with it
    _scratch: tempfile::TempDir,
}

impl FfmpegSession {
    /// Spawn ffmpeg against the stream and start feeding it.
    pub fn open(
        source: &StreamSource,
        profile: &MediaProfile,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, RecorderError> {
        let ffmpeg = find_ffmpeg()?;
        let scratch = tempfile::tempdir()?;

        let audio_input = make_audio_fifo(scratch.path())?;
        if audio_input.is_none() {
            tracing::warn!("Audio input not supported on this platform; recording video only");
        }

        let args = build_session_args(
            profile,
            source.width,
            source.height,
            source.frame_rate,
            source.sample_rate,
            audio_input.as_deref(),
        );
        tracing::debug!("Starting ffmpeg session: {:?}", args);

        let mut child = Command::new(&ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RecorderError::EncoderStart(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecorderError::EncoderStart("failed to open ffmpeg stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecorderError::EncoderStart("failed to open ffmpeg stdout".to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let mut threads = Vec::new();

        {
            let running = running.clone();
            let frames = source.subscribe_frames();
            let frame_size = (source.width * source.height * 4) as usize;
            threads.push(std::thread::spawn(move || {
                feed_video(running, frames, stdin, frame_size)
            }));
        }

        if let Some(fifo) = audio_input.clone() {
            let running = running.clone();
            let samples = source.subscribe_samples();
            threads.push(std::thread::spawn(move || {
                feed_audio(running, samples, fifo)
            }));
        }

        {
            let running = running.clone();
            threads.push(std::thread::spawn(move || {
                let mut stdout = stdout;
                let mut buf = vec![0u8; FRAGMENT_READ_SIZE];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let _ = events.send(SessionEvent::Data(Bytes::copy_from_slice(&buf[..n])));
                        }
                        Err(e) => {
                            tracing::warn!("Error reading encoder output: {}", e);
                            break;
                        }
                    }
                }
                running.store(false, Ordering::SeqCst);
                match child.wait() {
                    Ok(status) if status.success() => {
                        tracing::info!("Encoder session finished");
                    }
                    Ok(status) => {
                        tracing::warn!("Encoder exited with status {}", status);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to wait for encoder: {}", e);
                    }
                }
                let _ = events.send(SessionEvent::Stopped);
            }));
        }

        Ok(Self {
            media_type: profile.media_type().to_string(),
            running,
            threads,
            _scratch: scratch,
        })
    }
}

impl EncoderSession for FfmpegSession {
    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Pipe RGBA frames into ffmpeg until stopped; closing stdin signals EOF.
fn feed_video(
    running: Arc<AtomicBool>,
    mut frames: tokio::sync::broadcast::Receiver<Arc<crate::capture::VideoFrame>>,
    mut stdin: std::process::ChildStdin,
    frame_size: usize,
) {
    let mut written: u64 = 0;
    while running.load(Ordering::SeqCst) {
        match frames.blocking_recv() {
            Ok(frame) => {
                if frame.data.len() != frame_size {
                    continue;
                }
                if stdin.write_all(&frame.data).is_err() {
                    break;
                }
                written += 1;
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    drop(stdin);
    tracing::debug!("Video feeder stopped after {} frames", written);
}

#[cfg(unix)]
fn feed_audio(
    running: Arc<AtomicBool>,
    mut samples: tokio::sync::broadcast::Receiver<Arc<Vec<i16>>>,
    fifo: PathBuf,
) {
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;

    // A FIFO cannot be opened for writing until ffmpeg has opened the read
    // end; poll non-blocking instead of hanging if the child dies first.
    let file = loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&fifo)
        {
            Ok(f) => break f,
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) => {
                tracing::warn!("Failed to open audio pipe: {}", e);
                return;
            }
        }
    };
    // Writes must block again once the reader is attached
    unsafe {
        libc::fcntl(file.as_raw_fd(), libc::F_SETFL, 0);
    }

    let mut file = file;
    while running.load(Ordering::SeqCst) {
        match samples.blocking_recv() {
            Ok(block) => {
                if file.write_all(&pcm_bytes(&block)).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    drop(file);
    tracing::debug!("Audio feeder stopped");
}

#[cfg(not(unix))]
fn feed_audio(
    _running: Arc<AtomicBool>,
    _samples: tokio::sync::broadcast::Receiver<Arc<Vec<i16>>>,
    _fifo: PathBuf,
) {
}

/// Create the FIFO ffmpeg reads PCM from. Returns `None` where FIFOs are
/// unavailable and the session records video only.
#[cfg(unix)]
fn make_audio_fifo(scratch: &Path) -> Result<Option<PathBuf>, RecorderError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path = scratch.join("audio.pcm");
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| RecorderError::EncoderStart(format!("invalid pipe path: {e}")))?;
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) } != 0 {
        return Err(RecorderError::Io(std::io::Error::last_os_error()));
    }
    Ok(Some(path))
}

#[cfg(not(unix))]
fn make_audio_fifo(_scratch: &Path) -> Result<Option<PathBuf>, RecorderError> {
    Ok(None)
}

/// Serialize mono i16 samples as little-endian PCM.
fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Build the argument vector for one encoding session.
fn build_session_args(
    profile: &MediaProfile,
    width: u32,
    height: u32,
    frame_rate: u32,
    sample_rate: u32,
    audio_input: Option<&Path>,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        // Input 0: raw video on stdin
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-video_size".to_string(),
        format!("{width}x{height}"),
        "-framerate".to_string(),
        frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(),
    ];

    // Input 1: raw mono PCM through the FIFO
    if let Some(audio) = audio_input {
        args.extend([
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
        ]);
    }

    args.extend([
        "-c:v".to_string(),
        profile.video_codec().ffmpeg_encoder().to_string(),
    ]);
    match profile.video_codec() {
        VideoCodec::Vp9 | VideoCodec::Vp8 => {
            args.extend([
                "-deadline".to_string(),
                "realtime".to_string(),
                "-cpu-used".to_string(),
                "8".to_string(),
                "-crf".to_string(),
                "32".to_string(),
                "-b:v".to_string(),
                "0".to_string(),
            ]);
        }
        VideoCodec::H264 => {
            args.extend([
                "-preset".to_string(),
                "veryfast".to_string(),
                "-crf".to_string(),
                "23".to_string(),
                "-pix_fmt".to_string(),
                "yuv420p".to_string(),
            ]);
        }
    }

    if audio_input.is_some() {
        let audio_codec = match profile.container() {
            Container::Webm => "libopus",
            Container::Mp4 => "aac",
        };
        args.extend([
            "-c:a".to_string(),
            audio_codec.to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
    }

    // Fragmented output so stdout is playable as it streams
    if profile.container() == Container::Mp4 {
        args.extend([
            "-movflags".to_string(),
            "frag_keyframe+empty_moov".to_string(),
        ]);
    }

    args.extend([
        "-f".to_string(),
        profile.container().ffmpeg_muxer().to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Locate the ffmpeg binary.
///
/// Checks standard installation locations before falling back to a PATH
/// search, so the encoder works even under a limited launch environment.
fn find_ffmpeg() -> Result<PathBuf, RecorderError> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    } else {
        vec![]
    };

    for path in candidates {
        if path.exists() {
            tracing::debug!("Found ffmpeg at: {}", path.display());
            return Ok(path);
        }
    }

    let search_cmd = if cfg!(target_os = "windows") { "where" } else { "which" };
    let output = Command::new(search_cmd)
        .arg("ffmpeg")
        .output()
        .map_err(|e| RecorderError::EncoderStart(format!("failed to search PATH for ffmpeg: {e}")))?;

    if output.status.success() {
        let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    Err(RecorderError::EncoderStart(
        "ffmpeg not found; install it and make sure it is on PATH".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_args_webm_vp9() {
        let profile = MediaProfile::recording_default();
        let args = build_session_args(&profile, 1280, 720, 30, 48000, None);

        assert!(args.contains(&"libvpx-vp9".to_string()));
        assert!(args.contains(&"1280x720".to_string()));
        assert!(args.contains(&"rawvideo".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
        // Video-only session carries no audio arms
        assert!(!args.contains(&"s16le".to_string()));
        assert!(!args.contains(&"libopus".to_string()));
    }

    #[test]
    fn test_session_args_with_audio_pipe() {
        let profile = MediaProfile::recording_default();
        let fifo = PathBuf::from("/tmp/session/audio.pcm");
        let args = build_session_args(&profile, 640, 480, 30, 44100, Some(&fifo));

        assert!(args.contains(&"s16le".to_string()));
        assert!(args.contains(&"44100".to_string()));
        assert!(args.contains(&"/tmp/session/audio.pcm".to_string()));
        assert!(args.contains(&"libopus".to_string()));
    }

    #[test]
    fn test_session_args_mp4_streams_fragmented() {
        let profile = MediaProfile::parse("video/mp4; codecs=h264").expect("should parse");
        let args = build_session_args(&profile, 640, 480, 30, 48000, None);

        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"frag_keyframe+empty_moov".to_string()));
    }

    #[test]
    fn test_pcm_bytes_little_endian() {
        assert_eq!(pcm_bytes(&[0x0102, -1]), vec![0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn test_find_ffmpeg() {
        // Succeeds wherever ffmpeg is installed
        match find_ffmpeg() {
            Ok(path) => println!("Found ffmpeg at: {}", path.display()),
            Err(e) => println!("ffmpeg not found (expected on CI): {e}"),
        }
    }
}
