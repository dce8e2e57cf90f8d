//! Microphone capture using cpal
//!
//! The cpal input stream is not `Send`, so a dedicated thread owns it for
//! the track's lifetime and the handle only signals and joins. Device
//! channels are folded to mono i16 blocks before broadcast, and audio is
//! never routed back to the UI.

use super::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;

/// Sample blocks buffered per subscriber before older blocks are dropped
const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// How long to wait for the audio thread to report its configuration
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct MicrophoneOpened {
    label: String,
    sample_rate: u32,
}

/// Handle to the running microphone capture thread
pub struct MicrophoneTrack {
    label: String,
    sample_rate: u32,
    samples: broadcast::Sender<Arc<Vec<i16>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneTrack {
    /// Open the default input device and start streaming mono i16 blocks.
    pub fn open() -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let (samples, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = {
            let running = running.clone();
            let samples = samples.clone();
            std::thread::spawn(move || capture_loop(running, samples, ready_tx))
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(opened)) => {
                tracing::info!(
                    "Microphone opened: {} ({}Hz, mono)",
                    opened.label,
                    opened.sample_rate
                );
                Ok(Self {
                    label: opened.label,
                    sample_rate: opened.sample_rate,
                    samples,
                    running,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                Err(CaptureError::Backend(
                    "audio input did not start in time".to_string(),
                ))
            }
        }
    }

    /// Human-readable device name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Capture sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether the capture thread is still delivering samples
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to mono i16 sample blocks
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<i16>>> {
        self.samples.subscribe()
    }

    /// Sender half of the sample broadcast, for handing to an encoder
    pub(crate) fn samples(&self) -> broadcast::Sender<Arc<Vec<i16>>> {
        self.samples.clone()
    }

    /// Stop the capture thread and release the device
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MicrophoneTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    running: Arc<AtomicBool>,
    samples: broadcast::Sender<Arc<Vec<i16>>>,
    ready_tx: mpsc::Sender<Result<MicrophoneOpened, CaptureError>>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(CaptureError::NoMicrophone));
            return;
        }
    };
    let label = device.name().unwrap_or_else(|_| "Unknown device".to_string());

    let config = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(CaptureError::Backend(format!(
                "failed to read input configuration: {e}"
            ))));
            return;
        }
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    let stream = {
        let samples = samples.clone();
        let result = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = samples.send(Arc::new(fold_to_mono(data, channels)));
                },
                stream_error,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let shifted: Vec<i16> = data.iter().map(|&s| u16_to_i16(s)).collect();
                    let _ = samples.send(Arc::new(fold_to_mono(&shifted, channels)));
                },
                stream_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let scaled: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                    let _ = samples.send(Arc::new(fold_to_mono(&scaled, channels)));
                },
                stream_error,
                None,
            ),
            other => {
                running.store(false, Ordering::SeqCst);
                let _ = ready_tx.send(Err(CaptureError::Backend(format!(
                    "unsupported input sample format: {other:?}"
                ))));
                return;
            }
        };
        match result {
            Ok(s) => s,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                let _ = ready_tx.send(Err(CaptureError::Backend(format!(
                    "failed to build input stream: {e}"
                ))));
                return;
            }
        }
    };

    if let Err(e) = stream.play() {
        running.store(false, Ordering::SeqCst);
        let _ = ready_tx.send(Err(CaptureError::Backend(format!(
            "failed to start input stream: {e}"
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(MicrophoneOpened { label, sample_rate }));

    // The callback does the work; this thread just keeps the stream alive.
    while running.load(Ordering::SeqCst) {
        std::thread::park_timeout(Duration::from_millis(50));
    }

    drop(stream);
    running.store(false, Ordering::SeqCst);
    tracing::info!("Microphone capture thread stopped");
}

fn stream_error(err: cpal::StreamError) {
    tracing::error!("Audio stream error: {}", err);
}

/// Fold interleaved device channels to mono by averaging each sample group.
fn fold_to_mono(data: &[i16], num_channels: usize) -> Vec<i16> {
    match num_channels {
        0 | 1 => data.to_vec(),
        2 => data
            .chunks_exact(2)
            .map(|pair| {
                let left = pair[0] as i32;
                let right = pair[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect(),
        n => data
            .chunks_exact(n)
            .map(|group| {
                let sum: i32 = group.iter().map(|&s| s as i32).sum();
                (sum / n as i32) as i16
            })
            .collect(),
    }
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_mono_passthrough() {
        assert_eq!(fold_to_mono(&[1, -2, 3], 1), vec![1, -2, 3]);
    }

    #[test]
    fn test_fold_stereo_averages_pairs() {
        assert_eq!(fold_to_mono(&[100, 200, -50, 50], 2), vec![150, 0]);
    }

    #[test]
    fn test_fold_multichannel_averages_groups() {
        assert_eq!(fold_to_mono(&[30, 60, 90, 3, 6, 9], 3), vec![60, 6]);
    }

    #[test]
    fn test_u16_recenters_around_zero() {
        assert_eq!(u16_to_i16(32768), 0);
        assert_eq!(u16_to_i16(0), i16::MIN);
        assert_eq!(u16_to_i16(65535), i16::MAX);
    }

    #[test]
    fn test_f32_clamps_out_of_range() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    }
}
