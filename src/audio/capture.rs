//! Microphone capture for the live noise meter
//!
//! An `AudioSource` grants an `AudioCapture`: the acquired input capability.
//! Holding the capture keeps the device open; dropping it releases the
//! device. The cpal implementation mixes input to mono, quantises it to the
//! unsigned 8-bit time-domain format and keeps only the most recent window,
//! which the sampler pulls on each tick.

use super::device::{get_device_display_name, get_recording_device};
use super::metering::{quantise_sample, BYTE_SILENCE};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;

/// Analyser transform size the meter is modelled on
pub const ANALYSER_FFT_SIZE: usize = 2048;

/// Default frame size in samples: the analyser's bin count, i.e. the newest
/// half of its transform window
pub const DEFAULT_FRAME_SIZE: usize = ANALYSER_FFT_SIZE / 2;

/// Capture error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("No audio input device available")]
    NoDevice,

    #[error("Audio input could not be opened: {0}")]
    OpenFailed(String),

    #[error("Audio stream failed: {0}")]
    StreamFailed(String),
}

/// Something that can grant exclusive access to an audio input
pub trait AudioSource: Send + Sync {
    /// Acquire the input. The returned capture owns the device until dropped.
    fn acquire(&self) -> Result<Box<dyn AudioCapture>, CaptureError>;
}

/// An acquired audio input
pub trait AudioCapture: Send {
    /// Copy the most recent time-domain window into `out` (oldest sample first).
    ///
    /// Fails once the underlying stream has reported an error.
    fn read_frame(&self, out: &mut Vec<u8>) -> Result<(), CaptureError>;

    /// Human-readable name of the input, for logging
    fn name(&self) -> String;
}

/// Fixed-size rolling window of the latest quantised samples
#[derive(Debug)]
pub struct FrameWindow {
    data: Vec<u8>,
    pos: usize,
}

impl FrameWindow {
    /// Create a window pre-filled with silence
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![BYTE_SILENCE; size.max(1)],
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Push quantised bytes, overwriting the oldest
    pub fn push_bytes(&mut self, bytes: impl IntoIterator<Item = u8>) {
        let len = self.data.len();
        for byte in bytes {
            self.data[self.pos] = byte;
            self.pos = (self.pos + 1) % len;
        }
    }

    /// Copy the window in chronological order
    pub fn copy_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.extend_from_slice(&self.data[self.pos..]);
        out.extend_from_slice(&self.data[..self.pos]);
    }
}

/// Audio source backed by a cpal input device
#[derive(Debug, Clone)]
pub struct CpalAudioSource {
    device_id: Option<String>,
    frame_size: usize,
}

impl CpalAudioSource {
    /// Use the device with the given stable id, falling back to the system default
    pub fn new(device_id: Option<String>, frame_size: usize) -> Self {
        Self {
            device_id,
            frame_size,
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn acquire(&self) -> Result<Box<dyn AudioCapture>, CaptureError> {
        let capture = CpalCapture::open(self.device_id.as_deref(), self.frame_size)?;
        Ok(Box::new(capture))
    }
}

/// Open cpal input stream feeding a `FrameWindow`
pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    window: Arc<Mutex<FrameWindow>>,
    errors: Receiver<String>,
    device_name: String,
}

impl CpalCapture {
    /// Open and start the input stream
    pub fn open(device_id: Option<&str>, frame_size: usize) -> Result<Self, CaptureError> {
        let device = get_recording_device(device_id).ok_or(CaptureError::NoDevice)?;
        let device_name = get_device_display_name(&device);

        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::OpenFailed(e.to_string()))?;
        let channels = (config.channels() as usize).max(1);

        tracing::info!(
            "Capture: opening '{}', {}Hz, {} channels, window={} samples",
            device_name,
            config.sample_rate(),
            channels,
            frame_size
        );

        let window = Arc::new(Mutex::new(FrameWindow::new(frame_size)));
        // Only the first stream error matters; later ones are dropped
        let (error_tx, error_rx) = crossbeam_channel::bounded::<String>(1);

        let callback_window = window.clone();
        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Mix to mono and quantise
                    let mono = data
                        .chunks(channels)
                        .map(|frame| quantise_sample(frame.iter().sum::<f32>() / channels as f32));
                    callback_window.lock().push_bytes(mono);
                },
                move |err| {
                    tracing::error!("Capture stream error: {}", err);
                    let _ = error_tx.try_send(err.to_string());
                },
                None,
            )
            .map_err(|e| CaptureError::OpenFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::OpenFailed(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            window,
            errors: error_rx,
            device_name,
        })
    }
}

impl AudioCapture for CpalCapture {
    fn read_frame(&self, out: &mut Vec<u8>) -> Result<(), CaptureError> {
        if let Ok(message) = self.errors.try_recv() {
            return Err(CaptureError::StreamFailed(message));
        }

        self.window.lock().copy_into(out);
        Ok(())
    }

    fn name(&self) -> String {
        self.device_name.clone()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        // Dropping the stream stops the callback and releases the device
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("Capture: released '{}'", self.device_name);
        }
    }
}
