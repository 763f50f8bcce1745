//! Live recording session
//!
//! Wires the sampler to the smoother and publishes the resulting
//! `LiveEstimate` on a watch channel. The estimate exists only while a
//! session is running: it appears on the first smoothed value and is cleared
//! when the session stops.

use crate::audio::AudioSource;
use crate::sampler::{SamplerError, SamplerEvent, SamplerSettings, SignalSampler};
use crate::smoother::debounce;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Current smoothed decibel value of an active session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveEstimate {
    pub decibels: f32,
    pub updated_at: DateTime<Utc>,
}

/// One microphone recording session
pub struct RecordingSession {
    sampler: SignalSampler,
    window: Duration,
    tasks: Vec<JoinHandle<()>>,
    live: watch::Sender<Option<LiveEstimate>>,
    error: Arc<Mutex<Option<SamplerError>>>,
}

impl RecordingSession {
    pub fn new(source: Arc<dyn AudioSource>, settings: SamplerSettings, window: Duration) -> Self {
        let (live, _) = watch::channel(None);
        Self {
            sampler: SignalSampler::new(source, settings),
            window,
            tasks: Vec::new(),
            live,
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Start recording. Always tears down any previous session first.
    ///
    /// On `DeviceUnavailable` nothing is left running and the error is only
    /// returned here; the caller decides whether to retry.
    pub fn start(&mut self) -> Result<(), SamplerError> {
        self.stop();
        *self.error.lock() = None;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.sampler.start(event_tx) {
            self.stop();
            return Err(e);
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<f32>();
        let error_slot = self.error.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    SamplerEvent::Loudness(sample) => {
                        if raw_tx.send(sample.decibels).is_err() {
                            break;
                        }
                    }
                    SamplerEvent::Failed(e) => {
                        tracing::warn!("Session: recording ended: {}", e);
                        *error_slot.lock() = Some(e);
                        break;
                    }
                }
            }
            // raw_tx drops here, which discards any pending smoothed value
        });

        let (smoother, mut smoothed) = debounce(self.window, raw_rx).into_parts();
        let live = self.live.clone();
        let publish = tokio::spawn(async move {
            while let Some(decibels) = smoothed.recv().await {
                live.send_replace(Some(LiveEstimate {
                    decibels,
                    updated_at: Utc::now(),
                }));
            }
            live.send_replace(None);
        });

        self.tasks = vec![forward, smoother, publish];
        tracing::info!("Session: recording started");
        Ok(())
    }

    /// Stop sampling, cancel any pending smoothed value and clear the estimate.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.sampler.stop();
        let was_running = !self.tasks.is_empty();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.live.send_replace(None);
        if was_running {
            tracing::info!("Session: recording stopped");
        }
    }

    /// Whether the microphone is currently held
    pub fn is_recording(&self) -> bool {
        self.sampler.is_active()
    }

    /// Latest smoothed estimate, if any
    pub fn live_estimate(&self) -> Option<LiveEstimate> {
        *self.live.borrow()
    }

    /// Subscribe to estimate changes
    pub fn subscribe(&self) -> watch::Receiver<Option<LiveEstimate>> {
        self.live.subscribe()
    }

    /// Error that ended the last session mid-recording, reported once
    pub fn take_error(&self) -> Option<SamplerError> {
        self.error.lock().take()
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop();
    }
}
