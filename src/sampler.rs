//! Periodic loudness sampling
//!
//! `SignalSampler` owns the audio capability for one recording session. On
//! `start()` it acquires the input and spawns a tick loop that pulls the
//! latest frame every `tick_interval` and emits a `LoudnessSample`. `stop()`
//! is idempotent, aborts the loop and drops the capture before returning.
//!
//! Must be started from within a tokio runtime.

use crate::audio::{AudioCapture, AudioSource, CaptureError, LoudnessCalibration};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default sampling period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Where the RMS/decibel computation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoudnessOffload {
    /// On the tick task itself
    #[default]
    Inline,
    /// On tokio's blocking pool, off the async workers
    Worker,
}

/// Sampler error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum SamplerError {
    #[error("Microphone unavailable: {0}")]
    DeviceUnavailable(#[source] CaptureError),

    #[error("Microphone lost during recording: {0}")]
    DeviceLost(#[source] CaptureError),
}

/// One raw loudness reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoudnessSample {
    /// Tick number within the session, starting at 1
    pub tick: u64,
    pub decibels: f32,
    pub captured_at: DateTime<Utc>,
}

/// Events emitted by a running sampler
#[derive(Debug, Clone)]
pub enum SamplerEvent {
    Loudness(LoudnessSample),
    /// Sent at most once; the sampler has stopped and released the input
    Failed(SamplerError),
}

/// Sampler settings
#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    pub tick_interval: Duration,
    pub calibration: LoudnessCalibration,
    pub offload: LoudnessOffload,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            calibration: LoudnessCalibration::default(),
            offload: LoudnessOffload::default(),
        }
    }
}

type SharedCapture = Arc<Mutex<Option<Box<dyn AudioCapture>>>>;

/// Microphone sampler
pub struct SignalSampler {
    source: Arc<dyn AudioSource>,
    settings: SamplerSettings,
    capture: SharedCapture,
    task: Option<JoinHandle<()>>,
}

impl SignalSampler {
    pub fn new(source: Arc<dyn AudioSource>, settings: SamplerSettings) -> Self {
        Self {
            source,
            settings,
            capture: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Whether the input is currently held and the tick loop running
    pub fn is_active(&self) -> bool {
        self.capture.lock().is_some()
    }

    /// Acquire the input and begin ticking.
    ///
    /// Any previous session is fully stopped first. On failure nothing stays
    /// acquired.
    pub fn start(&mut self, events: UnboundedSender<SamplerEvent>) -> Result<(), SamplerError> {
        self.stop();

        let capture = self.source.acquire().map_err(|e| {
            tracing::warn!("Sampler: could not acquire microphone: {}", e);
            SamplerError::DeviceUnavailable(e)
        })?;
        tracing::info!(
            "Sampler: started on '{}' every {}ms",
            capture.name(),
            self.settings.tick_interval.as_millis()
        );
        // Fresh slot per run: a tick loop still winding down after abort
        // can only ever release its own capture
        self.capture = Arc::new(Mutex::new(Some(capture)));

        self.task = Some(tokio::spawn(run_ticks(
            self.capture.clone(),
            self.settings,
            events,
        )));
        Ok(())
    }

    /// Halt ticking and release the input. Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(capture) = self.capture.lock().take() {
            tracing::info!("Sampler: stopped, releasing '{}'", capture.name());
            drop(capture);
        }
    }
}

impl Drop for SignalSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticks(
    capture: SharedCapture,
    settings: SamplerSettings,
    events: UnboundedSender<SamplerEvent>,
) {
    let period = settings.tick_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut frame: Vec<u8> = Vec::new();
    let mut tick: u64 = 0;

    loop {
        ticker.tick().await;
        tick += 1;

        // Guard is released before any await below
        let read = {
            let guard = capture.lock();
            match guard.as_ref() {
                Some(capture) => capture.read_frame(&mut frame),
                None => return,
            }
        };

        if let Err(e) = read {
            tracing::error!("Sampler: input failed on tick {}: {}", tick, e);
            capture.lock().take();
            let _ = events.send(SamplerEvent::Failed(SamplerError::DeviceLost(e)));
            return;
        }

        let (decibels, returned) =
            compute_loudness(settings.calibration, settings.offload, frame).await;
        frame = returned;

        let sample = LoudnessSample {
            tick,
            decibels,
            captured_at: Utc::now(),
        };
        tracing::trace!("Sampler: tick {} -> {:.1} dB", tick, decibels);

        if events.send(SamplerEvent::Loudness(sample)).is_err() {
            tracing::debug!("Sampler: no listener left, stopping tick loop");
            capture.lock().take();
            return;
        }
    }
}

/// Run the estimator according to the offload mode, handing the buffer back
async fn compute_loudness(
    calibration: LoudnessCalibration,
    offload: LoudnessOffload,
    frame: Vec<u8>,
) -> (f32, Vec<u8>) {
    match offload {
        LoudnessOffload::Inline => (calibration.estimate_bytes(&frame), frame),
        LoudnessOffload::Worker => {
            match tokio::task::spawn_blocking(move || (calibration.estimate_bytes(&frame), frame))
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Sampler: loudness worker failed: {}", e);
                    (calibration.floor_db, Vec::new())
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted audio source for tests
    #[derive(Default)]
    pub struct FakeSource {
        pub deny: bool,
        /// Number of frames served before the stream "fails"; None = never
        pub fail_after: Option<usize>,
        pub frame: Vec<u8>,
        /// Blocks every read this long, like a slow driver
        pub read_delay: Duration,
        pub acquired: Arc<AtomicUsize>,
        pub live: Arc<AtomicUsize>,
    }

    pub struct FakeCapture {
        frame: Vec<u8>,
        read_delay: Duration,
        fail_after: Option<usize>,
        reads: AtomicUsize,
        live: Arc<AtomicUsize>,
    }

    impl AudioSource for FakeSource {
        fn acquire(&self) -> Result<Box<dyn AudioCapture>, CaptureError> {
            if self.deny {
                return Err(CaptureError::OpenFailed("permission denied".to_string()));
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeCapture {
                frame: self.frame.clone(),
                read_delay: self.read_delay,
                fail_after: self.fail_after,
                reads: AtomicUsize::new(0),
                live: self.live.clone(),
            }))
        }
    }

    impl AudioCapture for FakeCapture {
        fn read_frame(&self, out: &mut Vec<u8>) -> Result<(), CaptureError> {
            if !self.read_delay.is_zero() {
                std::thread::sleep(self.read_delay);
            }
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(CaptureError::StreamFailed("unplugged".to_string()));
            }
            out.clear();
            out.extend_from_slice(&self.frame);
            Ok(())
        }

        fn name(&self) -> String {
            "fake".to_string()
        }
    }

    impl Drop for FakeCapture {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
