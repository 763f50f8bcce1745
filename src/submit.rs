//! Reading submission
//!
//! A reading needs a known location and a decibel value. The value is the
//! live estimate when a recording is running, otherwise whatever the user
//! typed. Everything is validated before it reaches the store.

use crate::sample::{CandidateSample, LatLng, NoiseSample, ValidationError};
use crate::session::{LiveEstimate, RecordingSession};
use crate::store::{SampleStore, StoreError};

/// Manual reading shown before the user types anything
pub const DEFAULT_MANUAL_READING: &str = "70";

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Location unknown; wait for a location fix before submitting")]
    LocationUnknown,

    #[error("No reading captured yet; record for longer before submitting")]
    NoLiveReading,

    #[error("'{0}' is not a decibel value")]
    InvalidManualReading(String),

    #[error("Invalid reading: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Failed to store reading: {0}")]
    Store(#[from] StoreError),
}

/// Picks the value to submit: live estimate first, then the manual entry.
pub fn choose_decibels(live: Option<LiveEstimate>, manual: &str) -> Result<f64, SubmitError> {
    if let Some(estimate) = live {
        // Keep the one-decimal value the user saw, without f32 widening noise
        return Ok((f64::from(estimate.decibels) * 10.0).round() / 10.0);
    }

    let trimmed = manual.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| SubmitError::InvalidManualReading(trimmed.to_string()))
}

/// Validates and appends one reading.
pub fn submit_reading<S: SampleStore + ?Sized>(
    store: &S,
    location: Option<LatLng>,
    decibels: f64,
) -> Result<NoiseSample, SubmitError> {
    let location = location.ok_or(SubmitError::LocationUnknown)?;
    let validated = CandidateSample::new(location, decibels).validate()?;
    let stored = store.append(validated)?;

    tracing::info!(
        "Submitted {:.1} dB at {} as {}",
        stored.decibels,
        stored.location,
        stored.id
    );
    Ok(stored)
}

/// Full report flow: choose the value, submit it and, on success, end the
/// recording that produced it.
pub fn report_noise<S: SampleStore + ?Sized>(
    session: &mut RecordingSession,
    store: &S,
    location: Option<LatLng>,
    manual: &str,
) -> Result<NoiseSample, SubmitError> {
    let decibels = choose_decibels(session.live_estimate(), manual)?;
    let stored = submit_reading(store, location, decibels)?;
    if session.is_recording() {
        session.stop();
    }
    Ok(stored)
}

/// Submit only what the meter measured. Unlike `report_noise` there is no
/// manual fallback, so a session that never produced an estimate fails with
/// `NoLiveReading` and nothing is stored.
pub fn report_live_reading<S: SampleStore + ?Sized>(
    session: &mut RecordingSession,
    store: &S,
    location: Option<LatLng>,
) -> Result<NoiseSample, SubmitError> {
    let estimate = session.live_estimate().ok_or(SubmitError::NoLiveReading)?;
    let stored = submit_reading(store, location, choose_decibels(Some(estimate), "")?)?;
    if session.is_recording() {
        session.stop();
    }
    Ok(stored)
}
