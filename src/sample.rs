//! Noise sample data model
//!
//! A `NoiseSample` is a geotagged decibel reading owned by the sample store.
//! Candidates coming from the UI or the live meter are validated into a
//! `ValidatedSample` before anything is allowed to persist them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest admissible decibel value for a stored sample
pub const MIN_DECIBELS: f64 = 0.0;

/// Highest admissible decibel value for a stored sample
pub const MAX_DECIBELS: f64 = 150.0;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both coordinates are finite and within their geographic bounds
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// A persisted noise reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseSample {
    /// Unique identifier assigned by the store
    pub id: String,
    #[serde(flatten)]
    pub location: LatLng,
    /// Uncalibrated loudness proxy in [0, 150]
    pub decibels: f64,
    /// Capture time, assigned by the store
    pub timestamp: DateTime<Utc>,
}

/// Reasons a candidate sample is not admissible
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Decibel value {0} is outside [0, 150]")]
    DecibelsOutOfRange(f64),

    #[error("Field '{0}' is not a finite number")]
    NotFinite(&'static str),
}

/// An unvalidated `{lat, lng, decibels}` triple headed for the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateSample {
    pub lat: f64,
    pub lng: f64,
    pub decibels: f64,
}

impl CandidateSample {
    pub fn new(location: LatLng, decibels: f64) -> Self {
        Self {
            lat: location.lat,
            lng: location.lng,
            decibels,
        }
    }

    /// Check bounds without clamping. Any out-of-range field rejects the whole sample.
    pub fn validate(self) -> Result<ValidatedSample, ValidationError> {
        if !self.lat.is_finite() {
            return Err(ValidationError::NotFinite("lat"));
        }
        if !self.lng.is_finite() {
            return Err(ValidationError::NotFinite("lng"));
        }
        if !self.decibels.is_finite() {
            return Err(ValidationError::NotFinite("decibels"));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ValidationError::LatitudeOutOfRange(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(ValidationError::LongitudeOutOfRange(self.lng));
        }
        if !(MIN_DECIBELS..=MAX_DECIBELS).contains(&self.decibels) {
            return Err(ValidationError::DecibelsOutOfRange(self.decibels));
        }

        Ok(ValidatedSample {
            location: LatLng::new(self.lat, self.lng),
            decibels: self.decibels,
        })
    }
}

/// A candidate that passed validation; the only thing a `SampleStore` accepts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedSample {
    location: LatLng,
    decibels: f64,
}

impl ValidatedSample {
    pub fn location(&self) -> LatLng {
        self.location
    }

    pub fn decibels(&self) -> f64 {
        self.decibels
    }
}
