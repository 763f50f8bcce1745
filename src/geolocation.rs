//! Device location with a non-blocking fallback
//!
//! A location provider either yields coordinates or an error. An error is
//! never fatal: the map centres on the configured fallback and shows a
//! warning instead.

use serde::{Deserialize, Serialize};

use crate::sample::LatLng;

/// New York City, used when no device location is available
pub const DEFAULT_FALLBACK: LatLng = LatLng::new(40.7128, -74.006);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeolocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out")]
    Timeout,
}

/// Platform location service
pub trait LocationProvider: Send + Sync {
    fn current_location(&self) -> Result<LatLng, GeolocationError>;
}

/// Provider that always answers with the same result
#[derive(Debug, Clone)]
pub struct FixedLocationProvider {
    location: Option<LatLng>,
}

impl FixedLocationProvider {
    pub fn new(location: LatLng) -> Self {
        Self {
            location: Some(location),
        }
    }

    /// A provider with no location service at all
    pub fn unavailable() -> Self {
        Self { location: None }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn current_location(&self) -> Result<LatLng, GeolocationError> {
        match self.location {
            Some(location) if location.is_valid() => Ok(location),
            Some(location) => Err(GeolocationError::Unavailable(format!(
                "invalid coordinates {}",
                location
            ))),
            None => Err(GeolocationError::Unavailable(
                "no location service".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Device,
    Fallback,
}

/// Where to centre, and what to tell the user about it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub coordinates: LatLng,
    pub source: LocationSource,
    pub warning: Option<String>,
}

impl ResolvedLocation {
    /// Whether the coordinates are the device's own
    pub fn is_device(&self) -> bool {
        self.source == LocationSource::Device
    }
}

pub fn resolve_location(
    result: Result<LatLng, GeolocationError>,
    fallback: LatLng,
) -> ResolvedLocation {
    match result {
        Ok(coordinates) => ResolvedLocation {
            coordinates,
            source: LocationSource::Device,
            warning: None,
        },
        Err(e) => {
            tracing::warn!("Geolocation: {}; using fallback {}", e, fallback);
            ResolvedLocation {
                coordinates: fallback,
                source: LocationSource::Fallback,
                warning: Some(format!("{}. Showing a default location instead.", e)),
            }
        }
    }
}

/// Asks the provider once and falls back on any error.
pub fn locate(provider: &dyn LocationProvider, fallback: LatLng) -> ResolvedLocation {
    resolve_location(provider.current_location(), fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_location_used_when_available() {
        let here = LatLng::new(6.5244, 3.3792);
        let resolved = locate(&FixedLocationProvider::new(here), DEFAULT_FALLBACK);
        assert_eq!(resolved.coordinates, here);
        assert!(resolved.is_device());
        assert!(resolved.warning.is_none());
    }

    #[test]
    fn test_unavailable_falls_back_with_warning() {
        let resolved = locate(&FixedLocationProvider::unavailable(), DEFAULT_FALLBACK);
        assert_eq!(resolved.coordinates, DEFAULT_FALLBACK);
        assert_eq!(resolved.source, LocationSource::Fallback);
        assert!(resolved.warning.is_some());
    }

    #[test]
    fn test_denied_falls_back() {
        let resolved = resolve_location(Err(GeolocationError::PermissionDenied), DEFAULT_FALLBACK);
        assert_eq!(resolved.coordinates, DEFAULT_FALLBACK);
        assert!(resolved
            .warning
            .unwrap()
            .starts_with("Location permission denied"));
    }

    #[test]
    fn test_invalid_fix_is_unavailable() {
        let provider = FixedLocationProvider::new(LatLng::new(95.0, 0.0));
        assert!(matches!(
            provider.current_location(),
            Err(GeolocationError::Unavailable(_))
        ));
    }
}
