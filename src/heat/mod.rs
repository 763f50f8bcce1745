//! Continuous noise intensity surface
//!
//! Readings become weighted points, points are merged on a coarse pixel
//! grid, and every merged point stamps a blurred disc onto an alpha surface
//! which is then coloured through the gradient palette.

pub mod gradient;
pub mod layer;

pub use gradient::{ColorStop, Gradient, Rgb};
pub use layer::{aggregate, GridPoint, HeatFrame, HeatLayer};

use serde::{Deserialize, Serialize};

use crate::sample::{LatLng, NoiseSample};

/// Loudness that maps to zero weight
pub const WEIGHT_FLOOR_DB: f64 = 40.0;

/// Loudness span from zero to full weight
pub const WEIGHT_SPAN_DB: f64 = 80.0;

/// Normalised intensity of a reading: 40 dB and below is 0, 120 dB and
/// above is 1.
pub fn intensity_weight(decibels: f64) -> f64 {
    if decibels.is_nan() {
        return 0.0;
    }
    ((decibels - WEIGHT_FLOOR_DB) / WEIGHT_SPAN_DB).clamp(0.0, 1.0)
}

/// Tunables of the heat surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatLayerOptions {
    /// Radius of full influence around a point, in pixels
    pub radius: f64,
    /// Width of the soft edge on either side of `radius`, in pixels
    pub blur: f64,
    /// Zoom at and above which points count at full weight; each level
    /// below halves their contribution
    pub max_zoom: f64,
    /// Accumulated value that renders fully opaque
    pub max: f64,
    /// Alpha floor for any drawn point
    pub min_opacity: f64,
    pub gradient: Gradient,
}

impl Default for HeatLayerOptions {
    fn default() -> Self {
        Self {
            radius: 50.0,
            blur: 10.0,
            max_zoom: 17.0,
            max: 0.5,
            min_opacity: 0.3,
            gradient: Gradient::default(),
        }
    }
}

/// A weighted location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPoint {
    pub location: LatLng,
    pub weight: f64,
}

impl From<&NoiseSample> for HeatPoint {
    fn from(sample: &NoiseSample) -> Self {
        Self {
            location: sample.location,
            weight: intensity_weight(sample.decibels),
        }
    }
}
