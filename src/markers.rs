//! One circle marker per reading.

use serde::{Deserialize, Serialize};

use crate::heat::{intensity_weight, Rgb};
use crate::sample::{LatLng, NoiseSample};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    /// Smallest marker radius in metres
    pub min_radius: f64,
    /// Metres of radius per decibel above 40
    pub radius_scale: f64,
    pub fill_opacity: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            min_radius: 20.0,
            radius_scale: 0.8,
            fill_opacity: 0.6,
        }
    }
}

impl MarkerStyle {
    pub fn radius(&self, decibels: f64) -> f64 {
        ((decibels - 40.0) * self.radius_scale).max(self.min_radius)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub sample_id: String,
    pub center: LatLng,
    pub radius: f64,
    pub color: Rgb,
    pub fill_opacity: f64,
    pub decibels: f64,
}

impl Marker {
    /// Popup text, e.g. `72.5 dB`
    pub fn label(&self) -> String {
        format!("{:.1} dB", self.decibels)
    }
}

/// Marker radius with the default style
pub fn marker_radius(decibels: f64) -> f64 {
    MarkerStyle::default().radius(decibels)
}

/// Green at 40 dB through to red at 120 dB
pub fn marker_color(decibels: f64) -> Rgb {
    let intensity = intensity_weight(decibels);
    Rgb::new(
        (255.0 * intensity).floor() as u8,
        (255.0 * (1.0 - intensity)).floor() as u8,
        0,
    )
}

pub fn render_markers(samples: &[NoiseSample], style: &MarkerStyle) -> Vec<Marker> {
    samples
        .iter()
        .map(|sample| Marker {
            sample_id: sample.id.clone(),
            center: sample.location,
            radius: style.radius(sample.decibels),
            color: marker_color(sample.decibels),
            fill_opacity: style.fill_opacity,
            decibels: sample.decibels,
        })
        .collect()
}
