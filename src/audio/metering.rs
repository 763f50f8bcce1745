//! Loudness estimation for the live noise meter
//!
//! Converts a window of time-domain amplitude samples into an uncalibrated
//! decibel proxy: RMS of the normalised signal, `20 * log10(rms) + offset`,
//! clamped to a display range. The constants are heuristics, not an SPL
//! calibration.

use serde::{Deserialize, Serialize};

/// Centre value of an unsigned 8-bit time-domain frame (silence)
pub const BYTE_SILENCE: u8 = 128;

/// Loudness estimate constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessCalibration {
    /// Added to the dBFS value to land ambient sound in a usable range
    pub offset_db: f32,
    /// Lower clamp; also the result for silence
    pub floor_db: f32,
    /// Upper clamp
    pub ceiling_db: f32,
}

impl Default for LoudnessCalibration {
    fn default() -> Self {
        Self {
            offset_db: 90.0,
            floor_db: 40.0,
            ceiling_db: 120.0,
        }
    }
}

impl LoudnessCalibration {
    /// Map an RMS amplitude to the clamped decibel proxy, rounded to 0.1 dB.
    ///
    /// Silence (rms = 0) and non-finite input land on the floor instead of
    /// propagating `-inf`/`NaN`.
    pub fn decibels_from_rms(&self, rms: f32) -> f32 {
        if !rms.is_finite() || rms <= 0.0 {
            return self.floor_db;
        }

        let db = amplitude_to_db(rms) + self.offset_db;
        if !db.is_finite() {
            return self.floor_db;
        }

        round_to_tenth(db.clamp(self.floor_db, self.ceiling_db))
    }

    /// Estimate loudness of an unsigned 8-bit frame (128 = zero amplitude)
    pub fn estimate_bytes(&self, frame: &[u8]) -> f32 {
        self.decibels_from_rms(rms_of_bytes(frame))
    }

    /// Estimate loudness of a float frame already normalised to [-1, 1]
    pub fn estimate_samples(&self, samples: &[f32]) -> f32 {
        self.decibels_from_rms(calculate_rms(samples))
    }
}

/// Normalise an unsigned 8-bit amplitude to [-1, 1)
#[inline]
pub fn normalise_byte(byte: u8) -> f32 {
    byte as f32 / 128.0 - 1.0
}

/// Quantise a float sample to the unsigned 8-bit time-domain representation
#[inline]
pub fn quantise_sample(sample: f32) -> u8 {
    if !sample.is_finite() {
        return BYTE_SILENCE;
    }
    (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8
}

/// RMS of an unsigned 8-bit frame after normalisation
pub fn rms_of_bytes(frame: &[u8]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame
        .iter()
        .map(|&b| {
            let amplitude = normalise_byte(b);
            amplitude * amplitude
        })
        .sum();
    (sum_sq / frame.len() as f32).sqrt()
}

/// Calculate RMS level for a buffer of samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Convert linear amplitude to decibels
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        -f32::INFINITY
    }
}

fn round_to_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
