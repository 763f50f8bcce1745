//! Colour ramp for the heat surface.

use serde::{Deserialize, Serialize};

/// Number of entries in a colour lookup table
pub const PALETTE_SIZE: usize = 256;

/// An sRGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GREEN: Rgb = Rgb::new(0, 128, 0);
    pub const YELLOW: Rgb = Rgb::new(255, 255, 0);
    pub const ORANGE: Rgb = Rgb::new(255, 165, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// CSS functional notation, e.g. `rgb(255, 0, 0)`
    pub fn to_css(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * t)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

/// A colour at a position in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub position: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(position: f64, color: Rgb) -> Self {
        Self { position, color }
    }
}

/// Piecewise-linear colour ramp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ColorStop>", into = "Vec<ColorStop>")]
pub struct Gradient {
    stops: Vec<ColorStop>,
}

impl Default for Gradient {
    fn default() -> Self {
        Self::new(vec![
            ColorStop::new(0.0, Rgb::GREEN),
            ColorStop::new(0.3, Rgb::YELLOW),
            ColorStop::new(0.6, Rgb::ORANGE),
            ColorStop::new(1.0, Rgb::RED),
        ])
    }
}

impl From<Vec<ColorStop>> for Gradient {
    fn from(stops: Vec<ColorStop>) -> Self {
        Self::new(stops)
    }
}

impl From<Gradient> for Vec<ColorStop> {
    fn from(gradient: Gradient) -> Self {
        gradient.stops
    }
}

impl Gradient {
    /// Stops are sorted by position; positions outside [0, 1] are clamped.
    pub fn new(mut stops: Vec<ColorStop>) -> Self {
        for stop in &mut stops {
            stop.position = if stop.position.is_nan() {
                0.0
            } else {
                stop.position.clamp(0.0, 1.0)
            };
        }
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { stops }
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Colour at `t`; before the first stop and after the last the end
    /// colours extend. An empty gradient is black.
    pub fn sample(&self, t: f64) -> Rgb {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Rgb::new(0, 0, 0);
        };
        if t <= first.position {
            return first.color;
        }
        if t >= last.position {
            return last.color;
        }

        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if t <= hi.position {
                let span = hi.position - lo.position;
                if span <= f64::EPSILON {
                    return hi.color;
                }
                return lo.color.lerp(hi.color, (t - lo.position) / span);
            }
        }
        last.color
    }

    /// Lookup table indexed by 8-bit intensity
    pub fn palette(&self) -> Vec<Rgb> {
        (0..PALETTE_SIZE)
            .map(|i| self.sample(i as f64 / (PALETTE_SIZE - 1) as f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stops() {
        let gradient = Gradient::default();
        assert_eq!(gradient.sample(0.0), Rgb::GREEN);
        assert_eq!(gradient.sample(0.3), Rgb::YELLOW);
        assert_eq!(gradient.sample(0.6), Rgb::ORANGE);
        assert_eq!(gradient.sample(1.0), Rgb::RED);
    }

    #[test]
    fn test_interpolates_between_stops() {
        let gradient = Gradient::default();
        // A quarter of the way from orange (255,165,0) to red (255,0,0)
        assert_eq!(gradient.sample(0.7), Rgb::new(255, 124, 0));
    }

    #[test]
    fn test_unsorted_stops_are_sorted() {
        let gradient = Gradient::new(vec![
            ColorStop::new(1.0, Rgb::RED),
            ColorStop::new(0.0, Rgb::GREEN),
        ]);
        assert_eq!(gradient.stops()[0].color, Rgb::GREEN);
        assert_eq!(gradient.sample(-1.0), Rgb::GREEN);
        assert_eq!(gradient.sample(2.0), Rgb::RED);
    }

    #[test]
    fn test_palette_endpoints() {
        let palette = Gradient::default().palette();
        assert_eq!(palette.len(), PALETTE_SIZE);
        assert_eq!(palette[0], Rgb::GREEN);
        assert_eq!(palette[255], Rgb::RED);
    }

    #[test]
    fn test_css_format() {
        assert_eq!(Rgb::new(255, 165, 0).to_css(), "rgb(255, 165, 0)");
    }

    #[test]
    fn test_empty_gradient_is_black() {
        assert_eq!(Gradient::new(Vec::new()).sample(0.5), Rgb::new(0, 0, 0));
    }
}
