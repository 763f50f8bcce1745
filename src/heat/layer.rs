//! Heat layer: grid aggregation, disc stamping and colourisation.

use std::collections::BTreeMap;

use super::gradient::Rgb;
use super::{HeatLayerOptions, HeatPoint};
use crate::sample::NoiseSample;
use crate::viewport::Viewport;

/// Zoom levels beyond which the zoom falloff stops halving
const MAX_ZOOM_FALLOFF: f64 = 12.0;

/// A merged point in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    x: f64,
    y: f64,
    weight: f64,
}

/// Merges points that fall into the same `(radius + blur) / 2` pixel cell.
///
/// Cells are anchored to world pixels so panning does not reshuffle them.
/// Each merged point sits at the weighted centroid of its members, with its
/// value the summed weight scaled for zoom and capped at `max`. Points more
/// than `radius + blur` outside the viewport are ignored.
pub fn aggregate(
    points: &[HeatPoint],
    options: &HeatLayerOptions,
    viewport: &Viewport,
) -> Vec<GridPoint> {
    let reach = options.radius + options.blur;
    let cell_size = (reach / 2.0).max(1.0);
    let width = f64::from(viewport.width);
    let height = f64::from(viewport.height);
    let falloff = (options.max_zoom - viewport.zoom).clamp(0.0, MAX_ZOOM_FALLOFF);
    let zoom_scale = 1.0 / 2f64.powf(falloff);
    let (origin_x, origin_y) = viewport.pixel_origin();

    let mut grid: BTreeMap<(i64, i64), Cell> = BTreeMap::new();
    for point in points {
        let (x, y) = viewport.project(point.location);
        if !(x >= -reach && y >= -reach && x <= width + reach && y <= height + reach) {
            continue;
        }

        let key = (
            ((y + origin_y) / cell_size).floor() as i64,
            ((x + origin_x) / cell_size).floor() as i64,
        );
        let weight = point.weight * zoom_scale;

        grid.entry(key)
            .and_modify(|cell| {
                let total = cell.weight + weight;
                if total > 0.0 {
                    cell.x = (cell.x * cell.weight + x * weight) / total;
                    cell.y = (cell.y * cell.weight + y * weight) / total;
                }
                cell.weight = total;
            })
            .or_insert(Cell { x, y, weight });
    }

    grid.into_values()
        .map(|cell| GridPoint {
            x: cell.x.round() as i64,
            y: cell.y.round() as i64,
            value: cell.weight.min(options.max),
        })
        .collect()
}

/// Precomputed disc with a smoothstep edge
#[derive(Debug, Clone)]
struct Kernel {
    reach: i64,
    values: Vec<f32>,
}

impl Kernel {
    fn new(radius: f64, blur: f64) -> Self {
        let radius = radius.max(0.0);
        let blur = blur.max(0.0);
        let inner = (radius - blur).max(0.0);
        let outer = radius + blur;
        let reach = outer.ceil() as i64;
        let side = (2 * reach + 1) as usize;

        let mut values = Vec::with_capacity(side * side);
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let d = ((dx * dx + dy * dy) as f64).sqrt();
                let v = if d <= inner {
                    1.0
                } else if d >= outer {
                    0.0
                } else {
                    let t = (d - inner) / (outer - inner);
                    1.0 - t * t * (3.0 - 2.0 * t)
                };
                values.push(v as f32);
            }
        }
        Self { reach, values }
    }

    fn side(&self) -> i64 {
        2 * self.reach + 1
    }
}

/// Coloured RGBA pixels of one render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, 4 bytes per pixel
    pub rgba: Vec<u8>,
}

impl HeatFrame {
    fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]])
    }

    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.pixel(x, y).map_or(0, |p| p[3])
    }

    /// Number of pixels with any coverage
    pub fn painted_pixels(&self) -> usize {
        self.rgba.chunks_exact(4).filter(|p| p[3] > 0).count()
    }
}

/// Render resources; released whenever the layer is hidden
struct Surface {
    accum: Vec<f32>,
    frame: HeatFrame,
    kernel: Kernel,
    palette: Vec<Rgb>,
}

impl Surface {
    fn new(options: &HeatLayerOptions, width: u32, height: u32) -> Self {
        Self {
            accum: vec![0.0; width as usize * height as usize],
            frame: HeatFrame::blank(width, height),
            kernel: Kernel::new(options.radius, options.blur),
            palette: options.gradient.palette(),
        }
    }

    /// Clears in place, reallocating only when the size changed
    fn reset(&mut self, width: u32, height: u32) {
        let pixels = width as usize * height as usize;
        if self.frame.width != width || self.frame.height != height {
            self.accum.resize(pixels, 0.0);
            self.frame.rgba.resize(pixels * 4, 0);
            self.frame.width = width;
            self.frame.height = height;
        }
        self.accum.fill(0.0);
    }

    fn stamp(&mut self, point: &GridPoint, alpha: f32) {
        let width = i64::from(self.frame.width);
        let height = i64::from(self.frame.height);
        let reach = self.kernel.reach;
        let side = self.kernel.side();

        for ky in 0..side {
            let y = point.y + ky - reach;
            if y < 0 || y >= height {
                continue;
            }
            for kx in 0..side {
                let x = point.x + kx - reach;
                if x < 0 || x >= width {
                    continue;
                }
                let source = self.kernel.values[(ky * side + kx) as usize] * alpha;
                if source <= 0.0 {
                    continue;
                }
                // Source-over compositing of a black pixel with alpha `source`
                let dst = &mut self.accum[(y * width + x) as usize];
                *dst += source * (1.0 - *dst);
            }
        }
    }

    fn colorize(&mut self) {
        for (alpha, pixel) in self.accum.iter().zip(self.frame.rgba.chunks_exact_mut(4)) {
            let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
            if a == 0 {
                pixel.copy_from_slice(&[0, 0, 0, 0]);
            } else {
                let color = self.palette[a as usize];
                pixel.copy_from_slice(&[color.r, color.g, color.b, a]);
            }
        }
    }
}

/// Heat layer bound to one map view
pub struct HeatLayer {
    options: HeatLayerOptions,
    points: Vec<HeatPoint>,
    visible: bool,
    surface: Option<Surface>,
    drawn_for: Option<Viewport>,
}

impl HeatLayer {
    pub fn new(options: HeatLayerOptions) -> Self {
        Self {
            options,
            points: Vec::new(),
            visible: true,
            surface: None,
            drawn_for: None,
        }
    }

    pub fn options(&self) -> &HeatLayerOptions {
        &self.options
    }

    /// Replace the tunables; the surface is rebuilt on the next render.
    pub fn set_options(&mut self, options: HeatLayerOptions) {
        self.options = options;
        self.surface = None;
        self.drawn_for = None;
    }

    pub fn points(&self) -> &[HeatPoint] {
        &self.points
    }

    /// Swap in a new batch, keeping the surface for the next redraw.
    pub fn set_samples(&mut self, samples: &[NoiseSample]) {
        self.points.clear();
        self.points.extend(samples.iter().map(HeatPoint::from));
        self.drawn_for = None;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Hiding releases all render resources; showing again redraws from the
    /// current batch.
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        self.drawn_for = None;
        if !visible {
            self.surface = None;
            tracing::debug!("Heat layer hidden, surface released");
        }
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// Draws the current batch for `viewport`, reusing the previous frame if
    /// neither changed. `None` while hidden.
    pub fn render(&mut self, viewport: &Viewport) -> Option<&HeatFrame> {
        if !self.visible {
            return None;
        }

        if self.drawn_for != Some(*viewport) || self.surface.is_none() {
            let grid = aggregate(&self.points, &self.options, viewport);
            let max = if self.options.max > 0.0 { self.options.max } else { 1.0 };
            let min_opacity = self.options.min_opacity;

            let options = &self.options;
            let surface = self
                .surface
                .get_or_insert_with(|| Surface::new(options, viewport.width, viewport.height));
            surface.reset(viewport.width, viewport.height);
            for point in &grid {
                let alpha = (point.value / max).max(min_opacity).min(1.0) as f32;
                surface.stamp(point, alpha);
            }
            surface.colorize();

            tracing::trace!(
                "Heat layer drew {} point(s) from {} sample(s)",
                grid.len(),
                self.points.len()
            );
            self.drawn_for = Some(*viewport);
        }

        self.surface.as_ref().map(|s| &s.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heat::gradient::Rgb;
    use crate::sample::LatLng;
    use chrono::Utc;

    const CENTER: LatLng = LatLng::new(6.5244, 3.3792);

    fn sample(id: &str, location: LatLng, decibels: f64) -> NoiseSample {
        NoiseSample {
            id: id.to_string(),
            location,
            decibels,
            timestamp: Utc::now(),
        }
    }

    fn viewport(zoom: f64) -> Viewport {
        Viewport::new(CENTER, zoom, 200, 160)
    }

    #[test]
    fn test_empty_batch_renders_blank() {
        let mut layer = HeatLayer::new(HeatLayerOptions::default());
        let frame = layer.render(&viewport(17.0)).unwrap();
        assert_eq!(frame.painted_pixels(), 0);
        assert_eq!(frame.rgba.len(), 200 * 160 * 4);
    }

    #[test]
    fn test_loud_point_saturates_centre() {
        let mut layer = HeatLayer::new(HeatLayerOptions::default());
        layer.set_samples(&[sample("a", CENTER, 120.0)]);

        let frame = layer.render(&viewport(17.0)).unwrap();
        let centre = frame.pixel(100, 80).unwrap();
        assert_eq!(centre[3], 255);
        assert_eq!(&centre[..3], &[Rgb::RED.r, Rgb::RED.g, Rgb::RED.b]);

        // Nothing beyond radius + blur
        assert_eq!(frame.alpha(100 + 61, 80), 0);
        assert_eq!(frame.alpha(0, 0), 0);
    }

    #[test]
    fn test_quiet_point_drawn_at_min_opacity() {
        let mut layer = HeatLayer::new(HeatLayerOptions::default());
        layer.set_samples(&[sample("a", CENTER, 40.0)]);

        let frame = layer.render(&viewport(17.0)).unwrap();
        assert!((76..=77).contains(&frame.alpha(100, 80)));
    }

    #[test]
    fn test_zoom_below_max_halves_contribution() {
        let mut layer = HeatLayer::new(HeatLayerOptions::default());
        layer.set_samples(&[sample("a", CENTER, 120.0)]);

        // Two levels below max zoom: 1.0 * 1/4 = 0.25, alpha 0.25 / 0.5
        let frame = layer.render(&viewport(15.0)).unwrap();
        assert!((127..=128).contains(&frame.alpha(100, 80)));
    }

    #[test]
    fn test_nearby_points_merge_into_one_cell() {
        let options = HeatLayerOptions::default();
        let vp = viewport(17.0);
        let points = [
            HeatPoint { location: CENTER, weight: 0.2 },
            HeatPoint { location: CENTER, weight: 0.2 },
        ];
        let grid = aggregate(&points, &options, &vp);
        assert_eq!(grid.len(), 1);
        assert!((grid[0].value - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_merged_value_capped_at_max() {
        let options = HeatLayerOptions::default();
        let points = vec![HeatPoint { location: CENTER, weight: 1.0 }; 4];
        let grid = aggregate(&points, &options, &viewport(17.0));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0].value, 0.5);
    }

    #[test]
    fn test_points_far_outside_viewport_ignored() {
        let options = HeatLayerOptions::default();
        let points = [
            HeatPoint { location: CENTER, weight: 1.0 },
            HeatPoint { location: LatLng::new(40.7128, -74.006), weight: 1.0 },
        ];
        assert_eq!(aggregate(&points, &options, &viewport(17.0)).len(), 1);
    }

    #[test]
    fn test_toggle_off_on_reproduces_frame() {
        let mut layer = HeatLayer::new(HeatLayerOptions::default());
        layer.set_samples(&[
            sample("a", CENTER, 95.0),
            sample("b", LatLng::new(CENTER.lat + 0.0002, CENTER.lng), 70.0),
        ]);
        let vp = viewport(17.0);
        let before = layer.render(&vp).unwrap().clone();

        layer.set_visible(false);
        assert!(!layer.has_surface());
        assert!(layer.render(&vp).is_none());

        layer.set_visible(true);
        let after = layer.render(&vp).unwrap();
        assert_eq!(&before, after);
    }

    #[test]
    fn test_new_batch_reuses_surface() {
        let mut layer = HeatLayer::new(HeatLayerOptions::default());
        let vp = viewport(17.0);
        layer.set_samples(&[sample("a", CENTER, 95.0)]);
        let first = layer.render(&vp).unwrap().rgba.as_ptr();

        layer.set_samples(&[sample("b", CENTER, 60.0)]);
        let frame = layer.render(&vp).unwrap();
        assert_eq!(frame.rgba.as_ptr(), first);
        assert!(frame.alpha(100, 80) < 255);
    }

    #[test]
    fn test_same_input_same_frame() {
        let batch = [
            sample("a", CENTER, 95.0),
            sample("b", LatLng::new(CENTER.lat, CENTER.lng + 0.001), 82.0),
        ];
        let vp = viewport(16.0);

        let mut forward = HeatLayer::new(HeatLayerOptions::default());
        forward.set_samples(&batch);
        let mut reversed = HeatLayer::new(HeatLayerOptions::default());
        reversed.set_samples(&[batch[1].clone(), batch[0].clone()]);

        assert_eq!(forward.render(&vp), reversed.render(&vp));
    }
}
