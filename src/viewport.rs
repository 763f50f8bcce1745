//! Map viewport and recentring policy
//!
//! `Viewport` is a Web-Mercator window: a centre, a fractional zoom and a
//! pixel size. `ViewportController` owns the map view it drives and only
//! moves it for explicit location intents (device fix, search pick, zoom
//! buttons). New sample batches never move the map.

use serde::{Deserialize, Serialize};

use crate::sample::LatLng;

/// Pixel size of one tile at zoom 0
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the Web-Mercator projection
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

pub const DEFAULT_SEARCH_ZOOM: f64 = 15.0;
pub const DEFAULT_MIN_ZOOM: f64 = 0.0;
pub const DEFAULT_MAX_ZOOM: f64 = 19.0;

/// Visible geographic window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64, width: u32, height: u32) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
        }
    }

    /// Width of the whole world in pixels at this zoom
    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    /// Absolute pixel position of a coordinate at this zoom
    pub fn project_world(&self, point: LatLng) -> (f64, f64) {
        let size = self.world_size();
        let lat = point.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = (point.lng + 180.0) / 360.0 * size;
        let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * size;
        (x, y)
    }

    /// Absolute pixel position of the top-left corner
    pub fn pixel_origin(&self) -> (f64, f64) {
        let (cx, cy) = self.project_world(self.center);
        (
            cx - f64::from(self.width) / 2.0,
            cy - f64::from(self.height) / 2.0,
        )
    }

    /// Position of a coordinate relative to the top-left corner
    pub fn project(&self, point: LatLng) -> (f64, f64) {
        let (x, y) = self.project_world(point);
        let (ox, oy) = self.pixel_origin();
        (x - ox, y - oy)
    }
}

/// A map instance the controller can move
pub trait MapView {
    fn center(&self) -> LatLng;
    fn zoom(&self) -> f64;
    fn set_view(&mut self, center: LatLng, zoom: f64);
    fn size(&self) -> (u32, u32);

    fn viewport(&self) -> Viewport {
        let (width, height) = self.size();
        Viewport::new(self.center(), self.zoom(), width, height)
    }
}

impl MapView for Viewport {
    fn center(&self) -> LatLng {
        self.center
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.center = center;
        self.zoom = zoom;
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Zoom behaviour of the controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomLimits {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub search_zoom: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            search_zoom: DEFAULT_SEARCH_ZOOM,
        }
    }
}

pub struct ViewportController<V: MapView> {
    view: V,
    limits: ZoomLimits,
    device_location: Option<LatLng>,
}

impl<V: MapView> ViewportController<V> {
    pub fn new(view: V, limits: ZoomLimits) -> Self {
        Self {
            view,
            limits,
            device_location: None,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn viewport(&self) -> Viewport {
        self.view.viewport()
    }

    /// Recentre on a new device fix, keeping the current zoom. Repeating the
    /// same fix does nothing. Returns whether the view moved.
    pub fn on_device_location(&mut self, location: LatLng) -> bool {
        if self.device_location == Some(location) {
            return false;
        }
        self.device_location = Some(location);
        let zoom = self.view.zoom();
        self.view.set_view(location, zoom);
        tracing::debug!("Viewport: recentred on device location {}", location);
        true
    }

    /// Recentre on a chosen search result at the search zoom.
    pub fn on_search_selection(&mut self, target: LatLng) {
        self.view.set_view(target, self.clamp_zoom(self.limits.search_zoom));
        tracing::debug!("Viewport: recentred on search result {}", target);
    }

    pub fn zoom_in(&mut self) {
        self.zoom_by(1.0);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_by(-1.0);
    }

    fn zoom_by(&mut self, delta: f64) {
        let zoom = self.clamp_zoom(self.view.zoom() + delta);
        let center = self.view.center();
        self.view.set_view(center, zoom);
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.limits.min_zoom, self.limits.max_zoom)
    }
}
