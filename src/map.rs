//! Map state: the current batch and everything drawn from it.
//!
//! `NoiseMap` holds the last good batch of samples, the heat layer and
//! markers built from it, the viewport controller and the user-facing
//! banners. A failed refresh keeps the previous batch on screen and raises
//! an error banner instead of clearing the map.

use crate::config::Config;
use crate::feed::{FetchError, SampleFeed};
use crate::geocoding::SearchCandidate;
use crate::geolocation::ResolvedLocation;
use crate::heat::{HeatFrame, HeatLayer, HeatLayerOptions};
use crate::markers::{render_markers, Marker, MarkerStyle};
use crate::sample::NoiseSample;
use crate::store::SampleStore;
use crate::viewport::{MapView, Viewport, ViewportController, ZoomLimits};

/// Everything needed to paint one frame
#[derive(Debug)]
pub struct MapFrame<'a> {
    pub viewport: Viewport,
    /// `None` while the heat layer is hidden
    pub heat: Option<&'a HeatFrame>,
    pub markers: &'a [Marker],
    pub error: Option<&'a str>,
    pub warning: Option<&'a str>,
}

pub struct NoiseMap<V: MapView> {
    batch: Vec<NoiseSample>,
    heat: HeatLayer,
    marker_style: MarkerStyle,
    markers: Vec<Marker>,
    controller: ViewportController<V>,
    error: Option<String>,
    warning: Option<String>,
}

impl<V: MapView> NoiseMap<V> {
    pub fn new(
        view: V,
        heat_options: HeatLayerOptions,
        marker_style: MarkerStyle,
        zoom: ZoomLimits,
    ) -> Self {
        Self {
            batch: Vec::new(),
            heat: HeatLayer::new(heat_options),
            marker_style,
            markers: Vec::new(),
            controller: ViewportController::new(view, zoom),
            error: None,
            warning: None,
        }
    }

    pub fn from_config(view: V, config: &Config) -> Self {
        Self::new(view, config.heat.clone(), config.markers, config.map.zoom)
    }

    pub fn batch(&self) -> &[NoiseSample] {
        &self.batch
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn controller(&self) -> &ViewportController<V> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ViewportController<V> {
        &mut self.controller
    }

    pub fn heat_layer(&self) -> &HeatLayer {
        &self.heat
    }

    pub fn set_heat_visible(&mut self, visible: bool) {
        self.heat.set_visible(visible);
    }

    /// Replace the batch and rebuild heat points and markers. The viewport
    /// is left where it is.
    pub fn set_batch(&mut self, batch: Vec<NoiseSample>) {
        self.batch = batch;
        self.rebuild();
        self.error = None;
    }

    fn rebuild(&mut self) {
        self.heat.set_samples(&self.batch);
        self.markers = render_markers(&self.batch, &self.marker_style);
    }

    /// Apply the outcome of a fetch. Errors keep the current batch.
    pub fn apply_fetch(&mut self, result: Result<Vec<NoiseSample>, FetchError>) {
        match result {
            Ok(batch) => {
                tracing::debug!("Map: showing {} sample(s)", batch.len());
                self.set_batch(batch);
            }
            Err(e) => {
                tracing::warn!(
                    "Map: refresh failed, keeping {} sample(s): {}",
                    self.batch.len(),
                    e
                );
                self.error = Some(format!("Could not load noise data: {}", e));
            }
        }
    }

    /// Fetch a fresh batch and apply it. Returns whether it succeeded.
    pub async fn refresh<S>(&mut self, feed: &SampleFeed<S>) -> bool
    where
        S: SampleStore + ?Sized + 'static,
    {
        let result = feed.fetch().await;
        let ok = result.is_ok();
        self.apply_fetch(result);
        ok
    }

    /// Show a just-submitted sample before the next refresh brings it back.
    pub fn record_submitted(&mut self, sample: NoiseSample) {
        if self.batch.iter().any(|s| s.id == sample.id) {
            return;
        }
        self.batch.insert(0, sample);
        self.rebuild();
    }

    /// Centre on the resolved device location and show any fallback warning.
    pub fn apply_location(&mut self, location: &ResolvedLocation) {
        self.controller.on_device_location(location.coordinates);
        self.warning = location.warning.clone();
    }

    pub fn select_search_result(&mut self, candidate: &SearchCandidate) {
        self.controller.on_search_selection(candidate.location());
    }

    pub fn render(&mut self) -> MapFrame<'_> {
        let viewport = self.controller.viewport();
        MapFrame {
            viewport,
            heat: self.heat.render(&viewport),
            markers: &self.markers,
            error: self.error.as_deref(),
            warning: self.warning.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_support::FlakyStore;
    use crate::feed::RetryPolicy;
    use crate::geolocation::{resolve_location, GeolocationError, DEFAULT_FALLBACK};
    use crate::sample::{CandidateSample, LatLng};
    use crate::store::RecentQuery;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const LAGOS: LatLng = LatLng::new(6.5244, 3.3792);

    fn map() -> NoiseMap<Viewport> {
        NoiseMap::from_config(Viewport::new(LAGOS, 16.0, 320, 240), &Config::default())
    }

    fn seeded_store(count: usize) -> Arc<FlakyStore> {
        let store = Arc::new(FlakyStore::default());
        for i in 0..count {
            let location = LatLng::new(LAGOS.lat + i as f64 * 0.0001, LAGOS.lng);
            let sample = CandidateSample::new(location, 60.0 + i as f64 * 5.0)
                .validate()
                .unwrap();
            store.append(sample).unwrap();
        }
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_batch() {
        let store = seeded_store(5);
        let feed = SampleFeed::new(store.clone(), RecentQuery::default(), RetryPolicy::default());
        let mut map = map();

        assert!(map.refresh(&feed).await);
        assert_eq!(map.batch().len(), 5);
        assert!(map.error().is_none());

        store.failing.store(true, Ordering::SeqCst);
        assert!(!map.refresh(&feed).await);

        let frame = map.render();
        assert_eq!(frame.markers.len(), 5);
        assert!(frame.error.is_some());
        assert!(frame.heat.unwrap().painted_pixels() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_refresh_clears_error() {
        let store = seeded_store(2);
        let feed = SampleFeed::new(store.clone(), RecentQuery::default(), RetryPolicy::default());
        let mut map = map();

        store.failing.store(true, Ordering::SeqCst);
        map.refresh(&feed).await;
        assert!(map.error().is_some());
        assert!(map.batch().is_empty());

        store.failing.store(false, Ordering::SeqCst);
        map.refresh(&feed).await;
        assert!(map.error().is_none());
        assert_eq!(map.batch().len(), 2);
    }

    #[test]
    fn test_batch_change_does_not_move_viewport() {
        let mut map = map();
        let before = map.controller().viewport();
        map.set_batch(vec![NoiseSample {
            id: "far".to_string(),
            location: LatLng::new(40.7, -74.0),
            decibels: 90.0,
            timestamp: chrono::Utc::now(),
        }]);
        assert_eq!(map.controller().viewport(), before);
    }

    #[test]
    fn test_record_submitted_shows_immediately() {
        let mut map = map();
        let sample = NoiseSample {
            id: "new".to_string(),
            location: LAGOS,
            decibels: 75.0,
            timestamp: chrono::Utc::now(),
        };
        map.record_submitted(sample.clone());
        map.record_submitted(sample);

        assert_eq!(map.batch().len(), 1);
        assert_eq!(map.markers()[0].sample_id, "new");
    }

    #[test]
    fn test_fallback_location_sets_warning() {
        let mut map = map();
        let resolved = resolve_location(Err(GeolocationError::Timeout), DEFAULT_FALLBACK);
        map.apply_location(&resolved);

        assert_eq!(map.controller().view().center, DEFAULT_FALLBACK);
        assert_eq!(map.controller().view().zoom, 16.0);
        assert!(map.warning().is_some());
    }

    #[test]
    fn test_search_selection_recentres() {
        let mut map = map();
        map.select_search_result(&SearchCandidate {
            x: -0.1276,
            y: 51.5072,
            label: "London".to_string(),
        });
        let view = map.controller().view();
        assert_eq!(view.center, LatLng::new(51.5072, -0.1276));
        assert_eq!(view.zoom, 15.0);
    }

    #[test]
    fn test_hidden_heat_layer_still_shows_markers() {
        let mut map = map();
        map.record_submitted(NoiseSample {
            id: "a".to_string(),
            location: LAGOS,
            decibels: 75.0,
            timestamp: chrono::Utc::now(),
        });
        map.set_heat_visible(false);

        let frame = map.render();
        assert!(frame.heat.is_none());
        assert_eq!(frame.markers.len(), 1);
    }
}
