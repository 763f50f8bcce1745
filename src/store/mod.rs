//! Sample persistence boundary
//!
//! The core only needs two things from persistence: append a validated
//! sample and list recent samples, optionally restricted to a region. The
//! store is always passed explicitly to whatever needs it.

pub mod memory;

pub use memory::MemorySampleStore;

use crate::sample::{LatLng, NoiseSample, ValidatedSample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on samples returned by a recent query
pub const DEFAULT_RECENT_LIMIT: usize = 1000;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt sample row '{id}': {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Inclusive geographic rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl BoundingBox {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Whether the point lies inside. Boxes crossing the antimeridian have
    /// `south_west.lng > north_east.lng`.
    pub fn contains(&self, point: LatLng) -> bool {
        let lat_ok = point.lat >= self.south_west.lat && point.lat <= self.north_east.lat;
        let lng_ok = if self.south_west.lng <= self.north_east.lng {
            point.lng >= self.south_west.lng && point.lng <= self.north_east.lng
        } else {
            point.lng >= self.south_west.lng || point.lng <= self.north_east.lng
        };
        lat_ok && lng_ok
    }
}

/// Parameters of a "fetch recent batch" request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentQuery {
    pub limit: usize,
    pub bounds: Option<BoundingBox>,
    pub since: Option<DateTime<Utc>>,
}

impl Default for RecentQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RECENT_LIMIT,
            bounds: None,
            since: None,
        }
    }
}

impl RecentQuery {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn within(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Whether a sample satisfies the region/time filters (not the limit)
    pub fn matches(&self, sample: &NoiseSample) -> bool {
        self.bounds.map_or(true, |b| b.contains(sample.location))
            && self.since.map_or(true, |since| sample.timestamp >= since)
    }
}

/// Durable append-only store of noise samples
pub trait SampleStore: Send + Sync {
    /// Persist a sample, assigning its id and timestamp
    fn append(&self, sample: ValidatedSample) -> Result<NoiseSample, StoreError>;

    /// Most recent samples first, filtered and capped by `query`
    fn list_recent(&self, query: &RecentQuery) -> Result<Vec<NoiseSample>, StoreError>;
}

impl<S: SampleStore + ?Sized> SampleStore for std::sync::Arc<S> {
    fn append(&self, sample: ValidatedSample) -> Result<NoiseSample, StoreError> {
        (**self).append(sample)
    }

    fn list_recent(&self, query: &RecentQuery) -> Result<Vec<NoiseSample>, StoreError> {
        (**self).list_recent(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_contains() {
        let bounds = BoundingBox::new(LatLng::new(6.0, 3.0), LatLng::new(7.0, 4.0));
        assert!(bounds.contains(LatLng::new(6.5, 3.5)));
        assert!(bounds.contains(LatLng::new(6.0, 4.0)));
        assert!(!bounds.contains(LatLng::new(5.9, 3.5)));
        assert!(!bounds.contains(LatLng::new(6.5, 4.1)));
    }

    #[test]
    fn test_bounding_box_across_antimeridian() {
        let bounds = BoundingBox::new(LatLng::new(-10.0, 170.0), LatLng::new(10.0, -170.0));
        assert!(bounds.contains(LatLng::new(0.0, 179.0)));
        assert!(bounds.contains(LatLng::new(0.0, -175.0)));
        assert!(!bounds.contains(LatLng::new(0.0, 0.0)));
    }

    #[test]
    fn test_default_query_limit() {
        assert_eq!(RecentQuery::default().limit, 1000);
        assert!(RecentQuery::default().bounds.is_none());
    }
}
