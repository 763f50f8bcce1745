//! In-memory sample store
//!
//! Same ordering and filtering semantics as the SQLite store, without
//! durability. Useful for tests and throwaway sessions.

use super::{RecentQuery, SampleStore, StoreError};
use crate::sample::{NoiseSample, ValidatedSample};
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<NoiseSample>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already-persisted samples (e.g. imported data)
    pub fn with_samples(samples: Vec<NoiseSample>) -> Self {
        Self {
            samples: RwLock::new(samples),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

impl SampleStore for MemorySampleStore {
    fn append(&self, sample: ValidatedSample) -> Result<NoiseSample, StoreError> {
        let stored = NoiseSample {
            id: Uuid::new_v4().to_string(),
            location: sample.location(),
            decibels: sample.decibels(),
            timestamp: Utc::now(),
        };
        self.samples.write().push(stored.clone());
        tracing::debug!("Stored sample {} in memory", stored.id);
        Ok(stored)
    }

    fn list_recent(&self, query: &RecentQuery) -> Result<Vec<NoiseSample>, StoreError> {
        let samples = self.samples.read();
        // Newest first; among equal timestamps the later insert wins
        let mut matching: Vec<(usize, &NoiseSample)> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| query.matches(s))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));

        Ok(matching
            .into_iter()
            .take(query.limit)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{CandidateSample, LatLng};
    use crate::store::BoundingBox;

    fn add(store: &MemorySampleStore, lat: f64, lng: f64, db: f64) -> NoiseSample {
        let sample = CandidateSample::new(LatLng::new(lat, lng), db)
            .validate()
            .unwrap();
        store.append(sample).unwrap()
    }

    #[test]
    fn test_append_assigns_id_and_timestamp() {
        let store = MemorySampleStore::new();
        let a = add(&store, 1.0, 1.0, 60.0);
        let b = add(&store, 1.0, 1.0, 60.0);
        assert_ne!(a.id, b.id);
        assert!(b.timestamp >= a.timestamp);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_list_recent_newest_first_with_limit() {
        let store = MemorySampleStore::new();
        let ids: Vec<String> = (0..5).map(|i| add(&store, 0.0, 0.0, 50.0 + i as f64).id).collect();

        let recent = store.list_recent(&RecentQuery::with_limit(3)).unwrap();
        let got: Vec<&str> = recent.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(got, vec![ids[4].as_str(), ids[3].as_str(), ids[2].as_str()]);
    }

    #[test]
    fn test_list_recent_bounds_filter() {
        let store = MemorySampleStore::new();
        add(&store, 6.5, 3.4, 70.0);
        add(&store, 40.7, -74.0, 80.0);

        let bounds = BoundingBox::new(LatLng::new(6.0, 3.0), LatLng::new(7.0, 4.0));
        let recent = store
            .list_recent(&RecentQuery::default().within(bounds))
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].decibels, 70.0);
    }
}
