//! Batch retrieval with bounded retry.
//!
//! The store is synchronous, so each attempt runs on the blocking pool. A
//! failed attempt is retried after a fixed delay up to `max_attempts` times;
//! errors that will not go away by waiting fail immediately.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::sample::NoiseSample;
use crate::store::{RecentQuery, SampleStore, StoreError};

/// Default number of fetch attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to load samples: {0}")]
    Store(#[from] StoreError),

    #[error("Fetch worker failed: {0}")]
    Worker(String),

    #[error("All {attempts} fetch attempts failed: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Store(StoreError::Corrupt { .. } | StoreError::Migration(_)) => false,
            FetchError::Store(_) | FetchError::Worker(_) => true,
            FetchError::RetriesExhausted { .. } => false,
        }
    }
}

/// How often and how patiently to retry a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Source of "recent batch" snapshots for the map
pub struct SampleFeed<S: ?Sized> {
    store: Arc<S>,
    query: RecentQuery,
    retry: RetryPolicy,
}

impl<S: SampleStore + ?Sized + 'static> SampleFeed<S> {
    pub fn new(store: Arc<S>, query: RecentQuery, retry: RetryPolicy) -> Self {
        Self {
            store,
            query,
            retry,
        }
    }

    pub fn query(&self) -> &RecentQuery {
        &self.query
    }

    pub fn set_query(&mut self, query: RecentQuery) {
        self.query = query;
    }

    async fn fetch_once(&self) -> Result<Vec<NoiseSample>, FetchError> {
        let store = self.store.clone();
        let query = self.query;
        let result = tokio::task::spawn_blocking(move || store.list_recent(&query))
            .await
            .map_err(|e| FetchError::Worker(e.to_string()))?;
        Ok(result?)
    }

    /// Fetches the current batch, newest first.
    pub async fn fetch(&self) -> Result<Vec<NoiseSample>, FetchError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..attempts {
            match self.fetch_once().await {
                Ok(batch) => {
                    if attempt > 0 {
                        tracing::debug!("Feed: fetch succeeded on attempt {}", attempt + 1);
                    }
                    tracing::debug!("Feed: fetched {} sample(s)", batch.len());
                    return Ok(batch);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        tracing::error!("Feed: fetch failed: {}", e);
                        return Err(e);
                    }
                    if attempt + 1 == attempts {
                        tracing::error!("Feed: fetch failed (attempt {}): {}", attempt + 1, e);
                        last_error = Some(e);
                        break;
                    }

                    tracing::warn!(
                        "Feed: fetch failed (attempt {}), retrying in {}ms: {}",
                        attempt + 1,
                        self.retry.delay_ms,
                        e
                    );
                    last_error = Some(e);
                    sleep(self.retry.delay()).await;
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::sample::ValidatedSample;
    use crate::store::MemorySampleStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Memory store whose reads can be switched to fail
    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: MemorySampleStore,
        pub failing: AtomicBool,
        pub reads: AtomicUsize,
    }

    impl SampleStore for FlakyStore {
        fn append(&self, sample: ValidatedSample) -> Result<NoiseSample, StoreError> {
            self.inner.append(sample)
        }

        fn list_recent(&self, query: &RecentQuery) -> Result<Vec<NoiseSample>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.list_recent(query)
        }
    }
}
