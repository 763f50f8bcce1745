//! Place search
//!
//! Free-text queries are resolved through a Nominatim-compatible HTTP
//! endpoint. Results are `{x: lng, y: lat, label}` candidates; picking one
//! recentres the map. Queries under three characters never leave the
//! process, and a typing stream is debounced before it reaches the network.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use url::Url;

use crate::sample::LatLng;
use crate::smoother::debounce_trailing;

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("noisemap/", env!("CARGO_PKG_VERSION"));

/// Shortest query worth sending
pub const MIN_QUERY_LEN: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Invalid geocoder URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub label: String,
}

impl SearchCandidate {
    pub fn location(&self) -> LatLng {
        LatLng::new(self.y, self.x)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingSettings {
    pub base_url: String,
    pub min_query_len: usize,
    pub debounce_ms: u64,
    pub timeout_secs: u64,
    pub result_limit: u32,
}

impl Default for GeocodingSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            min_query_len: MIN_QUERY_LEN,
            debounce_ms: 500,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            result_limit: 5,
        }
    }
}

/// Whether a query is long enough to search for
pub fn is_searchable(query: &str, min_len: usize) -> bool {
    query.trim().chars().count() >= min_len
}

/// A place search backend
pub trait Geocoder: Send + Sync + 'static {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<SearchCandidate>, GeocodeError>> + Send;
}

/// Nominatim returns coordinates as strings
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// Parses a Nominatim `format=json` response body. Entries with unreadable
/// coordinates are skipped.
pub fn parse_results(body: &str) -> Result<Vec<SearchCandidate>, GeocodeError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| GeocodeError::ParseError(e.to_string()))?;

    Ok(places
        .into_iter()
        .filter_map(|place| {
            match (place.lat.trim().parse::<f64>(), place.lon.trim().parse::<f64>()) {
                (Ok(y), Ok(x)) if LatLng::new(y, x).is_valid() => Some(SearchCandidate {
                    x,
                    y,
                    label: place.display_name,
                }),
                _ => {
                    tracing::warn!(
                        "Geocoder: skipping result with bad coordinates: {}",
                        place.display_name
                    );
                    None
                }
            }
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    search_url: Url,
    client: reqwest::Client,
    settings: GeocodingSettings,
}

impl NominatimClient {
    pub fn new(settings: GeocodingSettings) -> Result<Self, GeocodeError> {
        let invalid = |reason: String| GeocodeError::InvalidUrl {
            url: settings.base_url.clone(),
            reason,
        };
        let mut base = Url::parse(&settings.base_url).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let search_url = base.join("search").map_err(|e| invalid(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GeocodeError::Client(e.to_string()))?;

        Ok(Self {
            search_url,
            client,
            settings,
        })
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }
}

impl Geocoder for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, GeocodeError> {
        let query = query.trim();
        if !is_searchable(query, self.settings.min_query_len) {
            return Ok(Vec::new());
        }

        let limit = self.settings.result_limit.to_string();
        let response = self
            .client
            .get(self.search_url.clone())
            .query(&[("format", "json"), ("q", query), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout(self.settings.timeout_secs)
                } else {
                    GeocodeError::ConnectionFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GeocodeError::ServerError { status, message });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::ParseError(e.to_string()))?;
        let results = parse_results(&body)?;
        tracing::debug!("Geocoder: {} result(s) for '{}'", results.len(), query);
        Ok(results)
    }
}

/// Results for one settled query
#[derive(Debug)]
pub struct SearchResults {
    pub query: String,
    pub outcome: Result<Vec<SearchCandidate>, GeocodeError>,
}

/// Search-as-you-type: keystrokes go in, debounced result sets come out.
pub struct SearchBox {
    input: UnboundedSender<String>,
    results: UnboundedReceiver<SearchResults>,
    tasks: Vec<JoinHandle<()>>,
}

impl SearchBox {
    pub fn spawn<G: Geocoder>(geocoder: Arc<G>, window: Duration, min_query_len: usize) -> Self {
        let (input, queries) = mpsc::unbounded_channel::<String>();
        let (results_tx, results) = mpsc::unbounded_channel::<SearchResults>();
        let (debouncer, mut settled) = debounce_trailing(window, queries).into_parts();

        let lookup = tokio::spawn(async move {
            while let Some(query) = settled.recv().await {
                if !is_searchable(&query, min_query_len) {
                    continue;
                }
                let outcome = geocoder.search(&query).await;
                if results_tx.send(SearchResults { query, outcome }).is_err() {
                    break;
                }
            }
        });

        Self {
            input,
            results,
            tasks: vec![debouncer, lookup],
        }
    }

    /// Feed the current text of the search field
    pub fn type_query(&self, text: impl Into<String>) {
        let _ = self.input.send(text.into());
    }

    pub async fn next_results(&mut self) -> Option<SearchResults> {
        self.results.recv().await
    }
}

impl Drop for SearchBox {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingGeocoder {
        queries: Mutex<Vec<String>>,
    }

    impl Geocoder for RecordingGeocoder {
        async fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, GeocodeError> {
            self.queries.lock().push(query.to_string());
            Ok(vec![SearchCandidate {
                x: 3.3792,
                y: 6.5244,
                label: format!("{} result", query),
            }])
        }
    }

    #[test]
    fn test_parse_nominatim_results() {
        let body = r#"[
            {"place_id": 1, "lat": "6.4550575", "lon": "3.3941795", "display_name": "Lagos Island, Nigeria"},
            {"place_id": 2, "lat": "not a number", "lon": "3.0", "display_name": "Broken"}
        ]"#;
        let results = parse_results(body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "Lagos Island, Nigeria");
        assert_eq!(results[0].x, 3.3941795);
        assert_eq!(results[0].location(), LatLng::new(6.4550575, 3.3941795));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(
            parse_results(r#"{"error": "rate limited"}"#),
            Err(GeocodeError::ParseError(_))
        ));
    }

    #[test]
    fn test_short_queries_not_searchable() {
        assert!(!is_searchable("ab", 3));
        assert!(!is_searchable("  ab  ", 3));
        assert!(is_searchable("abc", 3));
    }

    #[test]
    fn test_client_builds_search_url() {
        let client = NominatimClient::new(GeocodingSettings {
            base_url: "http://localhost:8080/nominatim".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.search_url().as_str(),
            "http://localhost:8080/nominatim/search"
        );
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let result = NominatimClient::new(GeocodingSettings {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(GeocodeError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_short_query_makes_no_request() {
        let client = NominatimClient::new(GeocodingSettings {
            // Unroutable; any request would fail
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(client.search("ny").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_box_debounces_typing() {
        let geocoder = Arc::new(RecordingGeocoder::default());
        let mut search = SearchBox::spawn(geocoder.clone(), Duration::from_millis(500), 3);

        search.type_query("L");
        search.type_query("La");
        sleep(Duration::from_millis(100)).await;
        search.type_query("Lag");
        sleep(Duration::from_millis(100)).await;
        search.type_query("Lagos");

        let results = search.next_results().await.unwrap();
        assert_eq!(results.query, "Lagos");
        assert_eq!(results.outcome.unwrap()[0].label, "Lagos result");
        assert_eq!(*geocoder.queries.lock(), vec!["Lagos".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_box_steady_typing_sends_one_request() {
        let geocoder = Arc::new(RecordingGeocoder::default());
        let mut search = SearchBox::spawn(geocoder.clone(), Duration::from_millis(500), 3);

        for text in ["Lag", "Lago", "Lagos", "Lagos Is", "Lagos Island"] {
            search.type_query(text);
            sleep(Duration::from_millis(300)).await;
        }

        let results = search.next_results().await.unwrap();
        assert_eq!(results.query, "Lagos Island");
        assert_eq!(*geocoder.queries.lock(), vec!["Lagos Island".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_box_skips_short_settled_query() {
        let geocoder = Arc::new(RecordingGeocoder::default());
        let mut search = SearchBox::spawn(geocoder.clone(), Duration::from_millis(500), 3);

        search.type_query("NY");
        sleep(Duration::from_secs(1)).await;
        search.type_query("New York");

        let results = search.next_results().await.unwrap();
        assert_eq!(results.query, "New York");
        assert_eq!(geocoder.queries.lock().len(), 1);
    }
}
