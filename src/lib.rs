//! noisemap - crowdsourced urban noise mapping
//!
//! Turns microphone input into a smoothed loudness estimate, stores
//! geotagged readings and renders them as a heat surface plus per-reading
//! markers on a movable viewport.

pub mod audio;
pub mod config;
pub mod database;
pub mod feed;
pub mod geocoding;
pub mod geolocation;
pub mod heat;
pub mod logging;
pub mod map;
pub mod markers;
pub mod sample;
pub mod sampler;
pub mod session;
pub mod smoother;
pub mod store;
pub mod submit;
pub mod viewport;

pub use sample::{CandidateSample, LatLng, NoiseSample, ValidatedSample, ValidationError};
pub use session::{LiveEstimate, RecordingSession};
pub use store::{RecentQuery, SampleStore, StoreError};
