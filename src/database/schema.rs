//! SQL for the noise sample database.

/// Tracks which migrations have been applied.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// One row per submitted reading. Timestamps are RFC 3339 UTC with a fixed
/// width so that text ordering matches time ordering.
pub const CREATE_NOISE_SAMPLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS noise_samples (
    id TEXT PRIMARY KEY,
    lat REAL NOT NULL CHECK (lat BETWEEN -90 AND 90),
    lng REAL NOT NULL CHECK (lng BETWEEN -180 AND 180),
    decibels REAL NOT NULL CHECK (decibels BETWEEN 0 AND 150),
    timestamp TEXT NOT NULL
);
"#;

pub const CREATE_NOISE_SAMPLES_TIMESTAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_noise_samples_timestamp ON noise_samples(timestamp);
"#;

pub const CREATE_NOISE_SAMPLES_LOCATION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_noise_samples_location ON noise_samples(lat, lng);
"#;
