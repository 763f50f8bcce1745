//! Sample database integration tests.
//!
//! Exercises the SQLite sample store against real database files in a
//! temporary directory that is cleaned up after each test.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tempfile::TempDir;

use noisemap::database::SqliteSampleStore;
use noisemap::sample::{CandidateSample, LatLng};
use noisemap::store::{BoundingBox, RecentQuery, SampleStore, StoreError};

const BERLIN: LatLng = LatLng::new(52.52, 13.405);

fn append(store: &SqliteSampleStore, location: LatLng, decibels: f64) {
    let sample = CandidateSample::new(location, decibels)
        .validate()
        .expect("valid sample");
    store.append(sample).expect("Failed to append sample");
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_samples_survive_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("noisemap.db");

    {
        let store = SqliteSampleStore::open(&db_path).expect("Failed to open store");
        append(&store, BERLIN, 64.5);
        append(&store, BERLIN, 71.0);
    }

    let store = SqliteSampleStore::open(&db_path).expect("Failed to reopen store");
    assert_eq!(store.count().unwrap(), 2);

    let samples = store.list_recent(&RecentQuery::default()).unwrap();
    assert_eq!(samples[0].decibels, 71.0);
    assert_eq!(samples[1].decibels, 64.5);
}

#[test]
fn test_open_creates_missing_directories() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("nested").join("data").join("noisemap.db");

    let store = SqliteSampleStore::open(&db_path).expect("Failed to open store");
    assert!(db_path.exists());
    assert_eq!(store.path(), Some(db_path.as_path()));
}

#[test]
fn test_reopen_does_not_reapply_migrations() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("noisemap.db");

    drop(SqliteSampleStore::open(&db_path).unwrap());
    drop(SqliteSampleStore::open(&db_path).unwrap());

    let conn = Connection::open(&db_path).unwrap();
    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(applied, 1);
}

#[test]
fn test_newer_schema_is_refused() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("noisemap.db");
    drop(SqliteSampleStore::open(&db_path).unwrap());

    let conn = Connection::open(&db_path).unwrap();
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (99, 'from_the_future')",
        [],
    )
    .unwrap();
    drop(conn);

    assert!(matches!(
        SqliteSampleStore::open(&db_path),
        Err(StoreError::Migration(_))
    ));
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_list_recent_newest_first_with_limit() {
    let store = SqliteSampleStore::open_in_memory().unwrap();
    for db in [50.0, 60.0, 70.0, 80.0] {
        append(&store, BERLIN, db);
    }

    let samples = store.list_recent(&RecentQuery::with_limit(3)).unwrap();
    let values: Vec<f64> = samples.iter().map(|s| s.decibels).collect();
    assert_eq!(values, vec![80.0, 70.0, 60.0]);
}

#[test]
fn test_list_recent_filters_by_bounds() {
    let store = SqliteSampleStore::open_in_memory().unwrap();
    append(&store, BERLIN, 65.0);
    append(&store, LatLng::new(48.8566, 2.3522), 75.0);

    let around_berlin = BoundingBox::new(LatLng::new(52.0, 13.0), LatLng::new(53.0, 14.0));
    let samples = store
        .list_recent(&RecentQuery::default().within(around_berlin))
        .unwrap();

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].location, BERLIN);
}

#[test]
fn test_list_recent_filters_by_time() {
    let store = SqliteSampleStore::open_in_memory().unwrap();
    append(&store, BERLIN, 65.0);

    let future = RecentQuery::default().since(Utc::now() + Duration::hours(1));
    assert!(store.list_recent(&future).unwrap().is_empty());

    let past = RecentQuery::default().since(Utc::now() - Duration::hours(1));
    assert_eq!(store.list_recent(&past).unwrap().len(), 1);
}

#[test]
fn test_ids_are_unique() {
    let store = SqliteSampleStore::open_in_memory().unwrap();
    append(&store, BERLIN, 65.0);
    append(&store, BERLIN, 65.0);

    let samples = store.list_recent(&RecentQuery::default()).unwrap();
    assert_eq!(samples.len(), 2);
    assert_ne!(samples[0].id, samples[1].id);
}
