//! SQLite-backed sample store.
//!
//! The default database lives at `~/.noisemap/noisemap.db`. A single
//! connection is opened per store and guarded by a mutex; callers on the
//! async side go through `spawn_blocking`.

pub mod migrations;
pub mod samples;
pub mod schema;

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::database::migrations::run_migrations;
use crate::sample::{NoiseSample, ValidatedSample};
use crate::store::{RecentQuery, SampleStore, StoreError};

/// Returns the data directory (~/.noisemap).
pub fn get_data_directory() -> Result<PathBuf, StoreError> {
    let home = dirs::home_dir().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        ))
    })?;
    Ok(home.join(".noisemap"))
}

/// Returns the default database path (~/.noisemap/noisemap.db).
pub fn get_database_path() -> Result<PathBuf, StoreError> {
    Ok(get_data_directory()?.join("noisemap.db"))
}

pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteSampleStore {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created data directory at {:?}", parent);
            }
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        tracing::info!("Sample database ready at {:?}", path);
        Ok(store)
    }

    /// Opens the database at the default location.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(get_database_path()?)
    }

    /// Private in-memory database, gone when the store drops.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        samples::count_samples(&self.conn.lock())
    }
}

impl SampleStore for SqliteSampleStore {
    fn append(&self, sample: ValidatedSample) -> Result<NoiseSample, StoreError> {
        samples::insert_sample(&self.conn.lock(), sample)
    }

    fn list_recent(&self, query: &RecentQuery) -> Result<Vec<NoiseSample>, StoreError> {
        samples::list_recent(&self.conn.lock(), query)
    }
}
