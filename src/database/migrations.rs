//! Versioned schema migrations, tracked in the `migrations` table and
//! applied once each, in order.

use rusqlite::Connection;

use crate::database::schema::{
    CREATE_MIGRATIONS_TABLE, CREATE_NOISE_SAMPLES_LOCATION_INDEX, CREATE_NOISE_SAMPLES_TABLE,
    CREATE_NOISE_SAMPLES_TIMESTAMP_INDEX,
};
use crate::store::StoreError;

struct Migration {
    version: i32,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_noise_samples_table",
    statements: &[
        CREATE_NOISE_SAMPLES_TABLE,
        CREATE_NOISE_SAMPLES_TIMESTAMP_INDEX,
        CREATE_NOISE_SAMPLES_LOCATION_INDEX,
    ],
}];

/// Latest schema version this build knows about.
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Current schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i32, StoreError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Runs all pending migrations. Each migration commits in its own
/// transaction; a failing statement rolls that migration back.
pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;

    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current,
            latest_version()
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        tracing::debug!("Database schema is up to date (v{})", current);
        return Ok(());
    }

    for migration in pending {
        tracing::info!(
            "Applying migration {} (v{})",
            migration.name,
            migration.version
        );

        let tx = conn.transaction()?;
        for statement in migration.statements {
            tx.execute_batch(statement).map_err(|e| {
                StoreError::Migration(format!("Migration {} failed: {}", migration.name, e))
            })?;
        }
        tx.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
            (migration.version, migration.name),
        )?;
        tx.commit()?;
    }

    tracing::info!("Database schema now at version {}", current_version(conn)?);
    Ok(())
}
