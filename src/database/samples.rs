//! Noise sample rows: insert and the "recent batch" query.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use crate::sample::{LatLng, NoiseSample, ValidatedSample};
use crate::store::{RecentQuery, StoreError};

/// Fixed-width UTC text so string order equals time order.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", raw, e),
        })
}

/// Row as read from SQLite, before timestamp parsing.
struct SampleRow {
    id: String,
    lat: f64,
    lng: f64,
    decibels: f64,
    timestamp: String,
}

impl SampleRow {
    fn into_sample(self) -> Result<NoiseSample, StoreError> {
        let timestamp = parse_timestamp(&self.id, &self.timestamp)?;
        Ok(NoiseSample {
            id: self.id,
            location: LatLng::new(self.lat, self.lng),
            decibels: self.decibels,
            timestamp,
        })
    }
}

pub fn insert_sample(conn: &Connection, sample: ValidatedSample) -> Result<NoiseSample, StoreError> {
    let stored = NoiseSample {
        id: Uuid::new_v4().to_string(),
        location: sample.location(),
        decibels: sample.decibels(),
        timestamp: Utc::now(),
    };

    conn.execute(
        "INSERT INTO noise_samples (id, lat, lng, decibels, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            stored.id,
            stored.location.lat,
            stored.location.lng,
            stored.decibels,
            format_timestamp(&stored.timestamp),
        ],
    )?;

    tracing::debug!("Stored sample {} ({:.1} dB)", stored.id, stored.decibels);
    Ok(stored)
}

/// Builds the WHERE clause and bound values for a query's filters.
fn filter_clause(query: &RecentQuery) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(bounds) = query.bounds {
        conditions.push("lat BETWEEN ? AND ?".to_string());
        values.push(Value::Real(bounds.south_west.lat));
        values.push(Value::Real(bounds.north_east.lat));

        if bounds.south_west.lng <= bounds.north_east.lng {
            conditions.push("lng BETWEEN ? AND ?".to_string());
        } else {
            conditions.push("(lng >= ? OR lng <= ?)".to_string());
        }
        values.push(Value::Real(bounds.south_west.lng));
        values.push(Value::Real(bounds.north_east.lng));
    }

    if let Some(since) = query.since {
        conditions.push("timestamp >= ?".to_string());
        values.push(Value::Text(format_timestamp(&since)));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, values)
}

pub fn list_recent(conn: &Connection, query: &RecentQuery) -> Result<Vec<NoiseSample>, StoreError> {
    let (clause, mut values) = filter_clause(query);
    values.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

    let sql = format!(
        "SELECT id, lat, lng, decibels, timestamp FROM noise_samples {} \
         ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(SampleRow {
            id: row.get(0)?,
            lat: row.get(1)?,
            lng: row.get(2)?,
            decibels: row.get(3)?,
            timestamp: row.get(4)?,
        })
    })?;

    let mut samples = Vec::new();
    for row in rows {
        samples.push(row?.into_sample()?);
    }
    Ok(samples)
}

pub fn count_samples(conn: &Connection) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM noise_samples", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migrations::run_migrations;
    use crate::sample::CandidateSample;
    use crate::store::BoundingBox;
    use chrono::Duration;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    fn insert_raw(conn: &Connection, id: &str, lat: f64, lng: f64, db: f64, ts: DateTime<Utc>) {
        conn.execute(
            "INSERT INTO noise_samples (id, lat, lng, decibels, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, lat, lng, db, format_timestamp(&ts)],
        )
        .unwrap();
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let ts = DateTime::parse_from_rfc3339("2025-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2025-01-15T10:30:00.000000Z");
    }

    #[test]
    fn test_insert_then_list() {
        let conn = migrated();
        let sample = CandidateSample::new(LatLng::new(6.5244, 3.3792), 72.5)
            .validate()
            .unwrap();
        let stored = insert_sample(&conn, sample).unwrap();

        let listed = list_recent(&conn, &RecentQuery::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
        assert_eq!(listed[0].decibels, 72.5);
        assert_eq!(listed[0].location, LatLng::new(6.5244, 3.3792));
        assert_eq!(count_samples(&conn).unwrap(), 1);
    }

    #[test]
    fn test_list_orders_newest_first_and_filters_since() {
        let conn = migrated();
        let now = Utc::now();
        insert_raw(&conn, "old", 0.0, 0.0, 50.0, now - Duration::hours(2));
        insert_raw(&conn, "new", 0.0, 0.0, 60.0, now);
        insert_raw(&conn, "mid", 0.0, 0.0, 55.0, now - Duration::hours(1));

        let all = list_recent(&conn, &RecentQuery::default()).unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let recent = list_recent(
            &conn,
            &RecentQuery::default().since(now - Duration::minutes(90)),
        )
        .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_list_filters_bounds_across_antimeridian() {
        let conn = migrated();
        let now = Utc::now();
        insert_raw(&conn, "fiji", -17.7, 178.0, 60.0, now);
        insert_raw(&conn, "samoa", -13.8, -172.0, 60.0, now);
        insert_raw(&conn, "lagos", 6.5, 3.4, 60.0, now);

        let bounds = BoundingBox::new(LatLng::new(-20.0, 170.0), LatLng::new(-10.0, -170.0));
        let found = list_recent(&conn, &RecentQuery::default().within(bounds)).unwrap();
        let mut ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["fiji", "samoa"]);
    }

    #[test]
    fn test_corrupt_timestamp_is_reported() {
        let conn = migrated();
        conn.execute(
            "INSERT INTO noise_samples (id, lat, lng, decibels, timestamp) VALUES ('bad', 0, 0, 50, 'yesterday')",
            [],
        )
        .unwrap();

        assert!(matches!(
            list_recent(&conn, &RecentQuery::default()),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
