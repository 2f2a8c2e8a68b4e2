use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use lum_core::{CelestialBody, Position, ReferenceFrame};

use crate::error::{Result, StoreError};
use crate::schema;

/// Per-body row counts, for `cache stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub by_body: Vec<(CelestialBody, u64)>,
}

/// SQLite-backed position table keyed by (body, frame, unix milliseconds).
pub struct PositionStore {
    conn: Connection,
}

impl PositionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<Option<i64>> {
        schema::get_schema_version(&self.conn)
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Positions ---

    pub fn get(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Option<Position>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT angle FROM positions WHERE body = ?1 AND frame = ?2 AND unix_ms = ?3")?;
        let angle: Option<f64> = stmt
            .query_row(params![body.name(), frame.as_str(), instant.timestamp_millis()], |row| row.get(0))
            .optional()?;
        Ok(angle.map(|a| Position::new(body, frame, instant, a)))
    }

    /// Insert or overwrite one position.
    pub fn put(&self, position: &Position, provider: &str) -> Result<()> {
        put_on(&self.conn, position, provider)
    }

    /// Insert many positions in a single transaction.
    pub fn put_batch(&self, positions: &[Position], provider: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for position in positions {
            put_on(&tx, position, provider)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT body, COUNT(*) FROM positions GROUP BY body ORDER BY body")?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut stats = StoreStats::default();
        for (name, n) in rows {
            let body: CelestialBody = name.parse().map_err(StoreError::InvalidData)?;
            stats.total += n as u64;
            stats.by_body.push((body, n as u64));
        }
        stats.by_body.sort_by_key(|(body, _)| *body);
        Ok(stats)
    }

    /// Delete every cached position. Returns the number of rows removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM positions", [])?;
        tracing::info!(removed, "position cache cleared");
        Ok(removed)
    }
}

fn put_on(conn: &Connection, position: &Position, provider: &str) -> Result<()> {
    conn.prepare_cached(
        "INSERT OR REPLACE INTO positions (body, frame, unix_ms, angle, provider)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        position.body.name(),
        position.frame.as_str(),
        position.instant.timestamp_millis(),
        position.angle_degrees,
        provider,
    ])?;
    Ok(())
}
