use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB instead of the default ~4MB
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Non-fatal: in-memory DBs and fresh files legitimately fail this.
    if conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").is_ok() {
        tracing::debug!("startup WAL checkpoint complete");
    }

    // Fresh databases get the millisecond key directly. A v1 table keyed
    // by unix seconds survives CREATE IF NOT EXISTS and is rebuilt below.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS positions (
            body       TEXT    NOT NULL,
            frame      TEXT    NOT NULL,
            unix_ms    INTEGER NOT NULL,
            angle      REAL    NOT NULL,
            provider   TEXT    NOT NULL DEFAULT '',
            PRIMARY KEY (body, frame, unix_ms)
        ) WITHOUT ROWID;
        ",
    )?;

    if conn.prepare("SELECT unix_ms FROM positions LIMIT 0").is_err() {
        conn.execute_batch(
            "
            BEGIN;
            CREATE TABLE positions_v2 (
                body       TEXT    NOT NULL,
                frame      TEXT    NOT NULL,
                unix_ms    INTEGER NOT NULL,
                angle      REAL    NOT NULL,
                provider   TEXT    NOT NULL DEFAULT '',
                PRIMARY KEY (body, frame, unix_ms)
            ) WITHOUT ROWID;
            INSERT INTO positions_v2 (body, frame, unix_ms, angle, provider)
                SELECT body, frame, unix_secs * 1000, angle, provider FROM positions;
            DROP TABLE positions;
            ALTER TABLE positions_v2 RENAME TO positions;
            COMMIT;
            ",
        )?;
        tracing::info!("position cache upgraded to millisecond keys");
    }

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for table in &["metadata", "positions"] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert!(count >= 0, "table {table} should exist");
        }
    }

    #[test]
    fn test_schema_version_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_wal_mode_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        // in-memory always reports "memory", on-disk would report "wal"
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert!(mode == "memory" || mode == "wal", "got mode: {mode}");
    }

    #[test]
    fn test_idempotent_initialize() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn test_busy_timeout_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap();
        assert_eq!(timeout, 5000, "busy_timeout should be 5000ms");
    }

    #[test]
    fn test_primary_key_rejects_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO positions (body, frame, unix_ms, angle) VALUES ('sun', 'geocentric', 0, 1.0)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO positions (body, frame, unix_ms, angle) VALUES ('sun', 'geocentric', 0, 2.0)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_upgrade_v1_rekeys_positions_in_ms() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            INSERT INTO metadata (key, value) VALUES ('schema_version', '1');
            CREATE TABLE positions (
                body       TEXT    NOT NULL,
                frame      TEXT    NOT NULL,
                unix_secs  INTEGER NOT NULL,
                angle      REAL    NOT NULL,
                provider   TEXT    NOT NULL DEFAULT '',
                PRIMARY KEY (body, frame, unix_secs)
            ) WITHOUT ROWID;
            INSERT INTO positions VALUES ('Sun', 'geocentric', 1704067200, 279.9, 'mean-elements');
            ",
        )
        .unwrap();

        initialize(&conn).unwrap();

        let ms: i64 = conn
            .query_row("SELECT unix_ms FROM positions WHERE body = 'Sun'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(ms, 1_704_067_200_000);
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        // a second initialize leaves the upgraded table alone
        initialize(&conn).unwrap();
    }
}
