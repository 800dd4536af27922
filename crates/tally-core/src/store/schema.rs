//! Canonical SQLite schema for the scan aggregate store.
//!
//! Logical layout mirrors the document paths the protocol was written for:
//! - `users` keeps one aggregate row per user (`users/{userId}`)
//! - `scans` keeps one row per scan record (`users/{userId}/scans/{codeId}`)
//! - `codes` keeps the shared per-code counter (`codes/{codeId}`)
//! - `applied_events` is the redelivery ledger for keyed trigger events

use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

/// Migration v1: aggregate, scan, code-counter, and ledger tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    total_score INTEGER NOT NULL DEFAULT 0 CHECK (total_score >= 0),
    total_scanned INTEGER NOT NULL DEFAULT 0 CHECK (total_scanned >= 0),
    best_code_id TEXT,
    best_score INTEGER CHECK (best_score IS NULL OR best_score >= 0),
    best_unique_code_id TEXT,
    best_unique_score INTEGER CHECK (best_unique_score IS NULL OR best_unique_score >= 0),
    rank_total_score INTEGER,
    rank_best_unique INTEGER,
    rank_num_scanned INTEGER,
    CHECK ((best_code_id IS NULL) = (best_score IS NULL)),
    CHECK ((best_unique_code_id IS NULL) = (best_unique_score IS NULL))
);

CREATE TABLE IF NOT EXISTS scans (
    user_id TEXT NOT NULL,
    code_id TEXT NOT NULL,
    score INTEGER NOT NULL CHECK (score >= 0),
    location TEXT,
    PRIMARY KEY (user_id, code_id)
);

CREATE INDEX IF NOT EXISTS idx_scans_score_location
    ON scans(score, location);

CREATE INDEX IF NOT EXISTS idx_scans_user_score
    ON scans(user_id, score DESC, code_id ASC);

CREATE TABLE IF NOT EXISTS codes (
    code_id TEXT PRIMARY KEY,
    num_scanned INTEGER NOT NULL DEFAULT 0 CHECK (num_scanned >= 0)
);

CREATE TABLE IF NOT EXISTS applied_events (
    event_key TEXT PRIMARY KEY,
    applied_at_us INTEGER NOT NULL
);
";

/// Read `PRAGMA user_version` as a `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
///
/// Each migration runs only when `version > user_version`, and the DDL uses
/// `IF NOT EXISTS`, so migration is idempotent.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate};
    use rusqlite::{Connection, params};

    fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        let version = migrate(&mut conn)?;
        assert_eq!(version, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        for table in ["users", "scans", "codes", "applied_events"] {
            assert!(table_exists(&conn, table)?, "missing table {table}");
        }
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        let version = migrate(&mut conn)?;
        assert_eq!(version, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn negative_counters_are_rejected_by_schema() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        let result = conn.execute(
            "INSERT INTO codes (code_id, num_scanned) VALUES ('c1', -1)",
            [],
        );
        assert!(result.is_err());
        Ok(())
    }
}
