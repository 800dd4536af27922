//! SQLite-backed store with immediate transactions and bounded busy-retry.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while a writer commits
//! - `busy_timeout = 5s` to absorb transient lock contention
//! - `foreign_keys = ON` for relational integrity
//!
//! [`Store`] is an explicit handle threaded into every component; there is
//! no process-wide connection state. Its lifecycle belongs to the process
//! entry point.

pub mod query;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, TransactionBehavior};

use crate::error::StoreError;

/// Busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts before [`Store::with_txn`] gives up on a contended transaction.
pub const MAX_TXN_ATTEMPTS: u32 = 5;

/// Handle to the scan aggregate store.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `path` with the default busy timeout.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open (or create) the store at `path`, apply runtime pragmas with the
    /// given busy timeout, and migrate the schema to the latest version.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn, path, busy_timeout)
    }

    /// In-memory store for tests and tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::from_connection(conn, Path::new(":memory:"), DEFAULT_BUSY_TIMEOUT)
    }

    fn from_connection(
        mut conn: Connection,
        path: &Path,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        configure_connection(&conn, busy_timeout).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        schema::migrate(&mut conn).map_err(StoreError::Migrate)?;
        Ok(Self { conn })
    }

    /// Read-only access for query paths that need no transaction (ranker,
    /// verifier, CLI reads).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `body` inside a `BEGIN IMMEDIATE` transaction, committing on
    /// success. If the begin or commit hits `SQLITE_BUSY`/`SQLITE_LOCKED`,
    /// the whole body is re-run from the top against freshly read state, up
    /// to [`MAX_TXN_ATTEMPTS`] times. Bodies must therefore be pure
    /// functions of the state they read, with no external side effects
    /// before commit.
    pub fn with_txn<T>(&mut self, mut body: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let tx = match self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
            {
                Ok(tx) => tx,
                Err(e) if is_busy(&e) && attempt < MAX_TXN_ATTEMPTS => {
                    backoff(attempt);
                    continue;
                }
                Err(e) => return Err(e).context("begin immediate transaction"),
            };

            match body(&tx) {
                Ok(value) => match tx.commit() {
                    Ok(()) => return Ok(value),
                    Err(e) if is_busy(&e) && attempt < MAX_TXN_ATTEMPTS => {
                        tracing::debug!(attempt, "transaction commit outbid; retrying body");
                        backoff(attempt);
                    }
                    Err(e) => return Err(e).context("commit transaction"),
                },
                Err(e) if is_busy_anyhow(&e) && attempt < MAX_TXN_ATTEMPTS => {
                    tracing::debug!(attempt, "transaction body hit contention; retrying");
                    drop(tx);
                    backoff(attempt);
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::RetriesExhausted {
            attempts: MAX_TXN_ATTEMPTS,
        }
        .into())
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn is_busy_anyhow(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<rusqlite::Error>()
        .is_some_and(is_busy)
}

fn backoff(attempt: u32) {
    std::thread::sleep(Duration::from_millis(u64::from(attempt) * 10));
}
