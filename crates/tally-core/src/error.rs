//! Store-level error types.
//!
//! Only unrecoverable store failures surface as errors. Absent documents are
//! modeled as `Option`, and operational anomalies (reverse-lookup misses,
//! self-references, counter underflow) are reported on
//! [`crate::protocol::Applied`] rather than thrown.

use std::path::PathBuf;

/// Unrecoverable store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Creating the store's parent directory failed.
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening or configuring the SQLite database failed.
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Schema migration failed.
    #[error("schema migration failed: {0}")]
    Migrate(#[source] rusqlite::Error),

    /// An immediate transaction kept hitting `SQLITE_BUSY` past the retry
    /// budget. The caller (trigger layer) may redeliver the event.
    #[error("transaction contention: retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
