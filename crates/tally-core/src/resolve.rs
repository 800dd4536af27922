//! Uniqueness resolver: full recompute of a user's best unique code.
//!
//! The protocol does not track a "second-best unique" incrementally, so when
//! a user's best unique code is invalidated the only certainly-correct move
//! is a linear pass: walk the user's scans in descending score order and
//! return the first whose code is held by exactly one user.
//!
//! Code-metadata lookups are chunked into identifier batches of at most
//! [`METADATA_BATCH`] ids, the store's fetch-by-identifier-set bound.
//! Because chunks are taken from an already score-ordered list, the first
//! hit in the first qualifying chunk is the global answer and the result
//! cannot depend on the chunk size.

use anyhow::Result;
use rusqlite::Connection;

use crate::model::BestItem;
use crate::store::query;

/// Store-imposed bound on fetch-by-identifier-set queries.
pub const METADATA_BATCH: usize = 10;

/// Recompute `user_id`'s best unique item from scratch. Returns `None` when
/// the user holds no code with `num_scanned == 1`.
///
/// Pure function of store state: two calls with no intervening writes yield
/// the same result.
pub fn best_unique(conn: &Connection, user_id: &str) -> Result<Option<BestItem>> {
    best_unique_chunked(conn, user_id, METADATA_BATCH)
}

/// Chunk-size-parameterized variant; exists so tests can pin the
/// batch-boundary property. `batch` must not exceed [`METADATA_BATCH`].
pub fn best_unique_chunked(
    conn: &Connection,
    user_id: &str,
    batch: usize,
) -> Result<Option<BestItem>> {
    assert!(batch >= 1 && batch <= METADATA_BATCH);

    let scans = query::scans_for_user_desc(conn, user_id)?;
    tracing::debug!(
        user_id,
        scans = scans.len(),
        "resolving best unique over full scan set"
    );

    for chunk in scans.chunks(batch) {
        let ids: Vec<&str> = chunk.iter().map(|s| s.code_id.as_str()).collect();
        let unique = query::codes_unique_among(conn, &ids)?;
        tracing::debug!(
            user_id,
            batch = ids.len(),
            unique = unique.len(),
            "checked metadata batch"
        );

        // Chunk entries are already in descending score order, so the first
        // qualifying record is the best one.
        if let Some(hit) = chunk.iter().find(|s| unique.contains(&s.code_id)) {
            return Ok(Some(BestItem::new(&hit.code_id, hit.score)));
        }
    }

    Ok(None)
}
