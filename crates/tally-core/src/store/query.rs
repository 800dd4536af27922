//! Typed query helpers for the scan aggregate store.
//!
//! All functions take a shared `&Connection` (plain connection or inside an
//! open transaction — `rusqlite::Transaction` derefs to `Connection`) and
//! return typed structs, never raw rows.

use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::model::{BestItem, CodeMetadata, Ranks, ScanRecord, UserAggregate};
use crate::resolve::METADATA_BATCH;

// ---------------------------------------------------------------------------
// User aggregates
// ---------------------------------------------------------------------------

/// Fetch a user's aggregate document. `None` means the document is absent;
/// callers normalize via [`UserAggregate::absent`].
pub fn get_aggregate(conn: &Connection, user_id: &str) -> Result<Option<UserAggregate>> {
    conn.query_row(
        "SELECT total_score, total_scanned,
                best_code_id, best_score,
                best_unique_code_id, best_unique_score,
                rank_total_score, rank_best_unique, rank_num_scanned
         FROM users WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(UserAggregate {
                user_id: user_id.to_string(),
                total_score: u64::try_from(row.get::<_, i64>(0)?).unwrap_or(0),
                total_scanned: u32::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                best_scoring: best_item(row.get(2)?, row.get(3)?),
                best_unique: best_item(row.get(4)?, row.get(5)?),
                ranks: ranks(row.get(6)?, row.get(7)?, row.get(8)?),
            })
        },
    )
    .optional()
    .with_context(|| format!("read aggregate for user {user_id}"))
}

/// Write a user's aggregate stats with update-or-create semantics. Rank
/// columns are owned by the batch ranker and left untouched on update.
pub fn upsert_aggregate(conn: &Connection, agg: &UserAggregate) -> Result<()> {
    conn.execute(
        "INSERT INTO users (user_id, total_score, total_scanned,
                            best_code_id, best_score,
                            best_unique_code_id, best_unique_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
             total_score = excluded.total_score,
             total_scanned = excluded.total_scanned,
             best_code_id = excluded.best_code_id,
             best_score = excluded.best_score,
             best_unique_code_id = excluded.best_unique_code_id,
             best_unique_score = excluded.best_unique_score",
        params![
            agg.user_id,
            i64::try_from(agg.total_score).unwrap_or(i64::MAX),
            i64::from(agg.total_scanned),
            agg.best_scoring.as_ref().map(|b| b.code_id.as_str()),
            agg.best_scoring.as_ref().map(|b| i64::from(b.score)),
            agg.best_unique.as_ref().map(|b| b.code_id.as_str()),
            agg.best_unique.as_ref().map(|b| i64::from(b.score)),
        ],
    )
    .with_context(|| format!("upsert aggregate for user {}", agg.user_id))?;
    Ok(())
}

/// Write only the best-unique pointer, creating the aggregate row if it does
/// not exist yet. Used by the cross-user side-effect transaction.
pub fn write_best_unique(conn: &Connection, user_id: &str, best: Option<&BestItem>) -> Result<()> {
    conn.execute(
        "INSERT INTO users (user_id, best_unique_code_id, best_unique_score)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
             best_unique_code_id = excluded.best_unique_code_id,
             best_unique_score = excluded.best_unique_score",
        params![
            user_id,
            best.map(|b| b.code_id.as_str()),
            best.map(|b| i64::from(b.score)),
        ],
    )
    .with_context(|| format!("write best-unique for user {user_id}"))?;
    Ok(())
}

/// All user aggregates, ordered by user id. Read path for the ranker and
/// verifier; acceptable as a full scan for peripheral jobs.
pub fn all_aggregates(conn: &Connection) -> Result<Vec<UserAggregate>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, total_score, total_scanned,
                    best_code_id, best_score,
                    best_unique_code_id, best_unique_score,
                    rank_total_score, rank_best_unique, rank_num_scanned
             FROM users ORDER BY user_id",
        )
        .context("prepare aggregate listing")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(UserAggregate {
                user_id: row.get(0)?,
                total_score: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                total_scanned: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                best_scoring: best_item(row.get(3)?, row.get(4)?),
                best_unique: best_item(row.get(5)?, row.get(6)?),
                ranks: ranks(row.get(7)?, row.get(8)?, row.get(9)?),
            })
        })
        .context("list aggregates")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect aggregates")
}

/// Persist leaderboard rank positions for one user.
pub fn write_ranks(conn: &Connection, user_id: &str, ranks: Ranks) -> Result<()> {
    conn.execute(
        "UPDATE users SET rank_total_score = ?2, rank_best_unique = ?3, rank_num_scanned = ?4
         WHERE user_id = ?1",
        params![
            user_id,
            i64::from(ranks.total_score),
            i64::from(ranks.best_unique),
            i64::from(ranks.num_scanned),
        ],
    )
    .with_context(|| format!("write ranks for user {user_id}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scan records
// ---------------------------------------------------------------------------

/// Insert a scan record. Returns `false` when the `(user_id, code_id)` row
/// already exists — the redelivered-create guard.
pub fn insert_scan(conn: &Connection, record: &ScanRecord) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT INTO scans (user_id, code_id, score, location)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, code_id) DO NOTHING",
            params![
                record.user_id,
                record.code_id,
                i64::from(record.score),
                record.location.as_deref(),
            ],
        )
        .with_context(|| {
            format!("insert scan {}/{}", record.user_id, record.code_id)
        })?;
    Ok(changed == 1)
}

/// Delete a scan record. Returns `false` when no row existed — the
/// redelivered-delete guard.
pub fn delete_scan(conn: &Connection, user_id: &str, code_id: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "DELETE FROM scans WHERE user_id = ?1 AND code_id = ?2",
            params![user_id, code_id],
        )
        .with_context(|| format!("delete scan {user_id}/{code_id}"))?;
    Ok(changed == 1)
}

/// The user's highest-score remaining scan, or `None` when the user has no
/// scans left. Single query; tie order matches the resolver's.
pub fn max_scan(conn: &Connection, user_id: &str) -> Result<Option<BestItem>> {
    conn.query_row(
        "SELECT code_id, score FROM scans
         WHERE user_id = ?1
         ORDER BY score DESC, code_id ASC
         LIMIT 1",
        params![user_id],
        |row| {
            Ok(BestItem {
                code_id: row.get(0)?,
                score: u32::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
            })
        },
    )
    .optional()
    .with_context(|| format!("read max scan for user {user_id}"))
}

/// All of a user's scans, score descending with a stable tie order
/// (`code_id` ascending). Feed for the uniqueness resolver.
pub fn scans_for_user_desc(conn: &Connection, user_id: &str) -> Result<Vec<ScanRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT code_id, score, location FROM scans
             WHERE user_id = ?1
             ORDER BY score DESC, code_id ASC",
        )
        .context("prepare user scan listing")?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(ScanRecord {
                user_id: user_id.to_string(),
                code_id: row.get(0)?,
                score: u32::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                location: row.get(2)?,
            })
        })
        .with_context(|| format!("list scans for user {user_id}"))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect user scans")
}

/// System-wide scans matching `(score, location)` — the narrowing filter
/// behind the reverse owner lookup. `location: None` matches rows whose
/// location is NULL (SQLite `IS` semantics).
pub fn scans_by_score_location(
    conn: &Connection,
    score: u32,
    location: Option<&str>,
) -> Result<Vec<ScanRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, code_id, score, location FROM scans
             WHERE score = ?1 AND location IS ?2
             ORDER BY user_id, code_id",
        )
        .context("prepare score/location scan filter")?;

    let rows = stmt
        .query_map(params![i64::from(score), location], |row| {
            Ok(ScanRecord {
                user_id: row.get(0)?,
                code_id: row.get(1)?,
                score: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                location: row.get(3)?,
            })
        })
        .context("filter scans by score/location")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect filtered scans")
}

// ---------------------------------------------------------------------------
// Code metadata
// ---------------------------------------------------------------------------

/// Fetch a code's shared counter. `None` reads as `num_scanned = 0`.
pub fn get_code(conn: &Connection, code_id: &str) -> Result<Option<CodeMetadata>> {
    conn.query_row(
        "SELECT num_scanned FROM codes WHERE code_id = ?1",
        params![code_id],
        |row| {
            Ok(CodeMetadata {
                code_id: code_id.to_string(),
                num_scanned: u32::try_from(row.get::<_, i64>(0)?).unwrap_or(0),
            })
        },
    )
    .optional()
    .with_context(|| format!("read metadata for code {code_id}"))
}

/// Write a code's counter with update-or-create semantics. A zero count
/// keeps its row so re-scans observe `num_scanned == 0`.
pub fn set_code_count(conn: &Connection, code_id: &str, num_scanned: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO codes (code_id, num_scanned) VALUES (?1, ?2)
         ON CONFLICT(code_id) DO UPDATE SET num_scanned = excluded.num_scanned",
        params![code_id, i64::from(num_scanned)],
    )
    .with_context(|| format!("write metadata for code {code_id}"))?;
    Ok(())
}

/// Of the given code ids, return those whose counter is exactly 1. The
/// store bounds fetch-by-identifier-set queries to [`METADATA_BATCH`] ids;
/// callers chunk larger lists and merge.
pub fn codes_unique_among(conn: &Connection, code_ids: &[&str]) -> Result<HashSet<String>> {
    debug_assert!(
        code_ids.len() <= METADATA_BATCH,
        "identifier batch exceeds store bound"
    );
    if code_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders = vec!["?"; code_ids.len()].join(", ");
    let sql = format!(
        "SELECT code_id FROM codes WHERE num_scanned = 1 AND code_id IN ({placeholders})"
    );

    let mut stmt = conn.prepare(&sql).context("prepare unique-code batch")?;
    let rows = stmt
        .query_map(params_from_iter(code_ids.iter().copied()), |row| {
            row.get::<_, String>(0)
        })
        .context("query unique-code batch")?;

    rows.collect::<rusqlite::Result<HashSet<_>>>()
        .context("collect unique-code batch")
}

// ---------------------------------------------------------------------------
// Redelivery ledger
// ---------------------------------------------------------------------------

/// Record an event key in the redelivery ledger. Returns `false` when the
/// key was already present, i.e. the event is a redelivery.
pub fn mark_event_applied(conn: &Connection, event_key: &str, applied_at_us: i64) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO applied_events (event_key, applied_at_us) VALUES (?1, ?2)",
            params![event_key, applied_at_us],
        )
        .context("record applied event key")?;
    Ok(changed == 1)
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn best_item(code_id: Option<String>, score: Option<i64>) -> Option<BestItem> {
    match (code_id, score) {
        (Some(code_id), Some(score)) => Some(BestItem {
            code_id,
            score: u32::try_from(score).unwrap_or(0),
        }),
        _ => None,
    }
}

fn ranks(total: Option<i64>, unique: Option<i64>, scanned: Option<i64>) -> Option<Ranks> {
    match (total, unique, scanned) {
        (Some(t), Some(u), Some(s)) => Some(Ranks {
            total_score: u32::try_from(t).unwrap_or(0),
            best_unique: u32::try_from(u).unwrap_or(0),
            num_scanned: u32::try_from(s).unwrap_or(0),
        }),
        _ => None,
    }
}
