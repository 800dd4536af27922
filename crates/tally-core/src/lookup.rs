//! Reverse owner lookup.
//!
//! The store cannot map a code id directly to the user holding it, so the
//! lookup narrows by `(score, location)` — a filter, not a unique key —
//! then linearly scans the (typically tiny) result set for the row whose
//! code id matches and whose owner is not the acting user. The trade-off is
//! deliberate: a broader filtered scan instead of maintaining a global
//! code → owner map.

use anyhow::Result;
use rusqlite::Connection;

use crate::model::ScanRecord;
use crate::store::query;

/// Result of a reverse owner lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Another user's matching scan record.
    Found(ScanRecord),
    /// Only the excluded (acting) user's own record matched the code — a
    /// logic inconsistency the caller must treat as a no-op.
    SelfOnly,
    /// Nothing matched. Legitimate under concurrent deletion; recoverable.
    Miss,
}

/// Locate the user holding `code_id`, excluding `exclude_user_id`, by
/// narrowing on the record's score and location fingerprint.
pub fn find_owner(
    conn: &Connection,
    code_id: &str,
    score: u32,
    location: Option<&str>,
    exclude_user_id: &str,
) -> Result<LookupOutcome> {
    let candidates = query::scans_by_score_location(conn, score, location)?;
    tracing::debug!(
        code_id,
        score,
        location = location.unwrap_or("<none>"),
        candidates = candidates.len(),
        "reverse lookup narrowed candidate set"
    );

    let mut saw_self = false;
    for candidate in candidates {
        if candidate.code_id != code_id {
            continue;
        }
        if candidate.user_id == exclude_user_id {
            saw_self = true;
            continue;
        }
        return Ok(LookupOutcome::Found(candidate));
    }

    if saw_self {
        tracing::warn!(
            code_id,
            user_id = exclude_user_id,
            "reverse lookup matched only the acting user's own record"
        );
        return Ok(LookupOutcome::SelfOnly);
    }

    tracing::warn!(
        code_id,
        score,
        "reverse lookup found no owner; record may have been deleted concurrently"
    );
    Ok(LookupOutcome::Miss)
}
