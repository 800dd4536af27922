//! Value types for scan records, code metadata, and user aggregates.
//!
//! Absent store documents are normalized to zero-valued defaults exactly
//! once, at the read site, via [`UserAggregate::absent`] — defaulting logic
//! is never scattered across individual field accesses.

use serde::{Deserialize, Serialize};

/// One scan event tying a user to a code. Identity is `(user_id, code_id)`;
/// records are only ever created and deleted, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub user_id: String,
    pub code_id: String,
    pub score: u32,
    /// Opaque location fingerprint (e.g. a geohash). `None` means the scan
    /// carried no location.
    pub location: Option<String>,
}

/// Shared per-code counter: how many users currently hold this code.
///
/// The counter is maintained incrementally by the update protocol and is the
/// only cross-user coupling point in the data model. A code whose count
/// drops to zero keeps its zero-valued row so a later re-scan observes
/// `num_scanned == 0` and re-establishes uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetadata {
    pub code_id: String,
    pub num_scanned: u32,
}

/// A `{code_id, score}` pointer to one of a user's scan records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestItem {
    pub code_id: String,
    pub score: u32,
}

impl BestItem {
    pub fn new(code_id: &str, score: u32) -> Self {
        Self {
            code_id: code_id.to_string(),
            score,
        }
    }

    /// Strict-improvement rule: a candidate displaces the current best only
    /// on a strictly greater score, so ties keep the first-seen item. An
    /// absent current best reads as score 0, which still lets a zero-score
    /// first scan become best via the `None` arm.
    pub fn improves(current: Option<&Self>, candidate_score: u32) -> bool {
        match current {
            None => true,
            Some(best) => candidate_score > best.score,
        }
    }

    /// Whether this pointer refers to the given code.
    pub fn is_code(&self, code_id: &str) -> bool {
        self.code_id == code_id
    }
}

/// Rank positions written back by the leaderboard batch job. 1-based,
/// descending on each axis, ties unordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranks {
    pub total_score: u32,
    pub best_unique: u32,
    pub num_scanned: u32,
}

/// Per-user derived statistics. Mutated only by the update protocol and the
/// uniqueness resolver acting on behalf of a triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAggregate {
    pub user_id: String,
    /// Sum of `score` over all of this user's scan records.
    pub total_score: u64,
    /// Count of this user's scan records.
    pub total_scanned: u32,
    /// Arg-max over the user's own records, uniqueness ignored.
    pub best_scoring: Option<BestItem>,
    /// Arg-max over the user's records whose code has `num_scanned == 1`.
    pub best_unique: Option<BestItem>,
    /// Leaderboard positions; absent until the ranker has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranks: Option<Ranks>,
}

impl UserAggregate {
    /// The single normalization step for a missing aggregate document: all
    /// totals zero, no best pointers, no ranks.
    pub fn absent(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_score: 0,
            total_scanned: 0,
            best_scoring: None,
            best_unique: None,
            ranks: None,
        }
    }
}
