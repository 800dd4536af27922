//! Ground-truth invariant checker.
//!
//! Recomputes every derived value from the `scans` table alone — the one
//! thing the incremental protocol never does in its hot path — and diffs the
//! result against stored aggregates and code counters. Full scans are fine
//! here: this is tooling for `qt verify` and the property tests, not part
//! of the update path.
//!
//! Checked invariants:
//! 1. `total_scanned` equals the user's live scan count.
//! 2. `total_score` equals the sum of the user's scan scores.
//! 3. `best_scoring` is the true arg-max over the user's scans.
//! 4. `best_unique` is the true arg-max over scans whose code is held by
//!    exactly one user.
//! 5. Every code counter equals the number of live scans referencing it.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::model::{BestItem, ScanRecord};
use crate::store::query;

/// One divergence between stored and recomputed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    /// `user:<id>` or `code:<id>`.
    pub entity: String,
    pub field: &'static str,
    pub stored: String,
    pub expected: String,
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: stored {} expected {}",
            self.entity, self.field, self.stored, self.expected
        )
    }
}

/// Aggregate verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub users_checked: usize,
    pub codes_checked: usize,
    pub drifts: Vec<Drift>,
}

impl VerifyReport {
    /// `true` when every invariant held.
    pub fn is_ok(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Recompute all invariants from the scan records and diff against stored
/// state.
pub fn check(conn: &Connection) -> Result<VerifyReport> {
    let scans = all_scans(conn)?;

    // True per-code holder counts.
    let mut true_counts: HashMap<&str, u32> = HashMap::new();
    for scan in &scans {
        *true_counts.entry(scan.code_id.as_str()).or_default() += 1;
    }

    // Per-user recomputed stats, in the resolver's tie order (score
    // descending, code id ascending) so arg-max expectations are stable.
    let mut per_user: BTreeMap<&str, Vec<&ScanRecord>> = BTreeMap::new();
    for scan in &scans {
        per_user.entry(scan.user_id.as_str()).or_default().push(scan);
    }
    for records in per_user.values_mut() {
        records.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.code_id.cmp(&b.code_id))
        });
    }

    let mut drifts = Vec::new();
    let aggregates = query::all_aggregates(conn)?;

    for agg in &aggregates {
        let records = per_user
            .remove(agg.user_id.as_str())
            .unwrap_or_default();
        let entity = format!("user:{}", agg.user_id);

        let expected_count = u32::try_from(records.len()).unwrap_or(u32::MAX);
        if agg.total_scanned != expected_count {
            drifts.push(drift(&entity, "total_scanned", agg.total_scanned, expected_count));
        }

        let expected_score: u64 = records.iter().map(|r| u64::from(r.score)).sum();
        if agg.total_score != expected_score {
            drifts.push(drift(&entity, "total_score", agg.total_score, expected_score));
        }

        // Best pointers are arg-maxes; on score ties the protocol keeps the
        // first-seen record, so any record carrying the maximum score is a
        // valid answer.
        let best_candidates: Vec<&&ScanRecord> = records
            .iter()
            .take_while(|r| Some(r.score) == records.first().map(|f| f.score))
            .collect();
        if let Some(d) = check_best(&entity, "best_scoring", agg.best_scoring.as_ref(), &best_candidates) {
            drifts.push(d);
        }

        let unique_records: Vec<&&ScanRecord> = records
            .iter()
            .filter(|r| true_counts.get(r.code_id.as_str()) == Some(&1))
            .collect();
        let unique_candidates: Vec<&&ScanRecord> = unique_records
            .iter()
            .copied()
            .take_while(|r| Some(r.score) == unique_records.first().map(|f| f.score))
            .collect();
        if let Some(d) = check_best(&entity, "best_unique", agg.best_unique.as_ref(), &unique_candidates) {
            drifts.push(d);
        }
    }

    // Users with scans but no aggregate row at all.
    for (user_id, records) in &per_user {
        drifts.push(Drift {
            entity: format!("user:{user_id}"),
            field: "aggregate",
            stored: "absent".into(),
            expected: format!("{} scans", records.len()),
        });
    }

    // Code counters: stored vs true. Zero-count rows with no scans are the
    // expected resting state, not drift.
    let stored_counts = all_code_counts(conn)?;
    let codes_checked = stored_counts.len();
    for (code_id, stored) in &stored_counts {
        let expected = true_counts.get(code_id.as_str()).copied().unwrap_or(0);
        if *stored != expected {
            drifts.push(drift(&format!("code:{code_id}"), "num_scanned", *stored, expected));
        }
    }
    for (code_id, expected) in &true_counts {
        if !stored_counts.contains_key(*code_id) {
            drifts.push(drift(&format!("code:{code_id}"), "num_scanned", 0u32, *expected));
        }
    }

    Ok(VerifyReport {
        users_checked: aggregates.len(),
        codes_checked,
        drifts,
    })
}

fn drift(
    entity: &str,
    field: &'static str,
    stored: impl std::fmt::Display,
    expected: impl std::fmt::Display,
) -> Drift {
    Drift {
        entity: entity.to_string(),
        field,
        stored: stored.to_string(),
        expected: expected.to_string(),
    }
}

/// `stored` must point at one of `candidates` (or be absent iff there are
/// none). Returns the drift when it does not.
fn check_best(
    entity: &str,
    field: &'static str,
    stored: Option<&BestItem>,
    candidates: &[&&ScanRecord],
) -> Option<Drift> {
    let ok = match stored {
        None => candidates.is_empty(),
        Some(best) => candidates
            .iter()
            .any(|r| r.code_id == best.code_id && r.score == best.score),
    };
    if ok {
        return None;
    }

    let fmt_stored = stored.map_or_else(
        || "absent".to_string(),
        |b| format!("{{{}, {}}}", b.code_id, b.score),
    );
    let fmt_expected = if candidates.is_empty() {
        "absent".to_string()
    } else {
        candidates
            .iter()
            .map(|r| format!("{{{}, {}}}", r.code_id, r.score))
            .collect::<Vec<_>>()
            .join(" or ")
    };
    Some(Drift {
        entity: entity.to_string(),
        field,
        stored: fmt_stored,
        expected: fmt_expected,
    })
}

fn all_scans(conn: &Connection) -> Result<Vec<ScanRecord>> {
    let mut stmt = conn
        .prepare("SELECT user_id, code_id, score, location FROM scans")
        .context("prepare full scan listing")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ScanRecord {
                user_id: row.get(0)?,
                code_id: row.get(1)?,
                score: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                location: row.get(3)?,
            })
        })
        .context("list all scans")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect all scans")
}

fn all_code_counts(conn: &Connection) -> Result<BTreeMap<String, u32>> {
    let mut stmt = conn
        .prepare("SELECT code_id, num_scanned FROM codes")
        .context("prepare code counter listing")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                u32::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
            ))
        })
        .context("list code counters")?;
    rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
        .context("collect code counters")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ScanEvent, ScanEventKind};
    use crate::protocol;
    use crate::store::Store;

    fn created(user_id: &str, code_id: &str, score: u32) -> ScanEvent {
        ScanEvent {
            kind: ScanEventKind::Created,
            user_id: user_id.into(),
            code_id: code_id.into(),
            score,
            location: None,
            delivery_id: None,
        }
    }

    #[test]
    fn clean_store_verifies() {
        let mut store = Store::open_in_memory().expect("open store");
        protocol::apply(&mut store, &created("x", "c1", 10)).expect("apply");
        protocol::apply(&mut store, &created("y", "c1", 10)).expect("apply");
        protocol::apply(&mut store, &created("y", "c2", 4)).expect("apply");

        let report = check(store.conn()).expect("verify");
        assert!(report.is_ok(), "unexpected drift: {:?}", report.drifts);
        assert_eq!(report.users_checked, 2);
        assert_eq!(report.codes_checked, 2);
    }

    #[test]
    fn tampered_counter_is_reported() {
        let mut store = Store::open_in_memory().expect("open store");
        protocol::apply(&mut store, &created("x", "c1", 10)).expect("apply");
        query::set_code_count(store.conn(), "c1", 7).expect("tamper");

        let report = check(store.conn()).expect("verify");
        assert!(!report.is_ok());
        assert!(
            report
                .drifts
                .iter()
                .any(|d| d.entity == "code:c1" && d.field == "num_scanned")
        );
    }

    #[test]
    fn tampered_total_is_reported() {
        let mut store = Store::open_in_memory().expect("open store");
        protocol::apply(&mut store, &created("x", "c1", 10)).expect("apply");
        store
            .conn()
            .execute("UPDATE users SET total_score = 99 WHERE user_id = 'x'", [])
            .expect("tamper");

        let report = check(store.conn()).expect("verify");
        assert_eq!(
            report
                .drifts
                .iter()
                .filter(|d| d.field == "total_score")
                .count(),
            1
        );
    }

    #[test]
    fn orphaned_scans_without_aggregate_are_reported() {
        let store = Store::open_in_memory().expect("open store");
        query::insert_scan(
            store.conn(),
            &ScanRecord {
                user_id: "ghost".into(),
                code_id: "c1".into(),
                score: 3,
                location: None,
            },
        )
        .expect("seed scan");

        let report = check(store.conn()).expect("verify");
        assert!(
            report
                .drifts
                .iter()
                .any(|d| d.entity == "user:ghost" && d.field == "aggregate")
        );
    }
}
