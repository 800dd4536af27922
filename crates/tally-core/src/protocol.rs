//! The aggregate update protocol: the transactional state machine invoked on
//! every scan create and delete.
//!
//! # Two-phase saga
//!
//! Phase 1 commits everything scoped to the acting user — their scan record,
//! their aggregate, and the code's shared counter — in one immediate
//! transaction. When the event flips a code between unique and shared, the
//! *other* holder's best-unique recompute is returned from phase 1 as a
//! pending [`SideEffect`] and executed afterwards as a separate transaction,
//! retried a bounded number of times. A phase-2 failure is logged and
//! reported, never rolled back into phase 1, so readers may briefly observe
//! a code with `num_scanned == 2` while a holder's best-unique still claims
//! it. No ordering is guaranteed between the two commits.
//!
//! # Redelivery
//!
//! Phase 1 is guarded against at-least-once delivery: a ledger key (when the
//! transport supplies a delivery id) or the scan record's own existence
//! turns a redelivered event into a logged no-op. See [`crate::event`].

use anyhow::Result;
use rusqlite::Connection;

use crate::event::{ScanEvent, ScanEventKind};
use crate::lookup::{self, LookupOutcome};
use crate::model::{BestItem, UserAggregate};
use crate::resolve;
use crate::store::{Store, query};

/// Phase-2 attempts before a cross-user update is dropped.
pub const SIDE_EFFECT_RETRIES: u32 = 3;

/// Runtime knobs for the protocol, normally filled from
/// [`crate::config::TallyConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Phase-2 attempts before a cross-user update is dropped.
    pub side_effect_retries: u32,
    /// Batch size for the resolver's metadata lookups.
    pub metadata_batch: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            side_effect_retries: SIDE_EFFECT_RETRIES,
            metadata_batch: resolve::METADATA_BATCH,
        }
    }
}

/// Recoverable anomalies observed while applying an event. Reported, never
/// thrown; each corresponds to a `warn!` in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// The event was already applied (ledger hit or scan-record guard).
    DuplicateEvent,
    /// A uniqueness transition needed the other holder, but the reverse
    /// lookup found nobody — a legitimate concurrent-deletion race.
    OwnerNotFound { code_id: String },
    /// The reverse lookup matched only the acting user's own record.
    SelfReference { code_id: String },
    /// A decrement would have gone below zero and was clamped.
    CounterUnderflow { counter: &'static str },
}

/// Pending cross-user recompute produced by phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffect {
    /// The other user whose best-unique must be recomputed.
    pub user_id: String,
}

/// Outcome of the cross-user side effect for one applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffectStatus {
    /// The event affected no other user.
    None,
    /// The other user's best-unique recompute committed.
    Applied { user_id: String },
    /// All phase-2 attempts failed; the update was dropped (logged). The
    /// aggregates converge on the next event touching that user.
    Dropped { user_id: String },
}

/// Report for one processed trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// False when the event was a redelivered duplicate and nothing changed.
    pub applied: bool,
    pub side_effect: SideEffectStatus,
    pub anomalies: Vec<Anomaly>,
}

/// Phase-1 result: committed state plus any pending cross-user work.
struct PhaseOne {
    applied: bool,
    pending: Option<SideEffect>,
    anomalies: Vec<Anomaly>,
}

impl PhaseOne {
    fn duplicate() -> Self {
        Self {
            applied: false,
            pending: None,
            anomalies: vec![Anomaly::DuplicateEvent],
        }
    }
}

/// Apply one trigger event with the default [`Settings`].
pub fn apply(store: &mut Store, event: &ScanEvent) -> Result<Applied> {
    apply_with(store, event, &Settings::default())
}

/// Apply one trigger event. Phase 1 errors propagate (the trigger layer may
/// redeliver); phase 2 failures degrade to [`SideEffectStatus::Dropped`].
pub fn apply_with(store: &mut Store, event: &ScanEvent, settings: &Settings) -> Result<Applied> {
    let phase1 = store.with_txn(|conn| match event.kind {
        ScanEventKind::Created => create_in_txn(conn, event),
        ScanEventKind::Deleted => delete_in_txn(conn, event, settings.metadata_batch),
    })?;

    let side_effect = match phase1.pending {
        None => SideEffectStatus::None,
        Some(effect) => {
            if run_side_effect(store, &effect.user_id, settings) {
                SideEffectStatus::Applied {
                    user_id: effect.user_id,
                }
            } else {
                SideEffectStatus::Dropped {
                    user_id: effect.user_id,
                }
            }
        }
    };

    Ok(Applied {
        applied: phase1.applied,
        side_effect,
        anomalies: phase1.anomalies,
    })
}

// ---------------------------------------------------------------------------
// Create path
// ---------------------------------------------------------------------------

fn create_in_txn(conn: &Connection, event: &ScanEvent) -> Result<PhaseOne> {
    if ledger_hit(conn, event)? {
        return Ok(PhaseOne::duplicate());
    }

    if !query::insert_scan(conn, &event.record())? {
        tracing::warn!(
            user_id = %event.user_id,
            code_id = %event.code_id,
            "scan already recorded; treating create as redelivered duplicate"
        );
        return Ok(PhaseOne::duplicate());
    }

    let mut agg = query::get_aggregate(conn, &event.user_id)?
        .unwrap_or_else(|| UserAggregate::absent(&event.user_id));
    // Count *before* this insert; drives the uniqueness transition.
    let prior = query::get_code(conn, &event.code_id)?.map_or(0, |m| m.num_scanned);

    if BestItem::improves(agg.best_scoring.as_ref(), event.score) {
        agg.best_scoring = Some(BestItem::new(&event.code_id, event.score));
    }

    let mut anomalies = Vec::new();
    let mut pending = None;
    match prior {
        0 => {
            // Previously unscanned by anyone: unique to this user now.
            if BestItem::improves(agg.best_unique.as_ref(), event.score) {
                agg.best_unique = Some(BestItem::new(&event.code_id, event.score));
            }
        }
        1 => {
            // A collision is being created: the existing single holder is
            // about to lose uniqueness. The event's score doubles as the
            // existing record's score (it is derived from the code
            // content), which is what lets the narrowing lookup find it.
            match lookup::find_owner(
                conn,
                &event.code_id,
                event.score,
                event.location_fingerprint(),
                &event.user_id,
            )? {
                LookupOutcome::Found(other) => {
                    pending = Some(SideEffect {
                        user_id: other.user_id,
                    });
                }
                LookupOutcome::SelfOnly => anomalies.push(Anomaly::SelfReference {
                    code_id: event.code_id.clone(),
                }),
                LookupOutcome::Miss => anomalies.push(Anomaly::OwnerNotFound {
                    code_id: event.code_id.clone(),
                }),
            }
        }
        _ => {
            // Already shared; no uniqueness transition.
        }
    }

    query::set_code_count(conn, &event.code_id, prior + 1)?;

    agg.total_score += u64::from(event.score);
    agg.total_scanned += 1;
    query::upsert_aggregate(conn, &agg)?;

    tracing::info!(
        user_id = %event.user_id,
        code_id = %event.code_id,
        score = event.score,
        total_score = agg.total_score,
        total_scanned = agg.total_scanned,
        num_scanned = prior + 1,
        "applied scan create"
    );

    Ok(PhaseOne {
        applied: true,
        pending,
        anomalies,
    })
}

// ---------------------------------------------------------------------------
// Delete path
// ---------------------------------------------------------------------------

fn delete_in_txn(conn: &Connection, event: &ScanEvent, metadata_batch: usize) -> Result<PhaseOne> {
    if ledger_hit(conn, event)? {
        return Ok(PhaseOne::duplicate());
    }

    if !query::delete_scan(conn, &event.user_id, &event.code_id)? {
        tracing::warn!(
            user_id = %event.user_id,
            code_id = %event.code_id,
            "no scan record to delete; treating delete as redelivered duplicate"
        );
        return Ok(PhaseOne::duplicate());
    }

    let mut anomalies = Vec::new();
    let mut agg = match query::get_aggregate(conn, &event.user_id)? {
        Some(agg) => agg,
        None => {
            tracing::warn!(
                user_id = %event.user_id,
                "aggregate missing on delete; starting from zero-valued defaults"
            );
            UserAggregate::absent(&event.user_id)
        }
    };
    // Count still includes the record being removed.
    let prior = query::get_code(conn, &event.code_id)?.map_or(0, |m| m.num_scanned);

    // Totals, clamped: subtract from whatever is locally known rather than
    // crash on drift.
    let delta = u64::from(event.score);
    if delta > agg.total_score {
        tracing::warn!(
            user_id = %event.user_id,
            total_score = agg.total_score,
            delta,
            "total score underflow clamped to zero"
        );
        anomalies.push(Anomaly::CounterUnderflow {
            counter: "total_score",
        });
    }
    agg.total_score = agg.total_score.saturating_sub(delta);
    if agg.total_scanned == 0 {
        tracing::warn!(user_id = %event.user_id, "scan count underflow clamped to zero");
        anomalies.push(Anomaly::CounterUnderflow {
            counter: "total_scanned",
        });
    }
    agg.total_scanned = agg.total_scanned.saturating_sub(1);

    // Best-scoring recompute: single max query over the remaining records
    // (the deleted row is already gone within this transaction).
    if agg
        .best_scoring
        .as_ref()
        .is_some_and(|b| b.is_code(&event.code_id))
    {
        agg.best_scoring = query::max_scan(conn, &event.user_id)?;
    }

    let was_best_unique = agg
        .best_unique
        .as_ref()
        .is_some_and(|b| b.is_code(&event.code_id));

    if prior == 0 {
        tracing::warn!(code_id = %event.code_id, "code counter underflow clamped to zero");
        anomalies.push(Anomaly::CounterUnderflow {
            counter: "num_scanned",
        });
    }
    // The zero-count row is kept so a re-scan observes num_scanned == 0.
    query::set_code_count(conn, &event.code_id, prior.saturating_sub(1))?;

    let mut pending = None;
    if was_best_unique {
        // Same-user recompute can run inside this transaction: it targets
        // the same aggregate document.
        agg.best_unique = resolve::best_unique_chunked(conn, &event.user_id, metadata_batch)?;
    } else if prior == 2 {
        // The remaining holder's code just became unique to them.
        match lookup::find_owner(
            conn,
            &event.code_id,
            event.score,
            event.location_fingerprint(),
            &event.user_id,
        )? {
            LookupOutcome::Found(other) => {
                pending = Some(SideEffect {
                    user_id: other.user_id,
                });
            }
            LookupOutcome::SelfOnly => anomalies.push(Anomaly::SelfReference {
                code_id: event.code_id.clone(),
            }),
            LookupOutcome::Miss => anomalies.push(Anomaly::OwnerNotFound {
                code_id: event.code_id.clone(),
            }),
        }
    }

    query::upsert_aggregate(conn, &agg)?;

    tracing::info!(
        user_id = %event.user_id,
        code_id = %event.code_id,
        score = event.score,
        total_score = agg.total_score,
        total_scanned = agg.total_scanned,
        num_scanned = prior.saturating_sub(1),
        "applied scan delete"
    );

    Ok(PhaseOne {
        applied: true,
        pending,
        anomalies,
    })
}

// ---------------------------------------------------------------------------
// Phase 2: cross-user side effect
// ---------------------------------------------------------------------------

/// Recompute and write `user_id`'s best-unique in its own transaction.
/// Returns whether the write committed within the retry budget.
fn run_side_effect(store: &mut Store, user_id: &str, settings: &Settings) -> bool {
    for attempt in 1..=settings.side_effect_retries.max(1) {
        let result = store.with_txn(|conn| {
            let best = resolve::best_unique_chunked(conn, user_id, settings.metadata_batch)?;
            query::write_best_unique(conn, user_id, best.as_ref())?;
            Ok(best)
        });
        match result {
            Ok(best) => {
                tracing::info!(
                    user_id,
                    best_unique = ?best,
                    "cross-user best-unique recompute committed"
                );
                return true;
            }
            Err(error) => {
                tracing::warn!(user_id, attempt, %error, "cross-user update attempt failed");
            }
        }
    }
    tracing::error!(
        user_id,
        "cross-user best-unique update dropped after retries; will converge on next event"
    );
    false
}

// ---------------------------------------------------------------------------
// Redelivery ledger
// ---------------------------------------------------------------------------

/// Record the event's ledger key, when it has one. Returns `true` when the
/// key was already present, i.e. the event is a redelivery.
fn ledger_hit(conn: &Connection, event: &ScanEvent) -> Result<bool> {
    let Some(key) = event.idempotency_key() else {
        return Ok(false);
    };
    if query::mark_event_applied(conn, &key, chrono::Utc::now().timestamp_micros())? {
        return Ok(false);
    }
    tracing::warn!(
        user_id = %event.user_id,
        code_id = %event.code_id,
        kind = %event.kind,
        "event key already in ledger; skipping redelivered event"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Location;
    use crate::model::Ranks;

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

    fn deleted(user_id: &str, code_id: &str, score: u32) -> ScanEvent {
        ScanEvent {
            kind: ScanEventKind::Deleted,
            ..created(user_id, code_id, score)
        }
    }

    fn aggregate(store: &Store, user_id: &str) -> UserAggregate {
        query::get_aggregate(store.conn(), user_id)
            .expect("read aggregate")
            .unwrap_or_else(|| UserAggregate::absent(user_id))
    }

    fn code_count(store: &Store, code_id: &str) -> u32 {
        query::get_code(store.conn(), code_id)
            .expect("read code")
            .map_or(0, |m| m.num_scanned)
    }

    #[test]
    fn scenario_a_first_scan_becomes_best_and_unique() {
        let mut store = Store::open_in_memory().expect("open store");

        let report = apply(&mut store, &created("x", "c", 10)).expect("apply");
        assert!(report.applied);
        assert_eq!(report.side_effect, SideEffectStatus::None);
        assert!(report.anomalies.is_empty());

        assert_eq!(code_count(&store, "c"), 1);
        let x = aggregate(&store, "x");
        assert_eq!(x.total_score, 10);
        assert_eq!(x.total_scanned, 1);
        assert_eq!(x.best_scoring, Some(BestItem::new("c", 10)));
        assert_eq!(x.best_unique, Some(BestItem::new("c", 10)));
    }

    #[test]
    fn scenario_b_collision_demotes_existing_holder() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("seed x");

        let report = apply(&mut store, &created("y", "c", 10)).expect("apply y");
        assert_eq!(
            report.side_effect,
            SideEffectStatus::Applied {
                user_id: "x".into()
            }
        );

        assert_eq!(code_count(&store, "c"), 2);
        let x = aggregate(&store, "x");
        assert_eq!(x.best_unique, None, "x demoted");
        assert_eq!(x.best_scoring, Some(BestItem::new("c", 10)), "x best intact");

        let y = aggregate(&store, "y");
        assert_eq!(y.best_unique, None, "code is not unique to y either");
        assert_eq!(y.best_scoring, Some(BestItem::new("c", 10)));
    }

    #[test]
    fn scenario_c_delete_restores_uniqueness_to_remaining_holder() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("seed x");
        apply(&mut store, &created("y", "c", 10)).expect("seed y");

        let report = apply(&mut store, &deleted("y", "c", 10)).expect("delete y");
        assert_eq!(
            report.side_effect,
            SideEffectStatus::Applied {
                user_id: "x".into()
            }
        );

        assert_eq!(code_count(&store, "c"), 1);
        let x = aggregate(&store, "x");
        assert_eq!(x.best_unique, Some(BestItem::new("c", 10)), "x promoted back");
        let y = aggregate(&store, "y");
        assert_eq!(y.total_scanned, 0);
        assert_eq!(y.best_scoring, None);
    }

    #[test]
    fn deleting_only_scan_clears_everything() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("seed");

        let report = apply(&mut store, &deleted("x", "c", 10)).expect("delete");
        assert!(report.applied);

        let x = aggregate(&store, "x");
        assert_eq!(x.total_score, 0);
        assert_eq!(x.total_scanned, 0);
        assert_eq!(x.best_scoring, None);
        assert_eq!(x.best_unique, None);
        // Zero-count row survives so a re-scan observes num_scanned == 0.
        assert_eq!(
            query::get_code(store.conn(), "c")
                .expect("read code")
                .map(|m| m.num_scanned),
            Some(0)
        );
    }

    #[test]
    fn ties_keep_first_seen_best() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c1", 10)).expect("first");
        apply(&mut store, &created("x", "c2", 10)).expect("tying second");

        let x = aggregate(&store, "x");
        assert_eq!(x.best_scoring, Some(BestItem::new("c1", 10)));
        assert_eq!(x.best_unique, Some(BestItem::new("c1", 10)));
    }

    #[test]
    fn deleting_best_scoring_falls_back_to_next_best() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c1", 30)).expect("seed");
        apply(&mut store, &created("x", "c2", 20)).expect("seed");
        apply(&mut store, &created("x", "c3", 25)).expect("seed");

        apply(&mut store, &deleted("x", "c1", 30)).expect("delete best");

        let x = aggregate(&store, "x");
        assert_eq!(x.best_scoring, Some(BestItem::new("c3", 25)));
        assert_eq!(x.total_score, 45);
        assert_eq!(x.total_scanned, 2);
    }

    #[test]
    fn deleting_best_unique_resolves_next_unique() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c1", 30)).expect("seed");
        apply(&mut store, &created("x", "c2", 20)).expect("seed");
        // c1 shared with y, so x's best unique is c2... after y scans c1.
        apply(&mut store, &created("y", "c1", 30)).expect("collide");
        assert_eq!(aggregate(&store, "x").best_unique, Some(BestItem::new("c2", 20)));

        apply(&mut store, &deleted("x", "c2", 20)).expect("delete best unique");
        assert_eq!(aggregate(&store, "x").best_unique, None);
    }

    #[test]
    fn settings_batch_size_reaches_the_resolver() {
        let mut store = Store::open_in_memory().expect("open store");
        // Enough scans that a batch of one forces many metadata chunks.
        for i in 0..12u32 {
            let code = format!("c{i:02}");
            apply(&mut store, &created("x", &code, 100 - i)).expect("seed");
        }
        apply(&mut store, &created("y", "c01", 99)).expect("collide with second best");

        let settings = Settings {
            metadata_batch: 1,
            ..Settings::default()
        };
        apply_with(&mut store, &deleted("x", "c00", 100), &settings).expect("delete best");

        // c00 gone, c01 shared with y: next unique is c02.
        let x = aggregate(&store, "x");
        assert_eq!(x.best_unique, Some(BestItem::new("c02", 98)));
    }

    #[test]
    fn redelivered_create_is_a_no_op() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("first");

        let report = apply(&mut store, &created("x", "c", 10)).expect("redelivery");
        assert!(!report.applied);
        assert_eq!(report.anomalies, vec![Anomaly::DuplicateEvent]);

        let x = aggregate(&store, "x");
        assert_eq!(x.total_score, 10, "no double count");
        assert_eq!(x.total_scanned, 1);
        assert_eq!(code_count(&store, "c"), 1);
    }

    #[test]
    fn redelivered_delete_is_a_no_op() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("seed");
        apply(&mut store, &deleted("x", "c", 10)).expect("delete");

        let report = apply(&mut store, &deleted("x", "c", 10)).expect("redelivery");
        assert!(!report.applied);
        assert_eq!(aggregate(&store, "x").total_scanned, 0);
        assert_eq!(code_count(&store, "c"), 0);
    }

    #[test]
    fn delivery_id_ledger_blocks_redelivery() {
        let mut store = Store::open_in_memory().expect("open store");
        let mut event = created("x", "c", 10);
        event.delivery_id = Some("d-1".into());

        assert!(apply(&mut store, &event).expect("first").applied);
        let report = apply(&mut store, &event).expect("redelivery");
        assert!(!report.applied);
        assert_eq!(report.anomalies, vec![Anomaly::DuplicateEvent]);
    }

    #[test]
    fn create_delete_create_sequence_is_not_mistaken_for_redelivery() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("create");
        apply(&mut store, &deleted("x", "c", 10)).expect("delete");
        let report = apply(&mut store, &created("x", "c", 10)).expect("re-create");

        assert!(report.applied);
        let x = aggregate(&store, "x");
        assert_eq!(x.total_scanned, 1);
        assert_eq!(x.best_unique, Some(BestItem::new("c", 10)));
        assert_eq!(code_count(&store, "c"), 1);
    }

    #[test]
    fn delete_on_empty_store_clamps_and_reports_underflow() {
        let mut store = Store::open_in_memory().expect("open store");
        // Seed only the scan row, as if every counter had drifted to zero.
        query::insert_scan(
            store.conn(),
            &ScanEvent::record(&created("x", "c", 10)),
        )
        .expect("seed scan");

        let report = apply(&mut store, &deleted("x", "c", 10)).expect("delete");
        assert!(report.applied);
        assert!(report.anomalies.contains(&Anomaly::CounterUnderflow {
            counter: "total_score"
        }));
        assert!(report.anomalies.contains(&Anomaly::CounterUnderflow {
            counter: "num_scanned"
        }));

        let x = aggregate(&store, "x");
        assert_eq!(x.total_score, 0);
        assert_eq!(x.total_scanned, 0);
        assert_eq!(code_count(&store, "c"), 0);
    }

    #[test]
    fn collision_with_vanished_holder_reports_owner_not_found() {
        let mut store = Store::open_in_memory().expect("open store");
        // Metadata says one holder exists, but no scan row backs it up —
        // the concurrent-deletion race the lookup must survive.
        query::set_code_count(store.conn(), "c", 1).expect("seed count");

        let report = apply(&mut store, &created("y", "c", 10)).expect("apply");
        assert!(report.applied);
        assert_eq!(report.side_effect, SideEffectStatus::None);
        assert_eq!(
            report.anomalies,
            vec![Anomaly::OwnerNotFound {
                code_id: "c".into()
            }]
        );
        assert_eq!(code_count(&store, "c"), 2);
    }

    #[test]
    fn second_delete_within_shared_code_has_no_cross_user_effect() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c", 10)).expect("seed");
        apply(&mut store, &created("y", "c", 10)).expect("seed");
        apply(&mut store, &created("z", "c", 10)).expect("seed");

        // 3 -> 2: no uniqueness transition yet.
        let report = apply(&mut store, &deleted("z", "c", 10)).expect("delete");
        assert_eq!(report.side_effect, SideEffectStatus::None);
        assert_eq!(aggregate(&store, "x").best_unique, None);
        assert_eq!(aggregate(&store, "y").best_unique, None);
    }

    #[test]
    fn ranks_survive_protocol_updates() {
        let mut store = Store::open_in_memory().expect("open store");
        apply(&mut store, &created("x", "c1", 10)).expect("seed");
        query::write_ranks(
            store.conn(),
            "x",
            Ranks {
                total_score: 1,
                best_unique: 1,
                num_scanned: 1,
            },
        )
        .expect("write ranks");

        apply(&mut store, &created("x", "c2", 5)).expect("second scan");
        assert!(aggregate(&store, "x").ranks.is_some());
    }

    #[test]
    fn located_scans_round_trip_through_collision() {
        let mut store = Store::open_in_memory().expect("open store");
        let located = |user: &str| ScanEvent {
            location: Some(Location {
                geo_hash: "u4pruyd".into(),
            }),
            ..created(user, "c", 10)
        };

        apply(&mut store, &located("x")).expect("seed x");
        let report = apply(&mut store, &located("y")).expect("collide");
        assert_eq!(
            report.side_effect,
            SideEffectStatus::Applied {
                user_id: "x".into()
            }
        );
        assert_eq!(aggregate(&store, "x").best_unique, None);
    }
}
