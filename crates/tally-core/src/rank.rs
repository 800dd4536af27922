//! Leaderboard ranker: periodic read-all/write-all batch job.
//!
//! Computes three independent descending orderings over all user aggregates
//! (total score, best-unique score with absent as 0, scan count) and writes
//! 1-based rank positions back. Ties are left unordered. The job has no
//! transactional coupling to the update protocol; it just runs after the
//! protocol's writes have settled.

use std::cmp::Reverse;

use anyhow::Result;

use crate::model::{Ranks, UserAggregate};
use crate::store::{Store, query};

/// Rank every user and persist the positions. Returns the number of users
/// ranked.
pub fn run(store: &mut Store) -> Result<usize> {
    let aggregates = store.with_txn(|conn| {
        let aggregates = query::all_aggregates(conn)?;

        let by_total = order(&aggregates, |a| a.total_score);
        let by_unique = order(&aggregates, |a| {
            u64::from(a.best_unique.as_ref().map_or(0, |b| b.score))
        });
        let by_scanned = order(&aggregates, |a| u64::from(a.total_scanned));

        for (idx, agg) in aggregates.iter().enumerate() {
            query::write_ranks(
                conn,
                &agg.user_id,
                Ranks {
                    total_score: by_total[idx],
                    best_unique: by_unique[idx],
                    num_scanned: by_scanned[idx],
                },
            )?;
        }
        Ok(aggregates.len())
    })?;

    tracing::info!(users = aggregates, "leaderboard ranks written");
    Ok(aggregates)
}

/// 1-based descending rank of each aggregate under `key`, returned in the
/// aggregates' original order.
fn order(aggregates: &[UserAggregate], key: impl Fn(&UserAggregate) -> u64) -> Vec<u32> {
    let mut indices: Vec<usize> = (0..aggregates.len()).collect();
    indices.sort_by_key(|&i| Reverse(key(&aggregates[i])));

    let mut ranks = vec![0u32; aggregates.len()];
    for (position, &i) in indices.iter().enumerate() {
        ranks[i] = u32::try_from(position).unwrap_or(u32::MAX).saturating_add(1);
    }
    ranks
}
