use anyhow::Result;
use clap::Args;
use tally_core::config::TallyConfig;
use tally_core::rank;
use tally_core::store::{Store, query};

#[derive(Args, Debug)]
pub struct RankArgs {
    /// Only recompute ranks; skip printing the board.
    #[arg(long)]
    pub quiet: bool,
}

/// Execute `qt rank`: run the leaderboard batch job, then print the board
/// ordered by total-score rank.
pub fn run(args: &RankArgs, config: &TallyConfig) -> Result<()> {
    let mut store = Store::open_with_timeout(&config.store_path, config.busy_timeout())?;
    let ranked = rank::run(&mut store)?;

    if args.quiet {
        println!("ranked {ranked} user(s)");
        return Ok(());
    }

    let mut aggregates = query::all_aggregates(store.conn())?;
    aggregates.sort_by_key(|a| a.ranks.map_or(u32::MAX, |r| r.total_score));

    println!("{:<6} {:<20} {:>12} {:>12} {:>12}", "rank", "user", "score", "unique", "scanned");
    for agg in aggregates {
        let Some(ranks) = agg.ranks else { continue };
        println!(
            "{:<6} {:<20} {:>12} {:>12} {:>12}",
            ranks.total_score,
            agg.user_id,
            agg.total_score,
            agg.best_unique.as_ref().map_or(0, |b| b.score),
            agg.total_scanned,
        );
    }
    Ok(())
}
