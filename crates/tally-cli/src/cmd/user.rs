use anyhow::{Context, Result};
use clap::Args;
use tally_core::config::TallyConfig;
use tally_core::model::UserAggregate;
use tally_core::store::{Store, query};

#[derive(Args, Debug)]
pub struct UserArgs {
    /// User id.
    pub user_id: String,

    /// Emit the aggregate as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute `qt user`: print one user's aggregate. An unknown user prints
/// the zero-valued defaults, mirroring how the protocol reads absent
/// documents.
pub fn run(args: &UserArgs, config: &TallyConfig) -> Result<()> {
    let store = Store::open_with_timeout(&config.store_path, config.busy_timeout())?;
    let agg = query::get_aggregate(store.conn(), &args.user_id)?
        .unwrap_or_else(|| UserAggregate::absent(&args.user_id));

    if args.json {
        let json = serde_json::to_string_pretty(&agg).context("serialize aggregate")?;
        println!("{json}");
        return Ok(());
    }

    println!("user:          {}", agg.user_id);
    println!("total score:   {}", agg.total_score);
    println!("total scanned: {}", agg.total_scanned);
    match &agg.best_scoring {
        Some(best) => println!("best scoring:  {} ({})", best.code_id, best.score),
        None => println!("best scoring:  -"),
    }
    match &agg.best_unique {
        Some(best) => println!("best unique:   {} ({})", best.code_id, best.score),
        None => println!("best unique:   -"),
    }
    if let Some(ranks) = &agg.ranks {
        println!(
            "ranks:         score #{}, unique #{}, scanned #{}",
            ranks.total_score, ranks.best_unique, ranks.num_scanned
        );
    }
    Ok(())
}
