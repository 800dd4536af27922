#![forbid(unsafe_code)]

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tally_core::config::{self, TallyConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "qt: per-user QR scan aggregates with uniqueness tracking",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Store database path (overrides the config file).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file path.
    #[arg(long, global = true, default_value = "tally.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Create (or migrate) the store database")]
    Init,

    #[command(
        about = "Apply trigger events from a JSON Lines file",
        after_help = "EXAMPLES:\n    # Apply events from a file\n    qt apply events.jsonl\n\n    # Pipe events from the trigger layer\n    cat events.jsonl | qt apply -"
    )]
    Apply(cmd::apply::ApplyArgs),

    #[command(about = "Show one user's aggregate")]
    User(cmd::user::UserArgs),

    #[command(about = "Run the leaderboard ranker and print the board")]
    Rank(cmd::rank::RankArgs),

    #[command(about = "Recompute all invariants from scan records and report drift")]
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => cmd::init::run(&config),
        Commands::Apply(args) => cmd::apply::run(&args, &config),
        Commands::User(args) => cmd::user::run(&args, &config),
        Commands::Rank(args) => cmd::rank::run(&args, &config),
        Commands::Verify => cmd::verify::run(&config),
    }
}

fn load_config(cli: &Cli) -> Result<TallyConfig> {
    let mut config = config::load(&cli.config)?;
    if let Some(store) = &cli.store {
        config.store_path.clone_from(store);
    }
    Ok(config)
}
