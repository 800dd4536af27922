use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tally_core::config::TallyConfig;
use tally_core::protocol::{self, SideEffectStatus};
use tally_core::store::Store;
use tally_core::ScanEvent;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// JSON Lines file of trigger events, or `-` for stdin.
    pub events: PathBuf,
}

/// Execute `qt apply`: feed each trigger event through the update protocol
/// and print a summary. A malformed line aborts with its line number; a
/// redelivered duplicate or a recoverable anomaly does not.
pub fn run(args: &ApplyArgs, config: &TallyConfig) -> Result<()> {
    let mut store = Store::open_with_timeout(&config.store_path, config.busy_timeout())?;
    let settings = config.protocol_settings();

    let reader: Box<dyn BufRead> = if args.events.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&args.events)
            .with_context(|| format!("open events file {}", args.events.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut applied = 0usize;
    let mut duplicates = 0usize;
    let mut anomalies = 0usize;
    let mut dropped_side_effects = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("read events input")?;
        if line.trim().is_empty() {
            continue;
        }

        let event: ScanEvent = serde_json::from_str(&line)
            .with_context(|| format!("parse trigger event at line {}", line_no + 1))?;

        let report = protocol::apply_with(&mut store, &event, &settings)?;
        if report.applied {
            applied += 1;
        } else {
            duplicates += 1;
        }
        anomalies += report
            .anomalies
            .iter()
            .filter(|a| !matches!(a, protocol::Anomaly::DuplicateEvent))
            .count();
        if matches!(report.side_effect, SideEffectStatus::Dropped { .. }) {
            dropped_side_effects += 1;
        }
    }

    println!(
        "applied {applied} event(s), {duplicates} duplicate(s), \
         {anomalies} anomaly(ies), {dropped_side_effects} dropped side effect(s)"
    );
    Ok(())
}
