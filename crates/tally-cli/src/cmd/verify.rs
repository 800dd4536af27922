use anyhow::Result;
use tally_core::config::TallyConfig;
use tally_core::store::Store;
use tally_core::verify;

/// Execute `qt verify`: recompute every invariant from the scan records and
/// report drift. Exits non-zero when any invariant is violated.
pub fn run(config: &TallyConfig) -> Result<()> {
    let store = Store::open_with_timeout(&config.store_path, config.busy_timeout())?;
    let report = verify::check(store.conn())?;

    if report.is_ok() {
        println!(
            "ok: {} user(s), {} code(s), no drift",
            report.users_checked, report.codes_checked
        );
        return Ok(());
    }

    for drift in &report.drifts {
        eprintln!("drift: {drift}");
    }
    anyhow::bail!("verification failed with {} drift(s)", report.drifts.len());
}
