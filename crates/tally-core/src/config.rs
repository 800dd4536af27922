//! TOML configuration with serde defaults.
//!
//! Every field has a default so an absent or partial config file works; the
//! CLI threads the loaded config into the store and protocol explicitly.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{protocol, resolve, store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// SQLite database path.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Phase-2 (cross-user side effect) retry attempts.
    #[serde(default = "default_side_effect_retries")]
    pub side_effect_retries: u32,

    /// Resolver metadata batch size. A test knob; must stay within
    /// `1..=` [`resolve::METADATA_BATCH`], the store's lookup bound.
    #[serde(default = "default_metadata_batch")]
    pub metadata_batch: usize,
}

impl TallyConfig {
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// The protocol knobs this config carries, for [`protocol::apply_with`].
    pub const fn protocol_settings(&self) -> protocol::Settings {
        protocol::Settings {
            side_effect_retries: self.side_effect_retries,
            metadata_batch: self.metadata_batch,
        }
    }
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            side_effect_retries: default_side_effect_retries(),
            metadata_batch: default_metadata_batch(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("tally.db")
}

const fn default_busy_timeout_ms() -> u64 {
    store::DEFAULT_BUSY_TIMEOUT.as_millis() as u64
}

const fn default_side_effect_retries() -> u32 {
    protocol::SIDE_EFFECT_RETRIES
}

const fn default_metadata_batch() -> usize {
    resolve::METADATA_BATCH
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<TallyConfig> {
    if !path.exists() {
        return Ok(TallyConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = toml::from_str::<TallyConfig>(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    ensure!(
        (1..=resolve::METADATA_BATCH).contains(&config.metadata_batch),
        "metadata_batch must be between 1 and {} in {}",
        resolve::METADATA_BATCH,
        path.display()
    );
    Ok(config)
}
