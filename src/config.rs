//! Application configuration
//!
//! Everything arrives via CLI flags or environment variables; the
//! database pool additionally honors the standard DATABASE_* variables
//! through `DatabaseConfig::from_env`.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "magnetarr", about = "Torrent indexer aggregation service")]
pub struct AppConfig {
    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 7000)]
    pub port: u16,

    /// External challenge-solver instance; absent means no bypass.
    #[arg(long, env = "SOLVER_URL")]
    pub solver_url: Option<String>,

    /// Upstream indexer-definition source.
    #[arg(
        long,
        env = "DEFINITIONS_BASE_URL",
        default_value = "https://definitions.magnetarr.dev"
    )]
    pub definitions_base_url: String,

    /// Local cache for fetched definition documents.
    #[arg(long, env = "DEFINITIONS_CACHE_DIR", default_value = "./data/definitions")]
    pub definitions_cache_dir: PathBuf,

    /// Wall-clock budget for one health probe pass.
    #[arg(long, env = "MAX_CRON_TIMEOUT_MS", default_value_t = 280_000)]
    pub max_cron_timeout_ms: u64,

    /// Pause between health probe passes.
    #[arg(long, env = "PROBE_INTERVAL_SECS", default_value_t = 300)]
    pub probe_interval_secs: u64,

    /// Pause between definition sync passes.
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 21_600)]
    pub sync_interval_secs: u64,

    /// Whether interactive searches may fall through to the solver-needing
    /// slow tier.
    #[arg(long, env = "INCLUDE_SLOW_TIER", default_value_t = false)]
    pub include_slow_tier: bool,
}

impl AppConfig {
    pub fn probe_budget(&self) -> Duration {
        Duration::from_millis(self.max_cron_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
