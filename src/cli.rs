//! Command-line interface definitions for Facility Signals.
//!
//! Every flag is optional. Tuning flags override the YAML settings file,
//! which in turn overrides built-in defaults (see [`crate::config`]).

use clap::Parser;
use clap::builder::RangedU64ValueParser;
use std::path::PathBuf;

use crate::classify::StrategyKind;
use crate::config::{MAX_LOOKBACK_HOURS, MAX_RETENTION_DAYS};

/// Command-line arguments for one ingestion run.
///
/// # Examples
///
/// ```sh
/// # Default run, writing data/items.json
/// facility_signals
///
/// # Broad query with pattern classification, 72h window
/// facility_signals --strategy broad --lookback-hours 72
///
/// # Everything except the write
/// facility_signals -s /srv/signals/items.json --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path of the JSON store to merge into
    #[arg(short, long, env = "FACILITY_SIGNALS_STORE", default_value = "data/items.json")]
    pub store: PathBuf,

    /// Optional path to a settings YAML file
    #[arg(short, long, env = "FACILITY_SIGNALS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Query and classification strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Search window length, in hours, ending now
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_LOOKBACK_HOURS))]
    pub lookback_hours: Option<i64>,

    /// Drop stored items published more than this many days ago
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_RETENTION_DAYS))]
    pub retention_days: Option<i64>,

    /// Maximum hits requested per query (upstream cap is 250)
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..=250))]
    pub max_records: Option<usize>,

    /// Fetch, classify and merge, but leave the store untouched
    #[arg(long)]
    pub dry_run: bool,
}
