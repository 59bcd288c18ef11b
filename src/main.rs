//! # Facility Signals
//!
//! Collects recent North-American news about industrial facilities
//! (warehouses, distribution centers, plants) and merges it into a JSON
//! store that a static dashboard page reads.
//!
//! ## Features
//!
//! - Searches the GDELT 2.1 Doc API for nine fixed topics, falling back to
//!   Google News search feeds when GDELT yields nothing
//! - Keeps only US/Canada stories and resolves a state or province
//! - Re-derives topic tags from text and extracts investment, area and job
//!   figures
//! - Deduplicates by URL across runs, unions topics, and prunes old items
//! - Never overwrites the store with an empty run
//!
//! ## Usage
//!
//! ```sh
//! facility_signals --store data/items.json
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Planning**: Topic catalog to upstream queries ([`topics`], [`classify`])
//! 2. **Fetching**: Throttled, retrying searches ([`api`], [`sources`])
//! 3. **Filtering**: US/Canada relevance, tagging and signals ([`geo`], [`signals`])
//! 4. **Storing**: Merge, retention and atomic write ([`store`])

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod classify;
mod cli;
mod config;
mod geo;
mod models;
mod pipeline;
mod signals;
mod sources;
mod store;
mod topics;
mod utils;

use api::{Fetcher, ReqwestTransport};
use cli::Cli;
use config::{Settings, FALLBACK_DEFAULTS, PRIMARY_DEFAULTS};
use pipeline::{Pipeline, RunOutcome, RunSettings};
use sources::gdelt::GdeltSource;
use sources::google_news::GoogleNewsSource;
use utils::{ensure_writable_dir, parent_dir};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("facility_signals starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(store = %args.store.display(), config = ?args.config, dry_run = args.dry_run, "Parsed CLI arguments");

    // ---- Settings: defaults < file < flags ----
    let mut settings = Settings::load(args.config.as_deref()).await.map_err(|e| {
        error!(error = %e, "Failed to load settings file");
        e
    })?;
    settings.apply_cli(&args);
    if let Err(reason) = settings.validate() {
        error!(%reason, "Invalid settings");
        return Err(reason.into());
    }
    info!(
        strategy = ?settings.strategy,
        lookback_hours = settings.lookback_hours,
        retention_days = settings.retention_days,
        max_records = settings.max_records,
        "Resolved settings"
    );

    // Early check: ensure the store directory is writable
    if !args.dry_run {
        let dir = parent_dir(&args.store);
        if let Err(e) = ensure_writable_dir(&dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Store directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Upstreams ----
    let primary = GdeltSource::new(
        Fetcher::new(
            ReqwestTransport::new(settings.primary.timeout(), &settings.primary.user_agent())?,
            settings.primary.rate_limiter(&PRIMARY_DEFAULTS),
            settings.primary.backoff(),
        ),
        settings.primary.endpoint(&PRIMARY_DEFAULTS),
    );
    let fallback = GoogleNewsSource::new(
        Fetcher::new(
            ReqwestTransport::new(settings.fallback.timeout(), &settings.fallback.user_agent())?,
            settings.fallback.rate_limiter(&FALLBACK_DEFAULTS),
            settings.fallback.backoff(),
        ),
        settings.fallback.endpoint(&FALLBACK_DEFAULTS),
    );

    let pipeline = Pipeline::new(
        primary,
        fallback,
        settings.strategy.build(),
        RunSettings {
            lookback: settings.lookback(),
            retention_days: settings.retention_days,
            max_records: settings.max_records,
            dry_run: args.dry_run,
        },
    );

    // ---- Run ----
    let report = pipeline.run(&args.store, Utc::now()).await?;
    let counters = &report.meta.counters;
    match report.outcome {
        RunOutcome::Written => info!(path = %args.store.display(), stored = counters.stored, "Store updated"),
        RunOutcome::Preserved => info!(path = %args.store.display(), "Store preserved; nothing usable this run"),
        RunOutcome::DryRun => info!(would_store = counters.stored, "Dry run complete"),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        source = %report.meta.source,
        fetched = counters.fetched,
        relevant = counters.relevant,
        tagged = counters.tagged,
        inserted = counters.inserted,
        updated = counters.updated,
        pruned = counters.pruned,
        failed_queries = report.meta.failed_queries,
        "Execution complete"
    );

    Ok(())
}
