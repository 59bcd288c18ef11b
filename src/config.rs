//! Run settings: built-in defaults, an optional YAML file, then CLI flags.
//!
//! ```yaml
//! strategy: broad
//! lookback_hours: 72
//! retention_days: 30
//! max_records: 250
//! primary:
//!   min_interval_ms: 6000
//!   max_attempts: 6
//! fallback:
//!   endpoint: https://news.google.com/rss/search
//! ```
//!
//! Every key is optional. Upstream sections fall back to per-upstream
//! defaults for anything they leave out.

use chrono::Duration;
use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use std::time::Duration as StdDuration;
use tokio::fs;
use tracing::{info, instrument};

use crate::api::{BackoffPolicy, RateLimiter};
use crate::classify::StrategyKind;
use crate::cli::Cli;
use crate::sources::gdelt::{GDELT_DOC_ENDPOINT, MAX_RECORDS_CAP};
use crate::sources::google_news::GOOGLE_NEWS_ENDPOINT;
use crate::store::retention::DEFAULT_RETENTION_DAYS;

/// Longest accepted search window.
pub const MAX_LOOKBACK_HOURS: i64 = 24 * 90;
/// Longest accepted retention horizon.
pub const MAX_RETENTION_DAYS: i64 = 3650;

const DEFAULT_USER_AGENT: &str = concat!("facility_signals/", env!("CARGO_PKG_VERSION"));

/// Fetch tuning for one upstream. Unset values use the upstream's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamSettings {
    pub endpoint: Option<String>,
    pub min_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

/// Defaults that differ between upstreams.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamDefaults {
    pub endpoint: &'static str,
    pub min_interval: StdDuration,
}

pub const PRIMARY_DEFAULTS: UpstreamDefaults = UpstreamDefaults {
    endpoint: GDELT_DOC_ENDPOINT,
    min_interval: StdDuration::from_secs(5),
};

pub const FALLBACK_DEFAULTS: UpstreamDefaults = UpstreamDefaults {
    endpoint: GOOGLE_NEWS_ENDPOINT,
    min_interval: StdDuration::from_secs(1),
};

impl UpstreamSettings {
    pub fn endpoint(&self, defaults: &UpstreamDefaults) -> String {
        self.endpoint.clone().unwrap_or_else(|| defaults.endpoint.to_string())
    }

    pub fn rate_limiter(&self, defaults: &UpstreamDefaults) -> RateLimiter {
        RateLimiter::new(
            self.min_interval_ms
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.min_interval),
        )
    }

    pub fn backoff(&self) -> BackoffPolicy {
        let base = BackoffPolicy::default();
        BackoffPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay: self.backoff_base_ms.map(StdDuration::from_millis).unwrap_or(base.base_delay),
            max_delay: self.backoff_max_ms.map(StdDuration::from_millis).unwrap_or(base.max_delay),
        }
    }

    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.timeout_secs.unwrap_or(30))
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    fn validate(&self, label: &str) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err(format!("{label}.max_attempts must be at least 1"));
        }
        if self.timeout_secs == Some(0) {
            return Err(format!("{label}.timeout_secs must be at least 1"));
        }
        if let (Some(base), Some(max)) = (self.backoff_base_ms, self.backoff_max_ms) {
            if base > max {
                return Err(format!("{label}.backoff_base_ms exceeds backoff_max_ms"));
            }
        }
        Ok(())
    }
}

/// Everything a run needs besides the store path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub strategy: StrategyKind,
    pub lookback_hours: i64,
    pub retention_days: i64,
    pub max_records: usize,
    pub primary: UpstreamSettings,
    pub fallback: UpstreamSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            lookback_hours: 48,
            retention_days: DEFAULT_RETENTION_DAYS,
            max_records: MAX_RECORDS_CAP,
            primary: UpstreamSettings::default(),
            fallback: UpstreamSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults, overlaid with the YAML file at `path` when given.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).await?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// CLI flags win over file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(strategy) = cli.strategy {
            self.strategy = strategy;
        }
        if let Some(hours) = cli.lookback_hours {
            self.lookback_hours = hours;
        }
        if let Some(days) = cli.retention_days {
            self.retention_days = days;
        }
        if let Some(max) = cli.max_records {
            self.max_records = max;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_LOOKBACK_HOURS).contains(&self.lookback_hours) {
            return Err(format!("lookback_hours must be between 1 and {MAX_LOOKBACK_HOURS}"));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(format!("retention_days must be between 1 and {MAX_RETENTION_DAYS}"));
        }
        if !(1..=MAX_RECORDS_CAP).contains(&self.max_records) {
            return Err(format!("max_records must be between 1 and {MAX_RECORDS_CAP}"));
        }
        self.primary.validate("primary")?;
        self.fallback.validate("fallback")
    }

    pub fn lookback(&self) -> Duration {
        Duration::hours(self.lookback_hours)
    }
}
